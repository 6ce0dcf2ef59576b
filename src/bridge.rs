use futures_core::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::StreamError;

/// Create the ordered hand-off between the parser task and its consumer.
///
/// Single producer, single consumer, FIFO. The producer closes the queue
/// by dropping the sender (clean end of sequence) or via [`ItemSender::fail`]
/// (terminal error, observed by the consumer on its next pull). The
/// consumer cancels by dropping the receiver or calling
/// [`ItemReceiver::cancel`]; the producer sees that on its next push.
pub fn bridge<T>(capacity: usize) -> (ItemSender<T>, ItemReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ItemSender { tx }, ItemReceiver { rx, done: false })
}

/// Producer half of the bridge.
#[derive(Debug)]
pub struct ItemSender<T> {
    tx: mpsc::Sender<Result<T, StreamError>>,
}

impl<T> ItemSender<T> {
    /// Hand one item across, in order. Returns false when the consumer
    /// has cancelled — the producer's read loop must stop.
    pub async fn push(&self, item: T) -> bool {
        self.tx.send(Ok(item)).await.is_ok()
    }

    /// Close with a terminal error instead of a clean end.
    pub async fn fail(self, err: StreamError) {
        debug!(target: "json_conduit::bridge", error = %err, "closing bridge with error");
        let _ = self.tx.send(Err(err)).await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the bridge.
#[derive(Debug)]
pub struct ItemReceiver<T> {
    rx: mpsc::Receiver<Result<T, StreamError>>,
    done: bool,
}

impl<T> ItemReceiver<T> {
    /// Pull adapter. `Ok(None)` is the clean end of the sequence; an
    /// error is terminal and reported exactly once.
    pub async fn pull(&mut self) -> Result<Option<T>, StreamError> {
        if self.done {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => {
                self.done = true;
                Err(e)
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    /// Stop consuming. The producer observes this within one push, hence
    /// within one transport read iteration.
    pub fn cancel(&mut self) {
        self.rx.close();
    }

    /// Push adapter: invoke `consumer` once per item, in order. A false
    /// return cancels the rest of the stream.
    pub async fn for_each<F>(mut self, mut consumer: F) -> Result<(), StreamError>
    where
        F: FnMut(T) -> bool,
    {
        while let Some(item) = self.pull().await? {
            if !consumer(item) {
                self.cancel();
                break;
            }
        }
        Ok(())
    }

    /// The same sequence as an async `Stream`.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<T, StreamError>> {
        async_stream::stream! {
            loop {
                match self.pull().await {
                    Ok(Some(item)) => yield Ok(item),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Drain the whole sequence into memory.
    pub async fn collect(mut self) -> Result<Vec<T>, StreamError> {
        let mut items = Vec::new();
        while let Some(item) = self.pull().await? {
            items.push(item);
        }
        Ok(items)
    }
}

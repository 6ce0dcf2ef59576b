use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::adapt::{decode_item, TypeDescriptor};
use crate::bridge::{bridge, ItemReceiver, ItemSender};
use crate::codec::{Charset, DecodeStage};
use crate::config::PipelineConfig;
use crate::detector::{StreamMode, ValueDetector};
use crate::error::StreamError;

/// Raw chunk input to the decode side, however the bytes arrive.
pub type ByteChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// One unit in a codec chain. Implementations buffer internally; `close`
/// is idempotent and propagates downstream exactly once.
pub trait Stage {
    type Item;

    fn accept(&mut self, item: Self::Item) -> Result<(), StreamError>;

    fn flush(&mut self) -> Result<(), StreamError>;

    fn close(&mut self) -> Result<(), StreamError>;
}

/// The input-side chain: charset decode feeding the boundary detector.
/// Owned by exactly one read loop; all state is task-local.
#[derive(Debug)]
pub struct DecodePipeline {
    decode: DecodeStage,
    detector: ValueDetector,
    closed: bool,
}

impl DecodePipeline {
    pub fn new(mode: StreamMode, charset: Charset) -> Self {
        Self {
            decode: DecodeStage::new(charset),
            detector: ValueDetector::new(mode),
            closed: false,
        }
    }

    /// Feed one transport chunk; returns every value completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>, StreamError> {
        let text = self.decode.accept(chunk)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        self.detector.feed(&text)
    }

    /// Clean end of input: validates charset and value state, returning
    /// any value that completes at end-of-stream.
    pub fn finish(&mut self) -> Result<Vec<Value>, StreamError> {
        if self.closed {
            return Ok(Vec::new());
        }
        self.closed = true;
        self.decode.close()?;
        self.detector.finish()
    }

    /// Abort path: mark the chain closed without end-of-stream checks.
    /// Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

/// Spawn the parser task for a streamable target: transport chunks in,
/// typed items out through the ordered bridge.
///
/// The task stops within one read iteration of consumer cancellation,
/// and delivers any producer-side error as the bridge's terminal marker.
#[instrument(target = "json_conduit::pipeline", skip(chunks, config), fields(type_name = descriptor.name))]
pub fn spawn_decode_task<T>(
    chunks: ByteChunkStream,
    mode: StreamMode,
    charset: Charset,
    descriptor: TypeDescriptor,
    config: &PipelineConfig,
) -> ItemReceiver<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = bridge(config.queue_capacity);
    tokio::spawn(run_decode_loop(chunks, mode, charset, descriptor, tx));
    rx
}

/// Same producer, fed from any `AsyncRead`.
pub fn spawn_decode_from_reader<R, T>(
    reader: R,
    mode: StreamMode,
    charset: Charset,
    descriptor: TypeDescriptor,
    config: &PipelineConfig,
) -> ItemReceiver<T>
where
    R: AsyncRead + Send + Unpin + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let chunks = ReaderStream::with_capacity(reader, config.read_chunk_size.max(1));
    let chunks: ByteChunkStream = Box::pin(chunks.map(|r| r.map_err(StreamError::from)));
    spawn_decode_task(chunks, mode, charset, descriptor, config)
}

async fn run_decode_loop<T>(
    mut chunks: ByteChunkStream,
    mode: StreamMode,
    charset: Charset,
    descriptor: TypeDescriptor,
    tx: ItemSender<T>,
) where
    T: DeserializeOwned + Send + 'static,
{
    let mut pipeline = DecodePipeline::new(mode, charset);

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tx.fail(e).await;
                return;
            }
        };
        let values = match pipeline.feed(&chunk) {
            Ok(values) => values,
            Err(e) => {
                tx.fail(e).await;
                return;
            }
        };
        for value in values {
            let item = match decode_item::<T>(value, &descriptor) {
                Ok(item) => item,
                Err(e) => {
                    tx.fail(e).await;
                    return;
                }
            };
            if !tx.push(item).await {
                debug!(target: "json_conduit::pipeline",
                       "consumer cancelled, stopping read loop");
                pipeline.close();
                return;
            }
        }
        if tx.is_cancelled() {
            debug!(target: "json_conduit::pipeline",
                   "consumer cancelled, stopping read loop");
            pipeline.close();
            return;
        }
    }

    match pipeline.finish() {
        Ok(values) => {
            for value in values {
                match decode_item::<T>(value, &descriptor) {
                    Ok(item) => {
                        if !tx.push(item).await {
                            return;
                        }
                    }
                    Err(e) => {
                        tx.fail(e).await;
                        return;
                    }
                }
            }
            // Dropping the sender closes the bridge cleanly.
        }
        Err(e) => tx.fail(e).await,
    }
}

/// Drive a single-document body to completion without spawning: the
/// whole input is one value.
pub async fn decode_document<T>(
    mut chunks: ByteChunkStream,
    charset: Charset,
    descriptor: &TypeDescriptor,
) -> Result<T, StreamError>
where
    T: DeserializeOwned,
{
    let mut pipeline = DecodePipeline::new(StreamMode::Document, charset);
    let mut values = Vec::new();
    while let Some(chunk) = chunks.next().await {
        values.extend(pipeline.feed(&chunk?)?);
    }
    values.extend(pipeline.finish()?);

    let value = values.into_iter().next().ok_or_else(|| {
        StreamError::TruncatedJson("stream ended before a value started".to_string())
    })?;
    decode_item(value, descriptor)
}

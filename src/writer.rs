use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::adapt::encode_item;
use crate::codec::{Charset, EncodeStage};
use crate::error::StreamError;
use crate::pipeline::Stage;

/// Record separator discipline for outgoing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One value, no separators.
    Document,
    /// `[` … `,` … `]` around a streamed element sequence.
    Array,
    /// One value per line (JSON Lines).
    Lines,
}

/// Serialized-item to framed-bytes stage: applies the record separator
/// and feeds the charset encoder it owns. The caller drains encoded
/// bytes after each accept and after close.
#[derive(Debug)]
pub struct FrameEncoder {
    framing: Framing,
    encode: EncodeStage,
    started: bool,
    closed: bool,
}

impl FrameEncoder {
    pub fn new(framing: Framing, charset: Charset) -> Self {
        Self {
            framing,
            encode: EncodeStage::new(charset),
            started: false,
            closed: false,
        }
    }

    /// Framed bytes accumulated since the previous drain.
    pub fn drain(&mut self) -> Bytes {
        self.encode.drain()
    }
}

impl Stage for FrameEncoder {
    type Item = String;

    fn accept(&mut self, json: String) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::MalformedJson {
                offset: 0,
                reason: "value written after the frame closed".to_string(),
            });
        }
        match self.framing {
            Framing::Document => {
                if self.started {
                    return Err(StreamError::MalformedJson {
                        offset: 0,
                        reason: "single-document framing emits exactly one value".to_string(),
                    });
                }
                self.encode.accept(&json)?;
            }
            Framing::Array => {
                self.encode.accept(if self.started { "," } else { "[" })?;
                self.encode.accept(&json)?;
            }
            Framing::Lines => {
                self.encode.accept(&json)?;
                self.encode.accept("\n")?;
            }
        }
        self.started = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    /// Emits the closing bracket in array framing (a bare `[]` when no
    /// item was written); idempotent.
    fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.framing == Framing::Array {
            self.encode.accept(if self.started { "]" } else { "[]" })?;
        }
        Ok(())
    }
}

/// Outbound streaming writer: serializes each item, frames it, and
/// flushes the sink immediately — small framing overhead traded for low
/// latency-to-first-byte and bounded memory.
#[derive(Debug)]
pub struct StreamWriter<W> {
    sink: W,
    frames: FrameEncoder,
    shut: bool,
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    pub fn new(sink: W, framing: Framing, charset: Charset) -> Self {
        Self {
            sink,
            frames: FrameEncoder::new(framing, charset),
            shut: false,
        }
    }

    /// Serialize, frame, write, flush.
    pub async fn write_item<T: Serialize + ?Sized>(&mut self, item: &T) -> Result<(), StreamError> {
        let json = encode_item(item)?;
        trace!(target: "json_conduit::writer", len = json.len(), "writing item");
        self.frames.accept(json)?;
        let bytes = self.frames.drain();
        self.sink.write_all(&bytes).await?;
        self.sink.flush().await?;
        Ok(())
    }

    /// Emit the closing frame and flush. Idempotent: a second call
    /// writes nothing further.
    pub async fn finish(&mut self) -> Result<(), StreamError> {
        self.frames.close()?;
        let bytes = self.frames.drain();
        if !bytes.is_empty() {
            self.sink.write_all(&bytes).await?;
        }
        self.sink.flush().await?;
        Ok(())
    }

    /// Finish and shut the sink down. Idempotent.
    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.finish().await?;
        if !self.shut {
            self.shut = true;
            self.sink.shutdown().await?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Pump a pull-based producer through the writer until exhaustion, then
/// emit the closing frame.
pub async fn drain_stream_to_sink<T, S, W>(
    items: S,
    writer: &mut StreamWriter<W>,
) -> Result<(), StreamError>
where
    T: Serialize,
    S: Stream<Item = T>,
    W: AsyncWrite + Unpin,
{
    futures_util::pin_mut!(items);
    while let Some(item) = items.next().await {
        writer.write_item(&item).await?;
    }
    writer.finish().await
}

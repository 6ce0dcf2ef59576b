use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StreamError;

/// The transport collaborator: chunked byte I/O with explicit flush and
/// close. Connection management and TLS live behind implementations of
/// this trait, not in the pipeline.
#[async_trait]
pub trait ByteTransport: Send {
    /// Next chunk of bytes, or `None` at end of stream.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, StreamError>;

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StreamError>;

    async fn flush(&mut self) -> Result<(), StreamError>;

    /// Idempotent.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// [`ByteTransport`] over any tokio byte pipe: TCP sockets, unix
/// sockets, or an in-memory duplex in tests.
#[derive(Debug)]
pub struct IoTransport<S> {
    io: S,
    chunk_size: usize,
    closed: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> IoTransport<S> {
    pub fn new(io: S, chunk_size: usize) -> Self {
        Self {
            io,
            chunk_size: chunk_size.max(1),
            closed: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> ByteTransport for IoTransport<S> {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self.io.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        self.io.write_all(&chunk).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        self.io.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.io.shutdown().await?;
        Ok(())
    }
}

/// Adapt a transport's read side into a chunk stream for the decode
/// pipeline.
pub fn chunk_stream<T>(mut transport: T) -> impl Stream<Item = Result<Bytes, StreamError>> + Send
where
    T: ByteTransport + 'static,
{
    async_stream::stream! {
        loop {
            match transport.read_chunk().await {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => break,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

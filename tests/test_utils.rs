#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::TcpListener;

/// Shared test payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub name: String,
}

impl Event {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// AsyncRead that yields one preset chunk per poll and counts how many
/// chunks were actually consumed. Lets tests observe whether a read
/// loop kept going after cancellation.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
    reads: Arc<AtomicUsize>,
}

impl ChunkedReader {
    pub fn new(chunks: Vec<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                chunks: chunks.into(),
                reads: reads.clone(),
            },
            reads,
        )
    }

    /// Split `input` into `size`-byte chunks.
    pub fn from_str(input: &str, size: usize) -> (Self, Arc<AtomicUsize>) {
        let chunks = input
            .as_bytes()
            .chunks(size.max(1))
            .map(|c| c.to_vec())
            .collect();
        Self::new(chunks)
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(chunk) = self.chunks.pop_front() {
            self.reads.fetch_add(1, Ordering::SeqCst);
            buf.put_slice(&chunk);
        }
        Poll::Ready(Ok(()))
    }
}

/// One-shot HTTP server over a raw socket: accepts a single connection,
/// drains the request head, and writes a canned response.
pub async fn spawn_http_server(
    status_line: &'static str,
    content_type: &'static str,
    body: &'static str,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut head = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.flush().await;
        }
    });
    addr
}

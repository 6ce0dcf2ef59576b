use std::collections::HashMap;

use futures_core::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::adapt::{encode_item, TypeDescriptor};
use crate::bridge::ItemReceiver;
use crate::codec::{charset_from_content_type, media_essence, Charset};
use crate::config::PipelineConfig;
use crate::detector::StreamMode;
use crate::error::StreamError;
use crate::pipeline::{decode_document, spawn_decode_task, ByteChunkStream, Stage};
use crate::transport::ByteTransport;
use crate::writer::{FrameEncoder, Framing};

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_JSONL: &str = "application/jsonl";

/// Wire format a registered media type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// A single value, or an array streamed element by element.
    Json,
    /// Newline-delimited documents.
    JsonLines,
}

impl WireFormat {
    fn framing(self) -> Framing {
        match self {
            WireFormat::Json => Framing::Array,
            WireFormat::JsonLines => Framing::Lines,
        }
    }

    fn stream_mode(self) -> StreamMode {
        match self {
            WireFormat::Json => StreamMode::ArrayStream,
            WireFormat::JsonLines => StreamMode::JsonLines,
        }
    }
}

/// One outgoing response body: negotiated metadata plus the framed byte
/// stream that produces it. Created per response, consumed once.
pub struct ContentEnvelope {
    pub content_type: String,
    pub charset: Charset,
    pub status: Option<u16>,
    /// Known only for buffered bodies.
    pub content_length: Option<u64>,
    body: ByteChunkStream,
}

impl ContentEnvelope {
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// The framed body bytes, for hosts that take a stream directly.
    pub fn into_body(self) -> ByteChunkStream {
        self.body
    }

    /// Bind the body to a byte sink: write each framed chunk, flush it,
    /// close the transport when the producer is exhausted.
    pub async fn write_to<T: ByteTransport>(self, transport: &mut T) -> Result<(), StreamError> {
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            transport.write_chunk(chunk?).await?;
            transport.flush().await?;
        }
        transport.close().await
    }
}

/// A deserialized request body: one document, or a handle pulling
/// streamed elements as the parser produces them.
#[derive(Debug)]
pub enum DecodedBody<T> {
    Document(T),
    Stream(ItemReceiver<T>),
}

impl<T> DecodedBody<T> {
    pub fn into_document(self) -> Result<T, StreamError> {
        match self {
            DecodedBody::Document(value) => Ok(value),
            DecodedBody::Stream(_) => Err(StreamError::TypeResolution(
                "expected a document target, found a streamed one".to_string(),
            )),
        }
    }

    pub fn into_stream(self) -> Result<ItemReceiver<T>, StreamError> {
        match self {
            DecodedBody::Stream(rx) => Ok(rx),
            DecodedBody::Document(_) => Err(StreamError::TypeResolution(
                "expected a streamed target, found a document".to_string(),
            )),
        }
    }
}

/// The boundary adapter the hosting layer talks to. Media types are an
/// explicit per-adapter registry, not process-wide state; streaming
/// versus buffered output is decided solely by configuration, streamed
/// versus buffered input solely by the type descriptor's container.
pub struct CodecAdapter {
    config: PipelineConfig,
    formats: HashMap<String, WireFormat>,
}

impl CodecAdapter {
    pub fn new(config: PipelineConfig) -> Self {
        let mut formats = HashMap::new();
        formats.insert(APPLICATION_JSON.to_string(), WireFormat::Json);
        formats.insert(APPLICATION_JSONL.to_string(), WireFormat::JsonLines);
        Self { config, formats }
    }

    /// Register an additional media type for an existing wire format.
    pub fn with_format(mut self, essence: &str, format: WireFormat) -> Self {
        self.formats.insert(essence.to_string(), format);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn format_for(&self, content_type: &str) -> Option<WireFormat> {
        self.formats.get(media_essence(content_type)).copied()
    }

    /// Serialize an element stream. Returns `None` when the content type
    /// is not registered here, so the host can try another codec.
    #[instrument(target = "json_conduit::server", skip(self, items), fields(type_name = descriptor.name))]
    pub async fn serialize_stream<T, S>(
        &self,
        items: S,
        content_type: &str,
        descriptor: &TypeDescriptor,
    ) -> Result<Option<ContentEnvelope>, StreamError>
    where
        T: Serialize + Send + 'static,
        S: Stream<Item = T> + Send + 'static,
    {
        let Some(format) = self.format_for(content_type) else {
            debug!(target: "json_conduit::server", content_type, "no codec registered");
            return Ok(None);
        };
        let charset = charset_from_content_type(content_type)?;

        let envelope = if self.config.streaming_output {
            ContentEnvelope {
                content_type: full_content_type(content_type, charset),
                charset,
                status: None,
                content_length: None,
                body: framed_body(items, format.framing(), charset),
            }
        } else {
            // Buffered: materialize the whole sequence into one chunk.
            let mut frames = FrameEncoder::new(format.framing(), charset);
            futures_util::pin_mut!(items);
            while let Some(item) = items.next().await {
                frames.accept(encode_item(&item)?)?;
            }
            frames.close()?;
            let bytes = frames.drain();
            ContentEnvelope {
                content_type: full_content_type(content_type, charset),
                charset,
                status: None,
                content_length: Some(bytes.len() as u64),
                body: Box::pin(futures_util::stream::iter([Ok::<_, StreamError>(bytes)])),
            }
        };
        Ok(Some(envelope))
    }

    /// Serialize a single document; buffered by nature.
    pub fn serialize_document<T: Serialize>(
        &self,
        value: &T,
        content_type: &str,
    ) -> Result<Option<ContentEnvelope>, StreamError> {
        if self.format_for(content_type).is_none() {
            return Ok(None);
        }
        let charset = charset_from_content_type(content_type)?;

        let mut frames = FrameEncoder::new(Framing::Document, charset);
        frames.accept(encode_item(value)?)?;
        frames.close()?;
        let bytes = frames.drain();
        Ok(Some(ContentEnvelope {
            content_type: full_content_type(content_type, charset),
            charset,
            status: None,
            content_length: Some(bytes.len() as u64),
            body: Box::pin(futures_util::stream::iter([Ok::<_, StreamError>(bytes)])),
        }))
    }

    /// Deserialize a request body. Streamed targets get a parser task
    /// and a pull handle; document targets are driven to completion
    /// inline. An unregistered content type is the caller's error here,
    /// unlike the serialize direction.
    #[instrument(target = "json_conduit::server", skip(self, source), fields(type_name = descriptor.name))]
    pub async fn deserialize<T>(
        &self,
        content_type: &str,
        descriptor: &TypeDescriptor,
        source: ByteChunkStream,
    ) -> Result<DecodedBody<T>, StreamError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let Some(format) = self.format_for(content_type) else {
            return Err(StreamError::UnexpectedContentType(content_type.to_string()));
        };
        let charset = charset_from_content_type(content_type)?;

        if descriptor.is_streamed() {
            let rx = spawn_decode_task(
                source,
                format.stream_mode(),
                charset,
                descriptor.clone(),
                &self.config,
            );
            Ok(DecodedBody::Stream(rx))
        } else {
            let value = decode_document(source, charset, descriptor).await?;
            Ok(DecodedBody::Document(value))
        }
    }
}

fn full_content_type(content_type: &str, charset: Charset) -> String {
    format!("{}; charset={}", media_essence(content_type), charset.label())
}

/// Lazily framed body: each item is serialized, framed, and yielded the
/// moment the producer hands it over.
fn framed_body<T, S>(items: S, framing: Framing, charset: Charset) -> ByteChunkStream
where
    T: Serialize + Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut frames = FrameEncoder::new(framing, charset);
        futures_util::pin_mut!(items);
        while let Some(item) = items.next().await {
            let framed = encode_item(&item).and_then(|json| frames.accept(json));
            match framed {
                Ok(()) => {
                    let bytes = frames.drain();
                    if !bytes.is_empty() {
                        yield Ok(bytes);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        match frames.close() {
            Ok(()) => {
                let bytes = frames.drain();
                if !bytes.is_empty() {
                    yield Ok(bytes);
                }
            }
            Err(e) => yield Err(e),
        }
    })
}

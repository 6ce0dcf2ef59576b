pub mod adapt;
pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod transport;
pub mod writer;

// Convenient re-exports
pub use adapt::{ContainerKind, TypeDescriptor};
pub use bridge::{bridge, ItemReceiver, ItemSender};
pub use client::{StreamRequest, StreamingClient};
pub use codec::Charset;
pub use config::PipelineConfig;
pub use detector::{StreamMode, ValueDetector};
pub use error::{ClientError, StreamError};
pub use pipeline::{spawn_decode_from_reader, spawn_decode_task, DecodePipeline, Stage};
pub use server::{CodecAdapter, ContentEnvelope, DecodedBody, WireFormat};
pub use transport::{ByteTransport, IoTransport};
pub use writer::{Framing, StreamWriter};

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised by the streaming pipeline itself: boundary detection,
/// charset handling, and type-directed conversion. All of these abort
/// the chain; none are recoverable mid-stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("malformed JSON at byte {offset}: {reason}")]
    MalformedJson { offset: usize, reason: String },

    #[error("expected a top-level JSON array, found {found:?}")]
    ExpectedArrayRoot { found: char },

    #[error("input ended inside an incomplete JSON value: {0}")]
    TruncatedJson(String),

    #[error("streamed element is null but the element type is non-nullable")]
    NullStreamItem,

    #[error("unsupported content type: {0}")]
    UnexpectedContentType(String),

    #[error("cannot resolve a conversion target: {0}")]
    TypeResolution(String),

    #[error("charset error: {0}")]
    Charset(String),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mapping error: {0}")]
    Mapping(#[from] serde_json::Error),
}

/// Errors raised by the client call contract. Status mismatches keep the
/// full response around so callers can inspect it programmatically.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ClientError {
    /// Status code of an `UnexpectedStatus` rejection, if that is what this is.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Materialize the raw rejection body as a typed value.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            ClientError::UnexpectedStatus { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

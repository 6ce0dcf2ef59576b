use bytes::{Bytes, BytesMut};

use crate::error::StreamError;

/// Character encodings the codec stages understand. JSON on the wire is
/// almost always UTF-8; ASCII and Latin-1 cover the stragglers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Ascii,
    Latin1,
}

impl Charset {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            "iso-8859-1" | "latin-1" | "latin1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Ascii => "us-ascii",
            Charset::Latin1 => "iso-8859-1",
        }
    }
}

/// The media type without its parameters.
pub fn media_essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Charset from a Content-Type value's `charset` parameter; UTF-8 when
/// the parameter is absent, an error when it names an unknown encoding.
pub fn charset_from_content_type(content_type: &str) -> Result<Charset, StreamError> {
    for param in content_type.split(';').skip(1) {
        if let Some((name, value)) = param.split_once('=') {
            if name.trim().eq_ignore_ascii_case("charset") {
                let value = value.trim().trim_matches('"');
                return Charset::from_label(value)
                    .ok_or_else(|| StreamError::Charset(format!("unsupported charset {value:?}")));
            }
        }
    }
    Ok(Charset::Utf8)
}

/// Byte-to-text stage. A multi-byte sequence split across chunk
/// boundaries is buffered, not an error; only truly invalid bytes fail.
#[derive(Debug)]
pub struct DecodeStage {
    charset: Charset,
    pending: Vec<u8>,
    closed: bool,
}

impl DecodeStage {
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            pending: Vec::new(),
            closed: false,
        }
    }

    /// Decode one transport chunk, returning whatever text is complete.
    pub fn accept(&mut self, chunk: &[u8]) -> Result<String, StreamError> {
        match self.charset {
            Charset::Utf8 => self.accept_utf8(chunk),
            Charset::Ascii => {
                if let Some(bad) = chunk.iter().find(|b| !b.is_ascii()) {
                    return Err(StreamError::Charset(format!(
                        "byte 0x{bad:02X} is not US-ASCII"
                    )));
                }
                Ok(String::from_utf8_lossy(chunk).into_owned())
            }
            // Latin-1 maps 1:1 onto the first 256 code points.
            Charset::Latin1 => Ok(chunk.iter().map(|&b| b as char).collect()),
        }
    }

    fn accept_utf8(&mut self, chunk: &[u8]) -> Result<String, StreamError> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(_) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                if e.error_len().is_some() {
                    return Err(StreamError::Charset(format!(
                        "invalid UTF-8 sequence at byte {}",
                        e.valid_up_to()
                    )));
                }
                // Incomplete trailing sequence: keep it for the next chunk.
                let (complete, tail) = bytes.split_at(e.valid_up_to());
                let text = String::from_utf8_lossy(complete).into_owned();
                self.pending = tail.to_vec();
                Ok(text)
            }
        }
    }

    /// End of stream. Idempotent; dangling bytes mean the transport
    /// closed mid-character.
    pub fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(StreamError::TruncatedJson(
                "incomplete multi-byte sequence at end of stream".to_string(),
            ))
        }
    }
}

/// Text-to-byte stage. Buffers until drained; knows nothing about JSON
/// structure.
#[derive(Debug)]
pub struct EncodeStage {
    charset: Charset,
    buf: BytesMut,
}

impl EncodeStage {
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            buf: BytesMut::new(),
        }
    }

    pub fn accept(&mut self, text: &str) -> Result<(), StreamError> {
        match self.charset {
            Charset::Utf8 => self.buf.extend_from_slice(text.as_bytes()),
            Charset::Ascii => {
                for ch in text.chars() {
                    if !ch.is_ascii() {
                        return Err(StreamError::Charset(format!(
                            "{ch:?} is not representable in US-ASCII"
                        )));
                    }
                    self.buf.extend_from_slice(&[ch as u8]);
                }
            }
            Charset::Latin1 => {
                for ch in text.chars() {
                    let code = ch as u32;
                    if code > 0xFF {
                        return Err(StreamError::Charset(format!(
                            "{ch:?} is not representable in ISO-8859-1"
                        )));
                    }
                    self.buf.extend_from_slice(&[code as u8]);
                }
            }
        }
        Ok(())
    }

    /// Everything accepted since the previous drain.
    pub fn drain(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

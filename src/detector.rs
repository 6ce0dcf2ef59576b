use serde_json::Value;
use tracing::trace;

use crate::error::StreamError;

/// How the incoming character stream delimits values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Elements of one top-level JSON array, emitted as each one closes.
    ArrayStream,
    /// One document per line (JSON Lines), LF or CRLF.
    JsonLines,
    /// The whole input is a single value.
    Document,
}

/// Incremental recognizer for complete JSON values inside an arbitrarily
/// chunked character stream.
///
/// Tracks nesting depth and string/escape state character by character;
/// the instant a value's closing boundary shows up, the bounded slice is
/// parsed and returned to the caller. Only the unresolved tail (the
/// in-progress value, if any) stays buffered between chunks.
#[derive(Debug)]
pub struct ValueDetector {
    mode: StreamMode,
    buf: String,
    /// Next unexamined byte in `buf`.
    scan: usize,
    /// Absolute stream offset of `buf[0]`, for error positions.
    offset: usize,
    depth: u32,
    in_string: bool,
    escape: bool,
    /// Start of the in-progress value (or line) in `buf`.
    value_start: Option<usize>,
    /// Array mode: the top-level `[` has been consumed.
    root_open: bool,
    /// Clean completion: array closed, or the single document emitted.
    complete: bool,
    closed: bool,
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

impl ValueDetector {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            buf: String::new(),
            scan: 0,
            offset: 0,
            depth: 0,
            in_string: false,
            escape: false,
            value_start: None,
            root_open: false,
            complete: false,
            closed: false,
        }
    }

    /// Whether the stream reached its natural end (array closed, or the
    /// single document fully emitted).
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed one chunk; returns every value whose closing boundary fell
    /// inside it.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<Value>, StreamError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.buf.push_str(chunk);

        let mut out = Vec::new();
        match self.mode {
            StreamMode::ArrayStream => self.scan_array(&mut out)?,
            StreamMode::JsonLines => self.scan_lines(&mut out)?,
            StreamMode::Document => self.scan_document(&mut out)?,
        }
        self.drain_resolved();
        trace!(target: "json_conduit::detector",
               emitted = out.len(), pending = self.buf.len(), "chunk scanned");
        Ok(out)
    }

    /// End of stream. A close at a clean value boundary is normal; one
    /// mid-value is truncation. Idempotent.
    pub fn finish(&mut self) -> Result<Vec<Value>, StreamError> {
        if self.closed {
            return Ok(Vec::new());
        }
        self.closed = true;

        if self.in_string {
            return Err(StreamError::TruncatedJson(
                "unterminated string at end of stream".to_string(),
            ));
        }
        if self.depth > 0 && !(self.mode == StreamMode::ArrayStream && self.depth == 1) {
            return Err(StreamError::TruncatedJson(
                "unclosed value at end of stream".to_string(),
            ));
        }

        let mut out = Vec::new();
        match self.mode {
            StreamMode::ArrayStream => {
                if !self.complete {
                    return Err(StreamError::TruncatedJson(
                        "stream ended before the top-level array closed".to_string(),
                    ));
                }
            }
            StreamMode::Document => {
                if !self.complete {
                    match self.value_start {
                        // A bare scalar's natural delimiter can be end-of-stream.
                        Some(start) => {
                            let end = self.buf.len();
                            self.emit(start, end, &mut out)?;
                            self.complete = true;
                        }
                        None => {
                            return Err(StreamError::TruncatedJson(
                                "stream ended before a value started".to_string(),
                            ))
                        }
                    }
                }
            }
            StreamMode::JsonLines => {
                // Final line without a trailing newline.
                if let Some(start) = self.value_start {
                    let mut end = self.buf.len();
                    while end > start && self.buf.as_bytes()[end - 1] == b'\r' {
                        end -= 1;
                    }
                    self.emit(start, end, &mut out)?;
                }
            }
        }
        self.buf.clear();
        self.scan = 0;
        self.value_start = None;
        Ok(out)
    }

    fn scan_array(&mut self, out: &mut Vec<Value>) -> Result<(), StreamError> {
        while self.scan < self.buf.len() {
            let i = self.scan;
            let b = self.buf.as_bytes()[i];

            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if b == b'\\' {
                    self.escape = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 1 {
                        if let Some(start) = self.value_start {
                            // The element is itself a string.
                            self.emit(start, i + 1, out)?;
                        }
                    }
                }
                self.scan = i + 1;
                continue;
            }

            if !self.root_open {
                if is_ws(b) {
                    self.scan = i + 1;
                    continue;
                }
                if b == b'[' {
                    self.root_open = true;
                    self.depth = 1;
                    self.scan = i + 1;
                    continue;
                }
                let found = self.buf[i..].chars().next().unwrap_or('?');
                return Err(StreamError::ExpectedArrayRoot { found });
            }

            if self.complete {
                if !is_ws(b) {
                    return Err(self.malformed(i, "data after top-level array closed"));
                }
                self.scan = i + 1;
                continue;
            }

            match self.value_start {
                None => match b {
                    // Separators between elements are skipped, not validated.
                    b',' => {}
                    b']' => {
                        self.depth = 0;
                        self.complete = true;
                    }
                    b'}' => return Err(self.malformed(i, "mismatched closing brace")),
                    b'"' => {
                        self.value_start = Some(i);
                        self.in_string = true;
                    }
                    b'{' | b'[' => {
                        self.value_start = Some(i);
                        self.depth += 1;
                    }
                    _ if is_ws(b) => {}
                    _ => self.value_start = Some(i),
                },
                Some(start) => match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        if self.depth == 1 {
                            // A bare scalar ran up against the array's end.
                            if b != b']' {
                                return Err(self.malformed(i, "mismatched closing brace"));
                            }
                            self.emit(start, i, out)?;
                            self.depth = 0;
                            self.complete = true;
                        } else {
                            self.depth -= 1;
                            if self.depth == 1 {
                                self.emit(start, i + 1, out)?;
                            }
                        }
                    }
                    b',' if self.depth == 1 => self.emit(start, i, out)?,
                    _ if is_ws(b) && self.depth == 1 => self.emit(start, i, out)?,
                    _ => {}
                },
            }
            self.scan = i + 1;
        }
        Ok(())
    }

    fn scan_lines(&mut self, out: &mut Vec<Value>) -> Result<(), StreamError> {
        while self.scan < self.buf.len() {
            let i = self.scan;
            let b = self.buf.as_bytes()[i];

            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if b == b'\\' {
                    self.escape = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                self.scan = i + 1;
                continue;
            }

            match self.value_start {
                None => match b {
                    b'"' => {
                        self.value_start = Some(i);
                        self.in_string = true;
                    }
                    b'{' | b'[' => {
                        self.value_start = Some(i);
                        self.depth = 1;
                    }
                    b'}' | b']' => return Err(self.malformed(i, "mismatched close")),
                    // Blank lines and stray whitespace between documents.
                    _ if is_ws(b) => {}
                    _ => self.value_start = Some(i),
                },
                Some(start) => match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        if self.depth == 0 {
                            return Err(self.malformed(i, "mismatched close"));
                        }
                        self.depth -= 1;
                    }
                    b'\n' if self.depth == 0 => {
                        let mut end = i;
                        while end > start && self.buf.as_bytes()[end - 1] == b'\r' {
                            end -= 1;
                        }
                        self.emit(start, end, out)?;
                    }
                    _ => {}
                },
            }
            self.scan = i + 1;
        }
        Ok(())
    }

    fn scan_document(&mut self, out: &mut Vec<Value>) -> Result<(), StreamError> {
        while self.scan < self.buf.len() {
            let i = self.scan;
            let b = self.buf.as_bytes()[i];

            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if b == b'\\' {
                    self.escape = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        if let Some(start) = self.value_start {
                            self.emit(start, i + 1, out)?;
                            self.complete = true;
                        }
                    }
                }
                self.scan = i + 1;
                continue;
            }

            if self.complete {
                if !is_ws(b) {
                    return Err(self.malformed(i, "data after the document"));
                }
                self.scan = i + 1;
                continue;
            }

            match self.value_start {
                None => match b {
                    b'"' => {
                        self.value_start = Some(i);
                        self.in_string = true;
                    }
                    b'{' | b'[' => {
                        self.value_start = Some(i);
                        self.depth = 1;
                    }
                    b'}' | b']' => return Err(self.malformed(i, "mismatched close")),
                    _ if is_ws(b) => {}
                    _ => self.value_start = Some(i),
                },
                Some(start) => match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        if self.depth == 0 {
                            return Err(self.malformed(i, "mismatched close"));
                        }
                        self.depth -= 1;
                        if self.depth == 0 {
                            self.emit(start, i + 1, out)?;
                            self.complete = true;
                        }
                    }
                    // Bare scalars end at their natural delimiter.
                    _ if is_ws(b) && self.depth == 0 => {
                        self.emit(start, i, out)?;
                        self.complete = true;
                    }
                    _ => {}
                },
            }
            self.scan = i + 1;
        }
        Ok(())
    }

    /// Parse the bounded slice the moment its boundary is recognized.
    fn emit(&mut self, start: usize, end: usize, out: &mut Vec<Value>) -> Result<(), StreamError> {
        let slice = &self.buf[start..end];
        match serde_json::from_str::<Value>(slice) {
            Ok(value) => {
                self.value_start = None;
                out.push(value);
                Ok(())
            }
            Err(e) => Err(StreamError::MalformedJson {
                offset: self.offset + start,
                reason: e.to_string(),
            }),
        }
    }

    fn malformed(&self, at: usize, reason: &str) -> StreamError {
        StreamError::MalformedJson {
            offset: self.offset + at,
            reason: reason.to_string(),
        }
    }

    /// Drop everything attributable to emitted values and skipped
    /// separators; the buffer keeps only the in-progress tail.
    fn drain_resolved(&mut self) {
        let keep_from = self.value_start.unwrap_or(self.scan);
        if keep_from == 0 {
            return;
        }
        self.buf.drain(..keep_from);
        self.scan -= keep_from;
        if let Some(start) = self.value_start.as_mut() {
            *start -= keep_from;
        }
        self.offset += keep_from;
    }
}

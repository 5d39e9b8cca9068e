//! Line framing over the raw byte stream
//!
//! The modem terminates every response line with `\r\n`. The only unterminated
//! token it ever sends is the `> ` prompt that asks for `AT+CMGS` payload.

use crate::codec::Charset;
use bytes::{Buf, BytesMut};
use tracing::warn;

/// Lines longer than this without a terminator are dropped.
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(String),
    Blank,
    Prompt,
}

pub struct LineFramer {
    buf: BytesMut,
    charset: Charset,
}

impl LineFramer {
    pub fn new(charset: Charset) -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_LINE_LEN),
            charset,
        }
    }

    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete line, if the buffer holds one. An unterminated `> ` is
    /// only taken as the prompt while `want_prompt` is set; otherwise it stays
    /// buffered as the start of a line.
    pub fn next_line(&mut self, want_prompt: bool) -> Option<Line> {
        if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
            let raw = self.buf.split_to(pos);
            self.buf.advance(2);

            let mut raw = &raw[..];
            // echo arrives as "AT+CGMI\r\r\n"
            while let Some(stripped) = raw.strip_suffix(b"\r") {
                raw = stripped;
            }
            if raw.is_empty() || raw.iter().all(|b| b.is_ascii_whitespace()) {
                return Some(Line::Blank);
            }
            return Some(Line::Text(self.charset.decode_line(raw)));
        }

        if want_prompt {
            if self.buf.starts_with(b"> ") {
                self.buf.advance(2);
                return Some(Line::Prompt);
            }
            if &self.buf[..] == b">" {
                self.buf.clear();
                return Some(Line::Prompt);
            }
        }

        if self.buf.len() > MAX_LINE_LEN {
            warn!(
                "Discarding {} bytes without line terminator",
                self.buf.len()
            );
            self.buf.clear();
        }
        None
    }
}

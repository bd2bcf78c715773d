//! Newline framing for the backend byte stream
//!
//! Bytes accumulate until a `\n` arrives. Lines are trimmed of trailing
//! whitespace (so `\r\n` works) and blank lines are skipped. A line that
//! outgrows `MAX_LINE_LEN` is dropped whole, including whatever of it
//! arrives after the cap was hit.

use bytes::{Buf, BytesMut};
use tracing::warn;

/// Longest line kept before the partial buffer is discarded
pub const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, Default)]
pub struct LineCodec {
    acc: BytesMut,
    /// Dropping the rest of an oversized line up to its terminator
    discarding: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self { acc: BytesMut::with_capacity(256), discarding: false }
    }

    /// Append received bytes
    pub fn push(&mut self, mut data: &[u8]) {
        if self.discarding {
            match data.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    data = &data[pos + 1..];
                    self.discarding = false;
                }
                None => return,
            }
        }
        self.acc.extend_from_slice(data);

        // Complete lines stay; only the unterminated tail is capped
        let tail_start = self.acc.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
        let tail_len = self.acc.len() - tail_start;
        if tail_len > MAX_LINE_LEN {
            warn!(len = tail_len, max = MAX_LINE_LEN, "line_too_long_discarded");
            self.acc.truncate(tail_start);
            self.discarding = true;
        }
    }

    /// Pop the next complete, non-blank line
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.acc.iter().position(|&b| b == b'\n')?;
            let raw = self.acc.split_to(pos);
            self.acc.advance(1);

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end();
            if line.len() > MAX_LINE_LEN {
                warn!(len = line.len(), max = MAX_LINE_LEN, "line_too_long_discarded");
                continue;
            }
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.acc.len()
    }
}

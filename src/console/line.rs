//! Bounded operator line buffer with in-place sanitization.
//!
//! Both console strategies read into a [`LineBuffer`]. The buffer never grows:
//! content is capped at `LINE_CAPACITY - 1` bytes and is always followed by a
//! NUL byte, so a line can be handed to a C-style command grammar unchanged.
use std::borrow::Cow;
use std::io::{self, BufRead};

/// Capacity of an operator line, including the terminating NUL.
pub const LINE_CAPACITY: usize = 200;

/// Fixed-capacity buffer holding the most recent raw console line.
#[derive(Clone)]
pub struct LineBuffer {
    bytes: [u8; LINE_CAPACITY],
    len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineBuffer")
            .field("len", &self.len)
            .field("text", &self.to_command())
            .finish()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    /// Replace the contents with `raw`, truncated to capacity.
    #[cfg(test)]
    pub fn set(&mut self, raw: &[u8]) {
        let len = raw.len().min(LINE_CAPACITY - 1);
        self.bytes[..len].copy_from_slice(&raw[..len]);
        self.terminate(len);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read one line from `reader` into the buffer.
    ///
    /// Reads through the next `\n` (kept in the buffer if it fits). Bytes past
    /// capacity are consumed and dropped so an overlong line never spills into
    /// the next read. Returns `false` only when the reader is at end of input
    /// before any byte was read.
    pub fn read_from<R: BufRead + ?Sized>(&mut self, reader: &mut R) -> io::Result<bool> {
        let mut len = 0;
        let mut seen_any = false;
        loop {
            let available = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                break;
            }
            seen_any = true;

            let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (&available[..=i], true),
                None => (available, false),
            };
            let take = chunk.len().min(LINE_CAPACITY - 1 - len);
            self.bytes[len..len + take].copy_from_slice(&chunk[..take]);
            len += take;

            let consumed = chunk.len();
            reader.consume(consumed);
            if complete {
                break;
            }
        }
        self.terminate(len);
        Ok(seen_any)
    }

    /// Truncate at the first CR or LF and replace every remaining control
    /// byte with a space. Returns the trimmed view.
    pub fn sanitize(&mut self) -> &[u8] {
        if let Some(end) = self
            .as_bytes()
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
        {
            self.terminate(end);
        }
        for b in &mut self.bytes[..self.len] {
            if *b < b' ' {
                *b = b' ';
            }
        }
        self.as_bytes()
    }

    /// The buffer as command text. Bytes that are not valid UTF-8 are
    /// replaced, multi-byte sequences pass through intact.
    pub fn to_command(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    fn terminate(&mut self, len: usize) {
        self.len = len;
        self.bytes[len] = 0;
    }
}

//! In-memory backends: an immutable read cursor and a growable sink.

use ruse_char::MAX_ENCODED_LEN;

/// Read cursor over an immutable byte range (input-string backend).
pub(crate) struct ByteSource {
    bytes: Box<[u8]>,
    pos: usize,
}

impl ByteSource {
    pub(crate) fn new(bytes: Box<[u8]>) -> Self {
        ByteSource { bytes, pos: 0 }
    }

    /// Remaining unread bytes.
    pub(crate) fn window(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }

    pub(crate) fn consume(&mut self, n: usize) {
        self.pos += n;
    }

    pub(crate) fn get_byte(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Copy up to `dst.len()` bytes forward. `None` when the cursor is
    /// already at the end of the range on entry.
    pub(crate) fn read_block(&mut self, dst: &mut [u8]) -> Option<usize> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let take = (self.bytes.len() - self.pos).min(dst.len());
        dst[..take].copy_from_slice(&self.bytes[self.pos..self.pos + take]);
        self.pos += take;
        Some(take)
    }
}

/// Append-only byte builder (output-string backend).
#[derive(Default)]
pub(crate) struct ByteSink {
    bytes: Vec<u8>,
}

impl ByteSink {
    pub(crate) fn put_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub(crate) fn put_char(&mut self, ch: char) {
        let mut seq = [0u8; MAX_ENCODED_LEN];
        let n = ruse_char::encode(ch, &mut seq);
        self.bytes.extend_from_slice(&seq[..n]);
    }

    pub(crate) fn put_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

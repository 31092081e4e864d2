//! Buffered byte window for file-backed ports.
//!
//! [`FileBuf`] owns a fixed-size window between the port and an
//! underlying reader or writer. Input fills the window in bulk and
//! hands out bytes from it; output accumulates bytes in the window and
//! drains them according to the port's [`BufferMode`].
//!
//! Window geometry:
//!
//! ```text
//! input:   [ consumed | current..end unread | end..len free ]
//! output:  [ 0..current pending             | current..len free ]
//! ```
//!
//! Refilling compacts any unread tail to the front first, so a partial
//! multibyte sequence kept in the port's scratch buffer and the bytes
//! that complete it are never separated by more than one `fill` call.

use std::io::{self, Read, Write};

use ruse_char::MAX_ENCODED_LEN;

/// When buffered output is pushed to the underlying sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    /// Drain only when the window fills.
    Full,
    /// Drain through the most recent newline as soon as it is written.
    Line,
    /// Drain after every write.
    None,
}

/// Default window size for file-backed ports, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// The underlying I/O object. Dropped on close or hard failure, which
/// releases the descriptor it wraps.
enum FileIo {
    Reader(Box<dyn Read + Send>),
    Writer(Box<dyn Write + Send>),
}

/// Buffered byte window of a file-backed port.
pub(crate) struct FileBuf {
    buf: Box<[u8]>,
    /// Next byte to read (input) or write (output).
    current: usize,
    /// One past the last valid byte (input); window capacity (output).
    end: usize,
    mode: BufferMode,
    /// Newlines decoded so far on the input character path.
    line: u64,
    io: Option<FileIo>,
}

impl FileBuf {
    /// Input window over `reader`. `size` is clamped so the window can
    /// always hold one encoded character.
    pub(crate) fn reader(reader: Box<dyn Read + Send>, size: usize) -> Self {
        let size = size.max(MAX_ENCODED_LEN);
        FileBuf {
            buf: vec![0; size].into_boxed_slice(),
            current: 0,
            end: 0,
            mode: BufferMode::Full,
            line: 0,
            io: Some(FileIo::Reader(reader)),
        }
    }

    /// Output window over `writer`, draining per `mode`.
    pub(crate) fn writer(writer: Box<dyn Write + Send>, size: usize, mode: BufferMode) -> Self {
        let size = size.max(MAX_ENCODED_LEN);
        FileBuf {
            buf: vec![0; size].into_boxed_slice(),
            current: 0,
            end: size,
            mode,
            line: 0,
            io: Some(FileIo::Writer(writer)),
        }
    }

    pub(crate) fn mode(&self) -> BufferMode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: BufferMode) {
        self.mode = mode;
    }

    pub(crate) fn line(&self) -> u64 {
        self.line
    }

    pub(crate) fn bump_line(&mut self) {
        self.line += 1;
    }

    /// Unread input bytes.
    pub(crate) fn window(&self) -> &[u8] {
        &self.buf[self.current..self.end]
    }

    /// Mark `n` window bytes as consumed.
    pub(crate) fn consume(&mut self, n: usize) {
        self.current += n;
    }

    /// Pending output bytes not yet drained.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.current
    }

    /// Drop the underlying I/O object, releasing its descriptor.
    pub(crate) fn release(&mut self) {
        self.io = None;
    }

    // === Input ===

    /// Refill the window, compacting any unread tail first.
    ///
    /// Reads until at least `min` new bytes are available, or once if
    /// `allow_partial`. Returns the number of bytes newly read; 0 means
    /// the source is at EOF (or the window is already full of unread
    /// bytes, which callers rule out by consuming before refilling).
    pub(crate) fn fill(&mut self, min: usize, allow_partial: bool) -> io::Result<usize> {
        let unread = self.end - self.current;
        if unread > 0 {
            self.buf.copy_within(self.current..self.end, 0);
        }
        self.current = 0;
        self.end = unread;
        let mut added = 0;
        while self.end < self.buf.len() {
            let Some(FileIo::Reader(reader)) = self.io.as_mut() else {
                break;
            };
            let got = reader.read(&mut self.buf[self.end..])?;
            if got == 0 {
                break;
            }
            added += got;
            self.end += got;
            if allow_partial || added >= min {
                break;
            }
        }
        Ok(added)
    }

    /// One byte, refilling the window when it runs dry. `None` at EOF.
    pub(crate) fn get_byte(&mut self) -> io::Result<Option<u8>> {
        if self.current >= self.end && self.fill(1, false)? == 0 {
            return Ok(None);
        }
        let b = self.buf[self.current];
        self.current += 1;
        Ok(Some(b))
    }

    /// Block read into `dst`.
    ///
    /// Full mode keeps refilling until the request is satisfied or the
    /// source hits EOF; line and unbuffered modes hand back whatever the
    /// first refill produced. Returns the byte count; 0 means EOF.
    pub(crate) fn read_block(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let mut copied = self.copy_out(dst, 0);
        let eager = matches!(self.mode, BufferMode::Full);
        while copied < dst.len() {
            let want = (dst.len() - copied).min(self.buf.len());
            if self.fill(want, !eager)? == 0 {
                break;
            }
            copied = self.copy_out(dst, copied);
            if !eager {
                break;
            }
        }
        Ok(copied)
    }

    /// Copy window bytes into `dst[at..]`, returning the new fill level.
    fn copy_out(&mut self, dst: &mut [u8], at: usize) -> usize {
        let take = (self.end - self.current).min(dst.len() - at);
        dst[at..at + take].copy_from_slice(&self.buf[self.current..self.current + take]);
        self.current += take;
        at + take
    }

    // === Output ===

    /// Write `[0, upto)` to the sink and shift the remainder down.
    fn drain_upto(&mut self, upto: usize) -> io::Result<()> {
        if upto == 0 {
            return Ok(());
        }
        if let Some(FileIo::Writer(writer)) = self.io.as_mut() {
            writer.write_all(&self.buf[..upto])?;
        }
        self.buf.copy_within(upto..self.current, 0);
        self.current -= upto;
        Ok(())
    }

    /// Write every pending byte to the sink.
    pub(crate) fn drain_all(&mut self) -> io::Result<()> {
        self.drain_upto(self.current)
    }

    /// Buffer one byte, draining when the window is full and again
    /// immediately in unbuffered mode.
    pub(crate) fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        if self.current >= self.end {
            self.drain_all()?;
        }
        self.buf[self.current] = byte;
        self.current += 1;
        if matches!(self.mode, BufferMode::None) {
            self.drain_all()?;
        }
        Ok(())
    }

    /// Buffer one encoded character. The encoding is never split across
    /// a drain: if the window lacks room for all its bytes, it is
    /// drained first (the constructor clamp guarantees room after).
    pub(crate) fn put_char(&mut self, ch: char) -> io::Result<()> {
        let n = ruse_char::nbytes(ch);
        if self.current + n > self.end {
            self.drain_all()?;
        }
        let written = ruse_char::encode(ch, &mut self.buf[self.current..]);
        self.current += written;
        match self.mode {
            BufferMode::Line if ch == '\n' => self.drain_all()?,
            BufferMode::None => self.drain_all()?,
            BufferMode::Full | BufferMode::Line => {}
        }
        Ok(())
    }

    /// Buffer a byte run, chunking through the window. Line mode then
    /// drains through the last newline left pending; unbuffered mode
    /// drains everything.
    pub(crate) fn put_slice(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            if self.current >= self.end {
                self.drain_all()?;
            }
            let take = (self.end - self.current).min(rest.len());
            self.buf[self.current..self.current + take].copy_from_slice(&rest[..take]);
            self.current += take;
            rest = &rest[take..];
        }
        match self.mode {
            BufferMode::Line => {
                if let Some(nl) = memchr::memrchr(b'\n', &self.buf[..self.current]) {
                    self.drain_upto(nl + 1)?;
                }
            }
            BufferMode::None => self.drain_all()?,
            BufferMode::Full => {}
        }
        Ok(())
    }

    /// Drain everything pending and flush the underlying writer.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.drain_all()?;
        if let Some(FileIo::Writer(writer)) = self.io.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

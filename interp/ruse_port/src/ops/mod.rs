//! Public port operations, in safe and already-held forms.
//!
//! Every operation body is written once, as a method on [`PortGuard`]
//! that assumes the port lock is held. The matching method on [`Port`]
//! is a thin wrapper that acquires the lock and delegates; dropping the
//! guard releases the lock on every exit path, error returns included.
//! Compound bodies (`read_line`, the straddle loop, the peeks) call
//! sibling guard methods directly, so one public call never re-enters
//! the lock path.
//!
//! Operation shape, shared by every body:
//!
//! 1. closed check, then direction check
//! 2. pushback shortcut — scratch bytes first, then the ungotten
//!    character (materialized into scratch when the caller wants bytes)
//! 3. dispatch on the backend tag
//!
//! A hard I/O failure from a file backend drops the underlying
//! descriptor and latches the closed flag before the error is returned.
//! Virtual-backend calls clone the callback table and release the
//! state borrow first, so a callback that re-enters the safe API finds
//! the state available (the reentrant lock already admits the thread).

use std::io;
use std::sync::Arc;

use ruse_char::{decode, nfollows, MAX_ENCODED_LEN};

use crate::buffer::BufferMode;
use crate::error::{PortError, PortResult};
use crate::port::{Backend, Port, PortGuard};

// === Safe forms ===

impl Port {
    /// Write one byte.
    pub fn put_byte(&self, byte: u8) -> PortResult<()> {
        self.lock().put_byte(byte)
    }

    /// Write one code point.
    pub fn put_char(&self, ch: char) -> PortResult<()> {
        self.lock().put_char(ch)
    }

    /// Write a string.
    pub fn put_string(&self, s: &str) -> PortResult<()> {
        self.lock().put_string(s)
    }

    /// Write a raw byte run.
    pub fn put_block(&self, bytes: &[u8]) -> PortResult<()> {
        self.lock().put_block(bytes)
    }

    /// Push buffered output through to the underlying sink.
    pub fn flush(&self) -> PortResult<()> {
        self.lock().flush()
    }

    /// Read one byte; `None` at EOF.
    pub fn get_byte(&self) -> PortResult<Option<u8>> {
        self.lock().get_byte()
    }

    /// Read one code point; `None` at EOF.
    pub fn get_char(&self) -> PortResult<Option<char>> {
        self.lock().get_char()
    }

    /// Read up to `dst.len()` bytes; `None` when the port was already
    /// at EOF.
    pub fn get_block(&self, dst: &mut [u8]) -> PortResult<Option<usize>> {
        self.lock().get_block(dst)
    }

    /// Push one code point back; the next character read returns it.
    pub fn unget_char(&self, ch: char) -> PortResult<()> {
        self.lock().unget_char(ch)
    }

    /// Read one code point without consuming it.
    pub fn peek_char(&self) -> PortResult<Option<char>> {
        self.lock().peek_char()
    }

    /// Read one byte without consuming it.
    pub fn peek_byte(&self) -> PortResult<Option<u8>> {
        self.lock().peek_byte()
    }

    /// Read up to the next line terminator (`\n`, `\r`, or `\r\n`,
    /// never included in the result); `None` at EOF.
    pub fn read_line(&self) -> PortResult<Option<String>> {
        self.lock().read_line()
    }

    /// Flush and close the port, releasing the underlying resource.
    /// Closing a closed port is a no-op.
    pub fn close(&self) -> PortResult<()> {
        self.lock().close()
    }

    /// Change the drain policy of a file-backed output port.
    pub fn set_buffering(&self, mode: BufferMode) -> PortResult<()> {
        self.lock().set_buffering(mode)
    }

    /// The drain policy of a file-backed output port.
    pub fn buffering(&self) -> PortResult<BufferMode> {
        self.lock().buffering()
    }
}

// === Already-held forms ===

impl PortGuard<'_> {
    fn ready_input(&self, operation: &'static str) -> PortResult<()> {
        if self.state().closed {
            return Err(PortError::closed(self.name()));
        }
        if !self.direction().is_input() {
            return Err(PortError::bad_type(self.name(), operation));
        }
        Ok(())
    }

    fn ready_output(&self, operation: &'static str) -> PortResult<()> {
        if self.state().closed {
            return Err(PortError::closed(self.name()));
        }
        if !self.direction().is_output() {
            return Err(PortError::bad_type(self.name(), operation));
        }
        Ok(())
    }

    /// Wrap a hard backend failure. Callers drop the descriptor and
    /// latch the closed flag before constructing this.
    fn io_error(&self, operation: &'static str, source: io::Error) -> PortError {
        tracing::warn!(port = %self.name(), operation, "backend failure, port closed");
        PortError::backend(self.name(), operation, source)
    }

    // --- Output ---

    /// Write one byte.
    pub fn put_byte(&self, byte: u8) -> PortResult<()> {
        self.ready_output("put-byte")?;
        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => match fb.put_byte(byte) {
                Ok(()) => Ok(()),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("put-byte", e))
                }
            },
            Backend::OutStr(sink) => {
                sink.put_byte(byte);
                Ok(())
            }
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.put_byte(self.port, byte)
            }
            Backend::InStr(_) => Err(PortError::bad_type(self.name(), "put-byte")),
        }
    }

    /// Write one code point.
    pub fn put_char(&self, ch: char) -> PortResult<()> {
        self.ready_output("put-char")?;
        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => match fb.put_char(ch) {
                Ok(()) => Ok(()),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("put-char", e))
                }
            },
            Backend::OutStr(sink) => {
                sink.put_char(ch);
                Ok(())
            }
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.put_char(self.port, ch)
            }
            Backend::InStr(_) => Err(PortError::bad_type(self.name(), "put-char")),
        }
    }

    /// Write a string.
    pub fn put_string(&self, s: &str) -> PortResult<()> {
        self.ready_output("put-string")?;
        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => match fb.put_slice(s.as_bytes()) {
                Ok(()) => Ok(()),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("put-string", e))
                }
            },
            Backend::OutStr(sink) => {
                sink.put_slice(s.as_bytes());
                Ok(())
            }
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.put_str(self.port, s)
            }
            Backend::InStr(_) => Err(PortError::bad_type(self.name(), "put-string")),
        }
    }

    /// Write a raw byte run.
    pub fn put_block(&self, bytes: &[u8]) -> PortResult<()> {
        self.ready_output("put-block")?;
        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => match fb.put_slice(bytes) {
                Ok(()) => Ok(()),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("put-block", e))
                }
            },
            Backend::OutStr(sink) => {
                sink.put_slice(bytes);
                Ok(())
            }
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.put_slice(self.port, bytes)
            }
            Backend::InStr(_) => Err(PortError::bad_type(self.name(), "put-block")),
        }
    }

    /// Push buffered output through to the underlying sink.
    pub fn flush(&self) -> PortResult<()> {
        self.ready_output("flush")?;
        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => match fb.flush() {
                Ok(()) => Ok(()),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("flush", e))
                }
            },
            // Nothing is ever pending in a byte builder.
            Backend::OutStr(_) => Ok(()),
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.flush(self.port)
            }
            Backend::InStr(_) => Err(PortError::bad_type(self.name(), "flush")),
        }
    }

    // --- Input ---

    /// Read one byte; `None` at EOF.
    pub fn get_byte(&self) -> PortResult<Option<u8>> {
        self.ready_input("get-byte")?;
        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        if st.scrcnt > 0 {
            return Ok(Some(st.pop_scratch()));
        }
        if st.ungotten.is_some() {
            st.spill_ungotten();
            return Ok(Some(st.pop_scratch()));
        }
        match &mut st.backend {
            Backend::File(fb) => match fb.get_byte() {
                Ok(b) => Ok(b),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("get-byte", e))
                }
            },
            Backend::InStr(src) => Ok(src.get_byte()),
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.get_byte(self.port)
            }
            Backend::OutStr(_) => Err(PortError::bad_type(self.name(), "get-byte")),
        }
    }

    /// Read one code point; `None` at EOF.
    pub fn get_char(&self) -> PortResult<Option<char>> {
        self.ready_input("get-char")?;

        // Pushback shortcut. A scratch prefix may need more bytes than
        // scratch holds, so it is completed outside the state borrow.
        let stashed = {
            let mut borrow = self.state_mut();
            let st = &mut *borrow;
            if st.scrcnt > 0 {
                let mut seq = [0u8; MAX_ENCODED_LEN];
                let have = st.scrcnt;
                seq[..have].copy_from_slice(&st.scratch[..have]);
                st.scrcnt = 0;
                Some((seq, have))
            } else if let Some(ch) = st.ungotten.take() {
                return Ok(Some(ch));
            } else {
                None
            }
        };
        if let Some((seq, have)) = stashed {
            return self.complete_scratch_char(seq, have);
        }

        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => {
                let first = match fb.get_byte() {
                    Ok(Some(b)) => b,
                    Ok(None) => return Ok(None),
                    Err(e) => {
                        fb.release();
                        st.closed = true;
                        return Err(self.io_error("get-char", e));
                    }
                };
                let n = nfollows(first);
                if n == 0 {
                    if first == b'\n' {
                        fb.bump_line();
                    }
                    return Ok(Some(decode(&[first])));
                }
                let avail = fb.window().len();
                if avail >= n {
                    let mut seq = [0u8; MAX_ENCODED_LEN];
                    seq[0] = first;
                    seq[1..=n].copy_from_slice(&fb.window()[..n]);
                    fb.consume(n);
                    return Ok(Some(decode(&seq[..=n])));
                }
                // Straddle path: the sequence continues past the
                // window. Stash the prefix (including the consumed
                // first byte) in scratch and refill until it is whole.
                st.scratch[0] = first;
                st.scratch[1..=avail].copy_from_slice(fb.window());
                st.scrcnt = avail + 1;
                fb.consume(avail);
                let mut rest = n - avail;
                while rest > 0 {
                    let filled = match fb.fill(rest, false) {
                        Ok(f) => f,
                        Err(e) => {
                            fb.release();
                            st.closed = true;
                            return Err(self.io_error("get-char", e));
                        }
                    };
                    if filled == 0 {
                        // EOF mid-character. The partial bytes stay in
                        // scratch for the byte path to drain.
                        return Err(PortError::incomplete(self.name()));
                    }
                    let take = filled.min(rest);
                    st.scratch[st.scrcnt..st.scrcnt + take]
                        .copy_from_slice(&fb.window()[..take]);
                    st.scrcnt += take;
                    fb.consume(take);
                    rest -= take;
                }
                let ch = decode(&st.scratch[..st.scrcnt]);
                st.scrcnt = 0;
                Ok(Some(ch))
            }
            Backend::InStr(src) => {
                let Some(first) = src.get_byte() else {
                    return Ok(None);
                };
                let n = nfollows(first);
                if n == 0 {
                    return Ok(Some(decode(&[first])));
                }
                if src.window().len() < n {
                    return Err(PortError::incomplete(self.name()));
                }
                let mut seq = [0u8; MAX_ENCODED_LEN];
                seq[0] = first;
                seq[1..=n].copy_from_slice(&src.window()[..n]);
                src.consume(n);
                Ok(Some(decode(&seq[..=n])))
            }
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.get_char(self.port)
            }
            Backend::OutStr(_) => Err(PortError::bad_type(self.name(), "get-char")),
        }
    }

    /// Finish decoding a character whose prefix sat in scratch: keep
    /// taking bytes (which may consult the backend) until the sequence
    /// is whole. Extra scratch bytes past the first character's length
    /// mean byte-level pushback interleaved mid-sequence; the first
    /// unit decodes and the rest wait their turn.
    fn complete_scratch_char(
        &self,
        mut seq: [u8; MAX_ENCODED_LEN],
        have: usize,
    ) -> PortResult<Option<char>> {
        let need = nfollows(seq[0]) + 1;
        if have > need {
            // More bytes stashed than the first unit uses: put the
            // surplus back before decoding.
            let mut st = self.state_mut();
            for &b in seq[need..have].iter().rev() {
                st.push_scratch_front(b);
            }
        }
        for slot in seq.iter_mut().take(need).skip(have.min(need)) {
            match self.get_byte()? {
                Some(b) => *slot = b,
                None => return Err(PortError::incomplete(self.name())),
            }
        }
        Ok(Some(decode(&seq[..need])))
    }

    /// Read up to `dst.len()` bytes; `None` when the port was already
    /// at EOF. A request for zero bytes is trivially satisfied.
    pub fn get_block(&self, dst: &mut [u8]) -> PortResult<Option<usize>> {
        self.ready_input("get-block")?;
        if dst.is_empty() {
            return Ok(Some(0));
        }

        // Pushback bytes are delivered before the backend sees the
        // request.
        let prefilled = {
            let mut borrow = self.state_mut();
            let st = &mut *borrow;
            if st.scrcnt == 0 && st.ungotten.is_some() {
                st.spill_ungotten();
            }
            st.drain_scratch(dst)
        };
        if prefilled > 0 {
            if prefilled == dst.len() {
                return Ok(Some(prefilled));
            }
            // EOF on the remainder still returns the pushback bytes.
            let rest = self.get_block(&mut dst[prefilled..])?.unwrap_or(0);
            return Ok(Some(prefilled + rest));
        }

        let mut borrow = self.state_mut();
        let st = &mut *borrow;
        match &mut st.backend {
            Backend::File(fb) => match fb.read_block(dst) {
                Ok(0) => Ok(None),
                Ok(n) => Ok(Some(n)),
                Err(e) => {
                    fb.release();
                    st.closed = true;
                    Err(self.io_error("get-block", e))
                }
            },
            Backend::InStr(src) => Ok(src.read_block(dst)),
            Backend::Virtual(table) => {
                let table = Arc::clone(table);
                drop(borrow);
                table.get_block(self.port, dst)
            }
            Backend::OutStr(_) => Err(PortError::bad_type(self.name(), "get-block")),
        }
    }

    /// Push one code point back. Capacity is exactly one: a second
    /// unget before the next read replaces the first.
    pub fn unget_char(&self, ch: char) -> PortResult<()> {
        self.ready_input("unget-char")?;
        self.state_mut().ungotten = Some(ch);
        Ok(())
    }

    /// Read one code point without consuming it.
    pub fn peek_char(&self) -> PortResult<Option<char>> {
        let ch = self.get_char()?;
        if let Some(ch) = ch {
            self.state_mut().ungotten = Some(ch);
        }
        Ok(ch)
    }

    /// Read one byte without consuming it.
    pub fn peek_byte(&self) -> PortResult<Option<u8>> {
        let byte = self.get_byte()?;
        if let Some(byte) = byte {
            self.state_mut().push_scratch_front(byte);
        }
        Ok(byte)
    }

    // --- Line reader ---

    /// Read up to the next line terminator; `None` at EOF.
    ///
    /// `\n`, `\r`, and `\r\n` all end a line; the terminator is not
    /// included. A `\r` followed by anything but `\n` pushes the
    /// lookahead back, so nothing is lost.
    pub fn read_line(&self) -> PortResult<Option<String>> {
        let Some(mut ch) = self.get_char()? else {
            return Ok(None);
        };
        let mut acc = String::new();
        loop {
            match ch {
                '\n' => break,
                '\r' => {
                    match self.get_char()? {
                        None | Some('\n') => {}
                        Some(next) => self.unget_char(next)?,
                    }
                    break;
                }
                _ => {
                    acc.push(ch);
                    match self.get_char()? {
                        Some(next) => ch = next,
                        None => break,
                    }
                }
            }
        }
        Ok(Some(acc))
    }

    // --- Lifecycle and policy ---

    /// Flush and close the port. Idempotent; the underlying resource is
    /// released here rather than at drop time.
    pub fn close(&self) -> PortResult<()> {
        let table = {
            let mut borrow = self.state_mut();
            let st = &mut *borrow;
            if st.closed {
                return Ok(());
            }
            match &mut st.backend {
                Backend::File(fb) => {
                    let flushed = if self.port.direction().is_output() {
                        fb.flush()
                    } else {
                        Ok(())
                    };
                    fb.release();
                    st.closed = true;
                    tracing::trace!(port = %self.name(), "port closed");
                    return flushed.map_err(|e| self.io_error("close", e));
                }
                Backend::InStr(_) | Backend::OutStr(_) => {
                    st.closed = true;
                    tracing::trace!(port = %self.name(), "port closed");
                    return Ok(());
                }
                Backend::Virtual(table) => Arc::clone(table),
            }
        };
        // Virtual ports: the flush and close callbacks run while the
        // port still answers; the flag latches after they return.
        let mut result = Ok(());
        if self.port.direction().is_output() {
            result = table.flush(self.port);
        }
        if result.is_ok() {
            result = table.close(self.port);
        }
        self.state_mut().closed = true;
        tracing::trace!(port = %self.name(), "port closed");
        result
    }

    /// Change the drain policy. Valid only on file-backed output
    /// ports; the current buffer contents are untouched.
    pub fn set_buffering(&self, mode: BufferMode) -> PortResult<()> {
        if self.state().closed {
            return Err(PortError::closed(self.name()));
        }
        let mut borrow = self.state_mut();
        match &mut borrow.backend {
            Backend::File(fb) if self.port.direction().is_output() => {
                fb.set_mode(mode);
                Ok(())
            }
            _ => Err(PortError::bad_type(self.name(), "set-buffering")),
        }
    }

    /// The drain policy of a file-backed output port.
    pub fn buffering(&self) -> PortResult<BufferMode> {
        let st = self.state();
        if st.closed {
            return Err(PortError::closed(self.name()));
        }
        match &st.backend {
            Backend::File(fb) if self.port.direction().is_output() => Ok(fb.mode()),
            _ => Err(PortError::bad_type(self.name(), "port-buffering")),
        }
    }
}

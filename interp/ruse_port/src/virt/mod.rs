//! Virtual (procedural) port backend.
//!
//! A virtual port delegates every operation to caller code through the
//! [`VirtualPort`] trait. Every method is optional: the defaults fall
//! back through cheaper operations — character reads through byte
//! reads plus decoding, block writes through byte writes — bottoming
//! out in [`PortError::Unsupported`] when the byte-level primitive is
//! missing too. A table that only defines `get_byte` therefore serves
//! the whole input surface, and one that only defines `put_byte` serves
//! the whole output surface.
//!
//! Methods receive the owning [`Port`] and run under its lock. The lock
//! is reentrant, so a callback may call back into the port's safe API
//! (a block-read callback built on `port.get_byte()`, say) without
//! deadlocking. Callbacks needing mutable state use their own interior
//! mutability.

use crate::error::{PortError, PortResult};
use crate::port::Port;
use ruse_char::{decode, encode, nfollows, MAX_ENCODED_LEN};

/// Caller-supplied behavior for a virtual port.
///
/// Implement the byte-level methods and the defaults supply the rest;
/// override the higher-level methods when the underlying object has a
/// cheaper native form (a block device, a string queue, ...).
pub trait VirtualPort: Send + Sync {
    /// Read one byte; `None` at EOF. Bottom of the input fallback chain.
    fn get_byte(&self, port: &Port) -> PortResult<Option<u8>> {
        Err(PortError::unsupported(port.name(), "get-byte"))
    }

    /// Read one code point; `None` at EOF.
    ///
    /// Default: read bytes via [`Self::get_byte`] and decode. EOF in
    /// the middle of a multibyte sequence is an
    /// [`PortError::IncompleteChar`] condition.
    fn get_char(&self, port: &Port) -> PortResult<Option<char>> {
        let Some(first) = self.get_byte(port)? else {
            return Ok(None);
        };
        let n = nfollows(first);
        let mut seq = [0u8; MAX_ENCODED_LEN];
        seq[0] = first;
        for slot in seq.iter_mut().take(n + 1).skip(1) {
            match self.get_byte(port)? {
                Some(b) => *slot = b,
                None => return Err(PortError::incomplete(port.name())),
            }
        }
        Ok(Some(decode(&seq[..=n])))
    }

    /// Block read; `None` at EOF. Default: a [`Self::get_byte`] loop.
    fn get_block(&self, port: &Port, dst: &mut [u8]) -> PortResult<Option<usize>> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.get_byte(port)? {
                Some(b) => {
                    dst[filled] = b;
                    filled += 1;
                }
                None => break,
            }
        }
        if filled == 0 && !dst.is_empty() {
            Ok(None)
        } else {
            Ok(Some(filled))
        }
    }

    /// Write one byte. Bottom of the output fallback chain.
    fn put_byte(&self, port: &Port, _byte: u8) -> PortResult<()> {
        Err(PortError::unsupported(port.name(), "put-byte"))
    }

    /// Write one code point. Default: encode and forward to
    /// [`Self::put_slice`].
    fn put_char(&self, port: &Port, ch: char) -> PortResult<()> {
        let mut seq = [0u8; MAX_ENCODED_LEN];
        let n = encode(ch, &mut seq);
        self.put_slice(port, &seq[..n])
    }

    /// Write a string. Default: forward its bytes to
    /// [`Self::put_slice`].
    fn put_str(&self, port: &Port, s: &str) -> PortResult<()> {
        self.put_slice(port, s.as_bytes())
    }

    /// Write a byte run. Default: a [`Self::put_byte`] loop.
    fn put_slice(&self, port: &Port, bytes: &[u8]) -> PortResult<()> {
        for &b in bytes {
            self.put_byte(port, b)?;
        }
        Ok(())
    }

    /// Push pending output to the underlying object. Default: nothing
    /// is buffered, nothing to do.
    fn flush(&self, _port: &Port) -> PortResult<()> {
        Ok(())
    }

    /// Release underlying resources. Runs while the port still answers
    /// (the closed flag is set after this returns).
    fn close(&self, _port: &Port) -> PortResult<()> {
        Ok(())
    }
}

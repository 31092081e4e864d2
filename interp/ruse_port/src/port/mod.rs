//! The port object: tagged backend union, reentrant lock, factories.
//!
//! Mutable port state lives in a `RefCell` inside a
//! `parking_lot::ReentrantMutex`, the same shape the standard library
//! uses for its stdio handles. The reentrancy matters: a virtual-port
//! callback runs under the lock and may call back into the safe API of
//! the same port. The `RefCell` borrow, by contrast, is never held
//! across a callback invocation, so the re-entered operation borrows
//! cleanly.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::buffer::{BufferMode, FileBuf, DEFAULT_BUFFER_SIZE};
use crate::error::{PortError, PortResult};
use crate::mem::{ByteSink, ByteSource};
use crate::virt::VirtualPort;
use ruse_char::MAX_ENCODED_LEN;

/// Which operations a port accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Read operations only.
    Input,
    /// Write operations only.
    Output,
    /// Both, as some virtual ports are.
    InOut,
}

impl Direction {
    /// Whether read operations apply.
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::InOut)
    }

    /// Whether write operations apply.
    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::InOut)
    }
}

/// Backend tag, for introspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    /// Buffered window over a reader or writer.
    File,
    /// Read cursor over an immutable byte range.
    InputString,
    /// Append-only byte builder.
    OutputString,
    /// Caller-supplied callback table.
    Virtual,
}

/// Backend-specific state.
pub(crate) enum Backend {
    File(FileBuf),
    InStr(ByteSource),
    OutStr(ByteSink),
    Virtual(Arc<dyn VirtualPort>),
}

impl Backend {
    pub(crate) fn kind(&self) -> PortKind {
        match self {
            Backend::File(_) => PortKind::File,
            Backend::InStr(_) => PortKind::InputString,
            Backend::OutStr(_) => PortKind::OutputString,
            Backend::Virtual(_) => PortKind::Virtual,
        }
    }
}

/// Everything the port lock protects.
pub(crate) struct PortState {
    /// Latched by `close` (or a hard backend failure); never cleared.
    pub(crate) closed: bool,
    /// One pushed-back code point.
    pub(crate) ungotten: Option<char>,
    /// Bytes that must be delivered before the backend is consulted:
    /// a materialized pushback character, or the prefix of a multibyte
    /// sequence straddling a buffer refill.
    pub(crate) scratch: [u8; MAX_ENCODED_LEN],
    /// Valid bytes in `scratch`.
    pub(crate) scrcnt: usize,
    pub(crate) backend: Backend,
}

impl PortState {
    fn new(backend: Backend) -> Self {
        PortState {
            closed: false,
            ungotten: None,
            scratch: [0; MAX_ENCODED_LEN],
            scrcnt: 0,
            backend,
        }
    }

    /// Pop the first scratch byte, shifting the remainder down.
    pub(crate) fn pop_scratch(&mut self) -> u8 {
        let b = self.scratch[0];
        self.scrcnt -= 1;
        self.scratch.copy_within(1..=self.scrcnt, 0);
        b
    }

    /// Copy up to `dst.len()` scratch bytes out, shifting the remainder
    /// down. Returns the count taken.
    pub(crate) fn drain_scratch(&mut self, dst: &mut [u8]) -> usize {
        let take = self.scrcnt.min(dst.len());
        dst[..take].copy_from_slice(&self.scratch[..take]);
        self.scratch.copy_within(take..self.scrcnt, 0);
        self.scrcnt -= take;
        take
    }

    /// Materialize the ungotten code point into scratch bytes so the
    /// byte path can consume it. The two pushback slots never hold data
    /// at the same time.
    pub(crate) fn spill_ungotten(&mut self) {
        if let Some(ch) = self.ungotten.take() {
            self.scrcnt = ruse_char::encode(ch, &mut self.scratch);
        }
    }

    /// Push one byte back in front of any scratch content. The caller
    /// has just consumed at least one byte, so there is room.
    pub(crate) fn push_scratch_front(&mut self, byte: u8) {
        self.scratch.copy_within(0..self.scrcnt, 1);
        self.scrcnt += 1;
        self.scratch[0] = byte;
    }
}

/// A typed stream endpoint.
///
/// See the crate docs for the backend catalogue and the locking model.
/// Construct ports with the factory functions (`open_input_file`,
/// `open_input_string`, `virtual_port`, ...); share across threads with
/// `Arc<Port>`.
pub struct Port {
    name: String,
    direction: Direction,
    state: ReentrantMutex<RefCell<PortState>>,
}

/// A [`Port`] with its lock held.
///
/// Methods on the guard are the already-held forms of the public
/// operations: identical bodies, no locking. Dropping the guard
/// releases the lock.
pub struct PortGuard<'a> {
    pub(crate) port: &'a Port,
    pub(crate) inner: ReentrantMutexGuard<'a, RefCell<PortState>>,
}

impl Port {
    fn new(name: String, direction: Direction, backend: Backend) -> Port {
        tracing::trace!(port = %name, ?direction, "port opened");
        Port {
            name,
            direction,
            state: ReentrantMutex::new(RefCell::new(PortState::new(backend))),
        }
    }

    // === Factories ===

    /// Buffered input port over a file on disk.
    pub fn open_input_file(path: impl AsRef<Path>) -> PortResult<Port> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| PortError::backend(&name, "open", e))?;
        Ok(Port::new(
            name,
            Direction::Input,
            Backend::File(FileBuf::reader(Box::new(file), DEFAULT_BUFFER_SIZE)),
        ))
    }

    /// Buffered output port over a file on disk (created or truncated),
    /// fully buffered until `set_buffering` says otherwise.
    pub fn open_output_file(path: impl AsRef<Path>) -> PortResult<Port> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::create(path).map_err(|e| PortError::backend(&name, "open", e))?;
        Ok(Port::new(
            name,
            Direction::Output,
            Backend::File(FileBuf::writer(Box::new(file), DEFAULT_BUFFER_SIZE, BufferMode::Full)),
        ))
    }

    /// Buffered input port over any reader, with a caller-chosen window
    /// size (clamped to hold at least one encoded character).
    pub fn with_reader(
        name: impl Into<String>,
        reader: Box<dyn Read + Send>,
        size: usize,
    ) -> Port {
        Port::new(
            name.into(),
            Direction::Input,
            Backend::File(FileBuf::reader(reader, size)),
        )
    }

    /// Buffered output port over any writer.
    pub fn with_writer(
        name: impl Into<String>,
        writer: Box<dyn Write + Send>,
        size: usize,
        mode: BufferMode,
    ) -> Port {
        Port::new(
            name.into(),
            Direction::Output,
            Backend::File(FileBuf::writer(writer, size, mode)),
        )
    }

    /// Input port reading from an in-memory string.
    pub fn open_input_string(s: &str) -> Port {
        Port::new(
            "(input string)".to_owned(),
            Direction::Input,
            Backend::InStr(ByteSource::new(s.as_bytes().into())),
        )
    }

    /// Input port reading from raw bytes, which need not form valid
    /// encodings. The byte path hands them through untouched; the
    /// character path applies the usual malformed-input rules.
    pub fn open_input_bytes(bytes: impl Into<Box<[u8]>>) -> Port {
        Port::new(
            "(input bytes)".to_owned(),
            Direction::Input,
            Backend::InStr(ByteSource::new(bytes.into())),
        )
    }

    /// Output port accumulating into an in-memory byte builder; see
    /// [`Port::output_string`].
    pub fn open_output_string() -> Port {
        Port::new(
            "(output string)".to_owned(),
            Direction::Output,
            Backend::OutStr(ByteSink::default()),
        )
    }

    /// Port driven by a caller-supplied callback table.
    pub fn virtual_port(
        name: impl Into<String>,
        direction: Direction,
        table: Arc<dyn VirtualPort>,
    ) -> Port {
        Port::new(name.into(), direction, Backend::Virtual(table))
    }

    // === Lock ===

    /// Acquire the port lock, returning the already-held view. The lock
    /// is reentrant: locking a port this thread already holds nests
    /// rather than deadlocking.
    pub fn lock(&self) -> PortGuard<'_> {
        PortGuard { port: self, inner: self.state.lock() }
    }

    // === Introspection (safe forms) ===

    /// The port's name, as used in error conditions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which operations the port accepts.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The backend tag.
    pub fn kind(&self) -> PortKind {
        self.lock().kind()
    }

    /// Whether the port has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Newlines decoded so far on the input character path; `None` for
    /// backends that do not track lines.
    pub fn line(&self) -> Option<u64> {
        self.lock().line()
    }

    /// Bytes accumulated by an output-string port, open or closed.
    pub fn output_bytes(&self) -> PortResult<Vec<u8>> {
        self.lock().output_bytes()
    }

    /// String accumulated by an output-string port. Bytes written
    /// through the byte path that do not form valid encodings are
    /// replaced, as in lossy conversion.
    pub fn output_string(&self) -> PortResult<String> {
        self.lock().output_string()
    }
}

impl PortGuard<'_> {
    pub(crate) fn state(&self) -> Ref<'_, PortState> {
        self.inner.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, PortState> {
        self.inner.borrow_mut()
    }

    /// The port's name, as used in error conditions.
    pub fn name(&self) -> &str {
        self.port.name()
    }

    /// Which operations the port accepts.
    pub fn direction(&self) -> Direction {
        self.port.direction()
    }

    /// The backend tag.
    pub fn kind(&self) -> PortKind {
        self.state().backend.kind()
    }

    /// Whether the port has been closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Newlines decoded so far on the input character path.
    pub fn line(&self) -> Option<u64> {
        match &self.state().backend {
            Backend::File(fb) => Some(fb.line()),
            _ => None,
        }
    }

    /// Bytes accumulated by an output-string port.
    pub fn output_bytes(&self) -> PortResult<Vec<u8>> {
        match &self.state().backend {
            Backend::OutStr(sink) => Ok(sink.as_bytes().to_vec()),
            _ => Err(PortError::bad_type(self.name(), "get-output-string")),
        }
    }

    /// String accumulated by an output-string port, lossily decoded.
    pub fn output_string(&self) -> PortResult<String> {
        self.output_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately lock-free so a wedged port still prints.
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

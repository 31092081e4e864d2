//! I/O port subsystem for the Ruse interpreter.
//!
//! A [`Port`] is a typed stream endpoint: one reentrant lock, one
//! character of pushback, a few bytes of scratch for partial multibyte
//! sequences, and a tagged backend. Four backends share one observable
//! semantics:
//!
//! - **File**: a buffered byte window over any `Read` or `Write`
//!   implementation, with full / line / unbuffered drain policies
//! - **Input string**: a read cursor over an immutable byte range
//! - **Output string**: an append-only byte builder
//! - **Virtual**: caller-supplied [`VirtualPort`] callbacks
//!
//! # Locking and the dual API
//!
//! Every operation exists twice. The form on [`Port`] acquires the
//! port's reentrant lock, runs, and releases it on every exit path —
//! call it from anywhere. The form on [`PortGuard`] (from
//! [`Port::lock`]) assumes the lock is already held, so compound
//! operations can issue many inner reads without re-entering the lock:
//!
//! ```
//! use ruse_port::Port;
//!
//! let port = Port::open_input_string("a\r\nb");
//! // Safe form: locks per call.
//! assert_eq!(port.read_line()?, Some("a".to_string()));
//! // Held form: one lock across several calls.
//! let guard = port.lock();
//! assert_eq!(guard.get_char()?, Some('b'));
//! assert_eq!(guard.get_char()?, None);
//! # Ok::<(), ruse_port::PortError>(())
//! ```
//!
//! The lock is reentrant: a [`VirtualPort`] callback may call back into
//! the safe API of its own port without deadlocking.
//!
//! Ports are `Send + Sync`; share one across threads with `Arc` and the
//! safe API linearizes the operations.

mod buffer;
mod error;
mod mem;
mod ops;
mod port;
mod virt;

pub use buffer::{BufferMode, DEFAULT_BUFFER_SIZE};
pub use error::{PortError, PortResult};
pub use port::{Direction, Port, PortGuard, PortKind};
pub use virt::VirtualPort;

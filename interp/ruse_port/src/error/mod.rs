//! Typed conditions raised by port operations.

use std::io;

/// Result alias used across the port subsystem.
pub type PortResult<T> = Result<T, PortError>;

/// Error conditions raised by port operations.
///
/// Every variant names the offending port, so conditions read the way
/// the interpreter reports them to Scheme code. Operations never retry;
/// partial writes already accepted by a sink are not rewound.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Operation attempted on a closed port.
    #[error("I/O attempted on closed port: {port}")]
    Closed {
        /// Name of the port.
        port: String,
    },

    /// Operation not applicable to this backend or direction, such as a
    /// write on an input string or `set_buffering` on a non-file port.
    #[error("bad port type for {operation}: {port}")]
    BadPortType {
        /// Name of the port.
        port: String,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// EOF encountered in the middle of a multibyte sequence.
    #[error("encountered EOF in middle of a multibyte character from port {port}")]
    IncompleteChar {
        /// Name of the port.
        port: String,
    },

    /// The underlying fill, drain, or open primitive failed. A hard
    /// failure on an open port also marks the port closed.
    #[error("{operation} failed on port {port}")]
    Backend {
        /// Name of the port.
        port: String,
        /// The operation that was attempted.
        operation: &'static str,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A virtual port's callback table does not implement the requested
    /// operation (nor anything it could fall back to).
    #[error("virtual port {port} does not support {operation}")]
    Unsupported {
        /// Name of the port.
        port: String,
        /// The operation that was attempted.
        operation: &'static str,
    },
}

impl PortError {
    pub(crate) fn closed(port: &str) -> Self {
        PortError::Closed { port: port.to_owned() }
    }

    pub(crate) fn bad_type(port: &str, operation: &'static str) -> Self {
        PortError::BadPortType { port: port.to_owned(), operation }
    }

    pub(crate) fn incomplete(port: &str) -> Self {
        PortError::IncompleteChar { port: port.to_owned() }
    }

    pub(crate) fn backend(port: &str, operation: &'static str, source: io::Error) -> Self {
        PortError::Backend { port: port.to_owned(), operation, source }
    }

    pub(crate) fn unsupported(port: &str, operation: &'static str) -> Self {
        PortError::Unsupported { port: port.to_owned(), operation }
    }
}

//! Variable-width character codec for the Ruse interpreter.
//!
//! This crate is the single place the interpreter's stream encoding
//! (UTF-8) is spelled out. The port subsystem, the reader, and the
//! printer all consult these primitives instead of hard-coding byte
//! patterns, so swapping the encoding means swapping this crate.
//!
//! # Primitives
//!
//! - [`nfollows`]: continuation bytes required after a leading byte
//! - [`nbytes`]: encoded length of a code point
//! - [`encode`] / [`decode`]: one code point each way
//!
//! Both `encode` and `decode` assume the caller has already verified
//! that enough bytes are available (`nbytes` / `nfollows` + 1); the
//! port layer's scratch buffer exists precisely to establish that
//! precondition across buffer refills.
//!
//! # Malformed input
//!
//! Byte streams are not trusted to be well-formed. A stray continuation
//! byte, an overlong encoding, or a surrogate half decodes to
//! [`REPLACEMENT`] rather than raising — truncation by EOF is the only
//! condition the port layer reports as an error, and it detects that
//! itself from `nfollows`.

mod codec;

pub use codec::{decode, encode, nbytes, nfollows, MAX_ENCODED_LEN, REPLACEMENT};

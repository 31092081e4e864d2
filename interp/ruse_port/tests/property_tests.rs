//! Property-based tests for the port subsystem.
//!
//! These complement the unit suites with randomized coverage of the
//! invariants the ports promise:
//!
//! 1. Pushback round-trips leave the stream unchanged.
//! 2. The byte path performs no encoding: bytes in, bytes out.
//! 3. Put-then-flush leaves exactly the written encodings at the sink.
//! 4. Line mode keeps the sink at "everything through the last newline".
//! 5. Unbuffered mode keeps the sink fully current.
//! 6. Multibyte sequences decode across arbitrary fill chunkings.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use ruse_port::{BufferMode, Port};

/// Sink that records everything written, shared with the test body.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that yields at most `chunk` bytes per call.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.chunk.min(self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn trickle_port(data: &[u8], chunk: usize, window: usize) -> Port {
    let reader = Trickle { data: data.to_vec(), pos: 0, chunk };
    Port::with_reader("(trickle)", Box::new(reader), window)
}

proptest! {
    #[test]
    fn pushback_round_trip_preserves_the_stream(s in ".{0,40}") {
        let port = Port::open_input_string(&s);
        let mut seen = Vec::new();
        while let Some(ch) = port.get_char().unwrap() {
            port.unget_char(ch).unwrap();
            prop_assert_eq!(port.get_char().unwrap(), Some(ch));
            seen.push(ch);
        }
        prop_assert_eq!(port.get_char().unwrap(), None);
        prop_assert_eq!(seen, s.chars().collect::<Vec<_>>());
    }

    #[test]
    fn byte_path_writes_identity(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let port = Port::open_output_string();
        for &b in &bytes {
            port.put_byte(b).unwrap();
        }
        prop_assert_eq!(port.output_bytes().unwrap(), bytes);
    }

    #[test]
    fn byte_path_reads_identity(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let port = Port::open_input_bytes(bytes.clone());
        let mut seen = Vec::new();
        while let Some(b) = port.get_byte().unwrap() {
            seen.push(b);
        }
        prop_assert_eq!(seen, bytes);
    }

    #[test]
    fn put_then_flush_is_durable(
        parts in proptest::collection::vec(".{0,12}", 0..8),
        window in 4usize..32,
    ) {
        let sink = Capture::default();
        let port = Port::with_writer("(sink)", Box::new(sink.clone()), window, BufferMode::Full);
        let mut expected = Vec::new();
        for part in &parts {
            port.put_string(part).unwrap();
            expected.extend_from_slice(part.as_bytes());
        }
        port.flush().unwrap();
        prop_assert_eq!(sink.bytes(), expected);
    }

    #[test]
    fn line_mode_sink_tracks_the_last_newline(
        parts in proptest::collection::vec("[a-z\n]{0,10}", 0..8),
    ) {
        let sink = Capture::default();
        let port = Port::with_writer("(sink)", Box::new(sink.clone()), 64, BufferMode::Line);
        let mut written = Vec::new();
        for part in &parts {
            port.put_string(part).unwrap();
            written.extend_from_slice(part.as_bytes());
            // Everything through the last newline has reached the sink;
            // nothing after it has.
            let cut = written
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |i| i + 1);
            prop_assert_eq!(sink.bytes(), &written[..cut]);
        }
    }

    #[test]
    fn unbuffered_mode_sink_is_always_current(
        parts in proptest::collection::vec(".{0,10}", 0..8),
    ) {
        let sink = Capture::default();
        let port = Port::with_writer("(sink)", Box::new(sink.clone()), 16, BufferMode::None);
        let mut written = Vec::new();
        for part in &parts {
            port.put_string(part).unwrap();
            written.extend_from_slice(part.as_bytes());
            prop_assert_eq!(sink.bytes(), &written[..]);
        }
    }

    #[test]
    fn chars_survive_any_fill_chunking(
        s in ".{0,24}",
        chunk in 1usize..6,
        window in 4usize..16,
    ) {
        let port = trickle_port(s.as_bytes(), chunk, window);
        let mut seen = String::new();
        while let Some(ch) = port.get_char().unwrap() {
            seen.push(ch);
        }
        prop_assert_eq!(seen, s);
    }

    #[test]
    fn block_reads_reassemble_the_stream(
        bytes in proptest::collection::vec(any::<u8>(), 0..80),
        block in 1usize..16,
    ) {
        let port = Port::open_input_bytes(bytes.clone());
        let mut seen = Vec::new();
        let mut dst = vec![0u8; block];
        while let Some(n) = port.get_block(&mut dst).unwrap() {
            seen.extend_from_slice(&dst[..n]);
        }
        prop_assert_eq!(seen, bytes);
    }
}

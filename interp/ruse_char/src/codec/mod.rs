//! UTF-8 encode/decode primitives.
//!
//! The decoder is deliberately branchy rather than table-driven: the
//! port layer calls it once per character after buffering has already
//! amortized the I/O, so clarity wins over a 256-entry length table.

/// Maximum number of bytes a single encoded code point occupies.
///
/// Sizes the per-port scratch buffer: scratch must be able to hold one
/// complete encoded character (for pushback materialization) or one
/// partial character straddling a buffer refill.
pub const MAX_ENCODED_LEN: usize = 4;

/// Code point substituted for malformed input sequences.
pub const REPLACEMENT: char = '\u{FFFD}';

/// Number of continuation bytes that must follow `lead`.
///
/// Returns 0 for ASCII. Invalid leading bytes — stray continuation
/// bytes, the overlong leads `0xC0`/`0xC1`, and `0xF5..=0xFF` — also
/// return 0: they are treated as single-byte noise that [`decode`]
/// turns into [`REPLACEMENT`], so a damaged stream never wedges the
/// reader waiting for continuation bytes that cannot come.
pub fn nfollows(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 0,
        0xC2..=0xDF => 1,
        0xE0..=0xEF => 2,
        0xF0..=0xF4 => 3,
        _ => 0,
    }
}

/// Encoded length of `ch`, between 1 and [`MAX_ENCODED_LEN`].
pub fn nbytes(ch: char) -> usize {
    match u32::from(ch) {
        0x0000..=0x007F => 1,
        0x0080..=0x07FF => 2,
        0x0800..=0xFFFF => 3,
        _ => 4,
    }
}

/// Encode `ch` into the front of `dst`, returning the byte count.
///
/// `dst` must hold at least [`nbytes`]`(ch)` bytes.
#[allow(
    clippy::cast_possible_truncation,
    reason = "every cast is masked to six or seven payload bits first"
)]
pub fn encode(ch: char, dst: &mut [u8]) -> usize {
    let cp = u32::from(ch);
    match nbytes(ch) {
        1 => {
            dst[0] = cp as u8;
            1
        }
        2 => {
            dst[0] = 0xC0 | (cp >> 6) as u8;
            dst[1] = 0x80 | (cp & 0x3F) as u8;
            2
        }
        3 => {
            dst[0] = 0xE0 | (cp >> 12) as u8;
            dst[1] = 0x80 | ((cp >> 6) & 0x3F) as u8;
            dst[2] = 0x80 | (cp & 0x3F) as u8;
            3
        }
        _ => {
            dst[0] = 0xF0 | (cp >> 18) as u8;
            dst[1] = 0x80 | ((cp >> 12) & 0x3F) as u8;
            dst[2] = 0x80 | ((cp >> 6) & 0x3F) as u8;
            dst[3] = 0x80 | (cp & 0x3F) as u8;
            4
        }
    }
}

/// Decode one code point from the front of `src`.
///
/// `src` must hold at least [`nfollows`]`(src[0]) + 1` bytes. Malformed
/// sequences (bad continuation bytes, overlong encodings, surrogate
/// halves, values past U+10FFFF) decode to [`REPLACEMENT`].
pub fn decode(src: &[u8]) -> char {
    let lead = src[0];
    let n = nfollows(lead);
    if n == 0 {
        return if lead < 0x80 {
            char::from(lead)
        } else {
            REPLACEMENT
        };
    }
    // Minimum code point for each length rejects overlong encodings.
    let (mut cp, min) = match n {
        1 => (u32::from(lead & 0x1F), 0x80),
        2 => (u32::from(lead & 0x0F), 0x800),
        _ => (u32::from(lead & 0x07), 0x1_0000),
    };
    for &b in &src[1..=n] {
        if b & 0xC0 != 0x80 {
            return REPLACEMENT;
        }
        cp = (cp << 6) | u32::from(b & 0x3F);
    }
    if cp < min {
        return REPLACEMENT;
    }
    // from_u32 rejects surrogate halves and values past U+10FFFF.
    char::from_u32(cp).unwrap_or(REPLACEMENT)
}

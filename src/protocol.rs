//! Wire protocol: one query line in, one response line out.
//!
//! A request is the bytes up to and including the first `\n`; the portion
//! before the `\n`, minus one optional trailing `\r`, is the query. The
//! response is a single ASCII line followed by `\n`, after which the server
//! half-closes its write side and drops the connection.
//!
//! Queries are opaque byte strings. They are never decoded, re-encoded, or
//! case-folded; comparison against the data file is byte-exact.

use simdutf8::basic::from_utf8;

pub const STRING_EXISTS: &[u8] = b"STRING EXISTS\n";
pub const STRING_NOT_FOUND: &[u8] = b"STRING NOT FOUND\n";
pub const RATE_LIMIT_EXCEEDED: &[u8] = b"RATE LIMIT EXCEEDED\n";
pub const ERROR: &[u8] = b"ERROR\n";

/// Strips one trailing `\r`, if present.
///
/// Applied to queries after the `\n` is cut off, and to data-file records
/// after splitting on `\n`, so that CRLF and LF input agree byte-for-byte.
#[inline]
pub(crate) fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

#[inline]
pub(crate) const fn membership_response(found: bool) -> &'static [u8] {
    if found {
        STRING_EXISTS
    } else {
        STRING_NOT_FOUND
    }
}

/// Returns the query as text when it is valid UTF-8.
///
/// Used only for debug logging; lookups always operate on the raw bytes.
#[inline]
pub(crate) fn printable(query: &[u8]) -> Option<&str> {
    from_utf8(query).ok()
}

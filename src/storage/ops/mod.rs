//! Typed operations on a [`Database`](crate::storage::Database), one
//! module per value type.

pub mod hashes;
pub mod lists;
pub mod sets;
pub mod sorted_sets;
pub mod streams;
pub mod strings;

pub use hashes::*;
pub use lists::*;
pub use sets::*;
pub use sorted_sets::*;
pub use streams::*;
pub use strings::*;

/// Normalise Redis-style inclusive indices (negative from the end) against
/// a collection of `len` elements. Returns `None` for an empty range.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

/// Normalise one Redis-style index, `None` when out of range
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

/// Strict decimal integer parse: no whitespace, no leading `+`
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes[0] == b'+' || bytes.len() > 20 {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

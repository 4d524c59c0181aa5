//! Miscellaneous utility functions.

/// Iterates over `0..count`, starting at `start` and wrapping around.
pub fn rotated_range(count: usize, start: usize) -> impl Iterator<Item = usize> {
    (0..count)
        .map(move |i| i + start)
        .map(move |i| if i >= count { i - count } else { i })
}

/// The index after `idx` in a cyclic sequence of length `len`.
pub fn cyclic_next(idx: usize, len: usize) -> usize {
    if idx + 1 >= len {
        0
    } else {
        idx + 1
    }
}

/// The index before `idx` in a cyclic sequence of length `len`.
pub fn cyclic_prev(idx: usize, len: usize) -> usize {
    if idx == 0 {
        len - 1
    } else {
        idx - 1
    }
}

//! Freshness comparison for wrapping 15-bit sequence counters
//!
//! Zone link-state and inter-zone query ids count up to `i16::MAX` and wrap
//! to zero. A value is "after" another if it is ahead by less than
//! [`SEQ_WINDOW`], allowing for one wrap.

/// How far ahead a sequence number may be and still count as newer
pub const SEQ_WINDOW: i32 = 10;

/// True if `s1` is strictly newer than `s2` under wraparound
pub fn seq_after(s1: i16, s2: i16) -> bool {
    let (s1, s2) = (s1 as i32, s2 as i32);
    let wrapped = s1 + i16::MAX as i32;
    (s1 > s2 && s1 - s2 < SEQ_WINDOW) || (wrapped > s2 && wrapped - s2 < SEQ_WINDOW)
}

/// Advance a counter, wrapping to zero at `i16::MAX`
pub fn next_seq(seq: i16) -> i16 {
    let next = seq.wrapping_add(1);
    if next == i16::MAX || next < 0 {
        0
    } else {
        next
    }
}

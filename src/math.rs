//! Integer ceiling/floor division over power-of-two shifts.
//!
//! Packet geometry is defined entirely in terms of exact integer divisions
//! (B-14, B-16 and B.12.1.3 through B.12.1.5). An off-by-one here changes
//! which precinct a sample belongs to, so everything stays in integer
//! arithmetic with widened intermediates.

/// Ceiling division by a power of two (`ceil(value / 2^shift)`).
#[inline]
pub(crate) fn ceil_div_pow2(value: u32, shift: u32) -> u32 {
    debug_assert!(shift < 64);
    ((value as u64 + (1u64 << shift) - 1) >> shift) as u32
}

/// Floor division by a power of two (`floor(value / 2^shift)`).
#[inline]
pub(crate) fn floor_div_pow2(value: u32, shift: u32) -> u32 {
    debug_assert!(shift < 32);
    value >> shift
}

/// `value << shift`, saturating to `u64::MAX` when bits would be lost.
#[inline]
pub(crate) fn shl_saturating(value: u64, shift: u32) -> u64 {
    if shift >= 64 || value > u64::MAX >> shift {
        u64::MAX
    } else {
        value << shift
    }
}

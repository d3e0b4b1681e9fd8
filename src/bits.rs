//! Bit-width helpers

/// Mask covering the low `width` bits (`width` up to 64)
#[inline]
pub const fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Check that `value` is representable in `width` bits
#[inline]
pub const fn fits(value: u64, width: u32) -> bool {
    value & !mask(width) == 0
}

//! Alignment arithmetic shared by arenas and virtual spaces
//!
//! All helpers require a power-of-two alignment.

/// Machine word size, the unit every arena chunk is aligned to
pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

pub const K: usize = 1024;
pub const M: usize = K * K;

/// Align value upward to next multiple of alignment
///
/// Uses bit manipulation for branch-free execution:
/// - Add (align - 1) to round up
/// - Mask with !(align - 1) to align down
#[inline(always)]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}

/// Align value downward to previous multiple of alignment
#[inline(always)]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !align.wrapping_sub(1)
}

#[inline(always)]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & align.wrapping_sub(1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(10_000, 4096), 12_288);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0, 8), 0);
        assert_eq!(align_down(7, 8), 0);
        assert_eq!(align_down(15, 8), 8);
        assert_eq!(align_down(5000, 4096), 4096);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(0, 16));
        assert!(is_aligned(4096, 4096));
        assert!(!is_aligned(4097, 4096));
    }
}

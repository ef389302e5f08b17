//! # Boundary Tag
//!
//! The single word written at both ends of every block.

use crate::DOUBLE_WORD;
use bitfield_struct::bitfield;

/// Header/footer word: `size | allocated`.
///
/// Block sizes are multiples of [`DOUBLE_WORD`], so the low four bits of a
/// size are always zero. Bit 0 carries the allocated flag; bits 1..4 stay
/// clear. The raw `u64` therefore reads back as the familiar `size | alloc`
/// encoding.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct BoundaryTag {
    /// Allocated flag (bit 0).
    pub allocated: bool,
    /// Always zero (bits 1..4); sizes are double-word multiples.
    #[bits(3)]
    __: u8,
    /// Block size in double-word units (bits 4..64).
    #[bits(60)]
    chunks: u64,
}

impl BoundaryTag {
    /// Tag for an allocated block spanning `size` bytes.
    ///
    /// A `size` of zero produces the epilogue encoding (`alloc=1, size=0`).
    #[inline]
    #[must_use]
    pub const fn make_allocated(size: usize) -> Self {
        Self::make(size, true)
    }

    /// Tag for a free block spanning `size` bytes.
    #[inline]
    #[must_use]
    pub const fn make_free(size: usize) -> Self {
        Self::make(size, false)
    }

    const fn make(size: usize, allocated: bool) -> Self {
        debug_assert!(size % DOUBLE_WORD == 0);
        Self::new()
            .with_allocated(allocated)
            .with_chunks((size / DOUBLE_WORD) as u64)
    }

    /// Block size in bytes (header and footer included).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn size(self) -> usize {
        (self.chunks() as usize) * DOUBLE_WORD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoding_is_size_or_alloc() {
        assert_eq!(BoundaryTag::make_allocated(48).into_bits(), 48 | 1);
        assert_eq!(BoundaryTag::make_free(4096).into_bits(), 4096);
        assert_eq!(BoundaryTag::make_allocated(0).into_bits(), 1);
    }

    #[test]
    fn size_and_flag_round_trip() {
        let tag = BoundaryTag::make_allocated(160);
        assert_eq!(tag.size(), 160);
        assert!(tag.allocated());

        let tag = BoundaryTag::make_free(32);
        assert_eq!(tag.size(), 32);
        assert!(!tag.allocated());
    }

    #[test]
    fn epilogue_encoding() {
        let tag = BoundaryTag::make_allocated(0);
        assert_eq!(tag.size(), 0);
        assert!(tag.allocated());
    }
}

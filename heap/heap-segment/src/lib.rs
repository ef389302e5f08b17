//! # Heap Segment Primitive
//!
//! The allocator's only outbound dependency: a contiguous region of memory
//! that can be grown upward, one break-pointer bump at a time.
//!
//! [`Segment`] is the seam. The allocator asks it for more bytes when no
//! free block fits and queries its bounds for consistency checking; it
//! never shrinks the region and never maps anything non-contiguous.
//!
//! [`ArenaSegment`] is the bundled implementation: break-pointer emulation
//! over a fixed region, typically a static [`ArenaStorage`] array. Hosts
//! with a real page-granting facility implement [`Segment`] over it
//! instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod arena;

pub use arena::{ArenaSegment, ArenaStorage};

use core::ptr::NonNull;

/// Why a segment refused to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    /// The region cannot supply the requested number of bytes.
    #[error("segment exhausted: requested {requested} bytes, {available} available")]
    Exhausted {
        /// Bytes asked for.
        requested: usize,
        /// Bytes the segment could still supply.
        available: usize,
    },
}

/// An upward-growable, contiguous memory region.
pub trait Segment {
    /// Grow the mapped region by `incr` bytes.
    ///
    /// Returns the address of the first newly mapped byte. Successive
    /// extensions are contiguous: each returned address equals the previous
    /// [`hi`](Self::hi).
    ///
    /// # Errors
    /// [`SegmentError::Exhausted`] when the region cannot grow by `incr`.
    fn extend(&mut self, incr: usize) -> Result<NonNull<u8>, SegmentError>;

    /// Lowest mapped address.
    fn lo(&self) -> *mut u8;

    /// One past the highest mapped address.
    fn hi(&self) -> *mut u8;
}

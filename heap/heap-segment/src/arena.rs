//! # Fixed-Arena Segment
//!
//! Break-pointer emulation over a region that already exists in full. The
//! break starts at the region's base and only ever moves up; bytes beyond
//! it count as unmapped even though they are backed by real storage.

use crate::{Segment, SegmentError};
use core::ptr::NonNull;

/// Backing storage for an arena, aligned for block payloads.
///
/// Declare one as a `static` (or leak a boxed one in tests) and hand it to
/// [`ArenaSegment::from_static`].
#[repr(align(16))]
pub struct ArenaStorage<const N: usize>([u8; N]);

impl<const N: usize> ArenaStorage<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> Default for ArenaStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Segment`] over a fixed region of memory.
pub struct ArenaSegment {
    base: NonNull<u8>,
    capacity: usize,
    /// Current break, as an offset from `base`. Only moves up.
    brk: usize,
}

// Safety: the segment owns its region exclusively; callers serialize access.
unsafe impl Send for ArenaSegment {}

impl ArenaSegment {
    /// Wrap the region `[start, start + capacity)`.
    ///
    /// # Safety
    /// The region must be valid, writable, 16-byte aligned, and used by
    /// nothing but this segment for as long as it lives.
    #[must_use]
    pub const unsafe fn from_raw(start: *mut u8, capacity: usize) -> Self {
        Self {
            base: unsafe { NonNull::new_unchecked(start) },
            capacity,
            brk: 0,
        }
    }

    /// Wrap a static backing array.
    #[must_use]
    pub fn from_static<const N: usize>(storage: &'static mut ArenaStorage<N>) -> Self {
        // Safety: the exclusive 'static borrow guarantees the region is
        // valid, writable, and unshared; ArenaStorage fixes the alignment.
        unsafe { Self::from_raw(storage.0.as_mut_ptr(), N) }
    }

    /// Total bytes the region can ever supply.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Segment for ArenaSegment {
    fn extend(&mut self, incr: usize) -> Result<NonNull<u8>, SegmentError> {
        let available = self.capacity - self.brk;
        if incr > available {
            return Err(SegmentError::Exhausted {
                requested: incr,
                available,
            });
        }
        // Safety: the bound check above keeps the new break inside the region.
        let mapped = unsafe { self.base.add(self.brk) };
        self.brk += incr;
        Ok(mapped)
    }

    fn lo(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    fn hi(&self) -> *mut u8 {
        self.base.as_ptr().wrapping_add(self.brk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_segment<const N: usize>() -> ArenaSegment {
        ArenaSegment::from_static(Box::leak(Box::new(ArenaStorage::<N>::new())))
    }

    #[test]
    fn extensions_are_contiguous() {
        let mut seg = leaked_segment::<4096>();
        let lo = seg.lo();
        assert_eq!(seg.hi(), lo);

        let first = seg.extend(48).unwrap();
        assert_eq!(first.as_ptr(), lo);
        assert_eq!(seg.hi(), lo.wrapping_add(48));

        let second = seg.extend(16).unwrap();
        assert_eq!(second.as_ptr(), lo.wrapping_add(48));
        assert_eq!(seg.hi(), lo.wrapping_add(64));
    }

    #[test]
    fn exhaustion_reports_remaining_capacity() {
        let mut seg = leaked_segment::<64>();
        seg.extend(48).unwrap();
        assert_eq!(
            seg.extend(32),
            Err(SegmentError::Exhausted {
                requested: 32,
                available: 16,
            })
        );
        // A failed extension leaves the break where it was.
        assert_eq!(seg.hi(), seg.lo().wrapping_add(48));
        seg.extend(16).unwrap();
    }

    #[test]
    fn base_is_payload_aligned() {
        let seg = leaked_segment::<64>();
        assert_eq!(seg.lo() as usize % 16, 0);
        assert_eq!(seg.capacity(), 64);
    }
}

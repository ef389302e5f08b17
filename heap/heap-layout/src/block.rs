//! # Block Pointer
//!
//! Payload-address wrapper carrying the pointer arithmetic of the block
//! layout. All accessors are raw word loads and stores; nothing here keeps
//! the heap consistent on its own.

use crate::{BoundaryTag, DOUBLE_WORD, WORD_SIZE};
use core::fmt;
use core::ptr;

/// Pointer to a block's payload.
///
/// The interesting addresses of a block all derive from its payload address
/// `p`:
///
/// | Word | Address |
/// |------|---------|
/// | header | `p - W` |
/// | footer | `p + size - 2W` |
/// | free-list `prev` link | `p` |
/// | free-list `next` link | `p + W` |
/// | forward neighbor payload | `p + size` |
/// | backward neighbor footer | `p - 2W` |
///
/// A null `BlockPtr` is the "no block" value used by the free-list links.
///
/// # Safety
/// The accessors dereference raw heap memory. Callers must ensure the
/// pointer addresses a live block of a heap whose tags are intact; the
/// footer and neighbor accessors additionally trust the size stored in the
/// header.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct BlockPtr(*mut u8);

impl BlockPtr {
    /// Wrap a payload address.
    #[inline]
    #[must_use]
    pub const fn from_payload(payload: *mut u8) -> Self {
        Self(payload)
    }

    /// The "no block" value.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self(ptr::null_mut())
    }

    /// The payload address handed out to callers.
    #[inline]
    #[must_use]
    pub const fn payload(self) -> *mut u8 {
        self.0
    }

    /// Payload address as an integer, for bounds arithmetic.
    #[inline]
    #[must_use]
    pub fn addr(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Read the header tag.
    ///
    /// # Safety
    /// `self` must address a block with a readable header word.
    #[inline]
    #[must_use]
    pub unsafe fn header(self) -> BoundaryTag {
        BoundaryTag::from_bits(unsafe { self.0.sub(WORD_SIZE).cast::<u64>().read() })
    }

    /// Write the header tag.
    ///
    /// # Safety
    /// `self` must address a block with a writable header word.
    #[inline]
    pub unsafe fn set_header(self, tag: BoundaryTag) {
        unsafe { self.0.sub(WORD_SIZE).cast::<u64>().write(tag.into_bits()) }
    }

    /// Read the footer tag. The footer position derives from the header
    /// size, so the header must be written first when a block grows.
    ///
    /// # Safety
    /// The header must hold the block's current size and the footer word
    /// must be readable.
    #[inline]
    #[must_use]
    pub unsafe fn footer(self) -> BoundaryTag {
        unsafe {
            let at = self.0.add(self.size() - DOUBLE_WORD);
            BoundaryTag::from_bits(at.cast::<u64>().read())
        }
    }

    /// Write the footer tag at the position given by the header size.
    ///
    /// # Safety
    /// The header must already hold the block's current size and the footer
    /// word must be writable.
    #[inline]
    pub unsafe fn set_footer(self, tag: BoundaryTag) {
        unsafe {
            let at = self.0.add(self.size() - DOUBLE_WORD);
            at.cast::<u64>().write(tag.into_bits());
        }
    }

    /// Block size in bytes, read from the header.
    ///
    /// # Safety
    /// As for [`header`](Self::header).
    #[inline]
    #[must_use]
    pub unsafe fn size(self) -> usize {
        unsafe { self.header().size() }
    }

    /// Allocated flag, read from the header.
    ///
    /// # Safety
    /// As for [`header`](Self::header).
    #[inline]
    #[must_use]
    pub unsafe fn is_allocated(self) -> bool {
        unsafe { self.header().allocated() }
    }

    /// The previous block's footer: the word directly below this payload.
    ///
    /// # Safety
    /// A block (or the prologue) must end directly below this one.
    #[inline]
    #[must_use]
    pub unsafe fn prev_footer(self) -> BoundaryTag {
        BoundaryTag::from_bits(unsafe { self.0.sub(DOUBLE_WORD).cast::<u64>().read() })
    }

    /// The next block in heap order.
    ///
    /// # Safety
    /// The header size must be intact and the neighbor mapped.
    #[inline]
    #[must_use]
    pub unsafe fn next_in_heap(self) -> Self {
        Self(unsafe { self.0.add(self.size()) })
    }

    /// The previous block in heap order, located through its footer.
    ///
    /// # Safety
    /// A block with an intact footer must end directly below this one.
    #[inline]
    #[must_use]
    pub unsafe fn prev_in_heap(self) -> Self {
        Self(unsafe { self.0.sub(self.prev_footer().size()) })
    }

    /// Free-list `prev` link (payload word 0). Null at the list head.
    ///
    /// # Safety
    /// The block must be free; allocated payloads do not carry links.
    #[inline]
    #[must_use]
    pub unsafe fn prev_free(self) -> Self {
        Self(unsafe { self.0.cast::<*mut u8>().read() })
    }

    /// Free-list `next` link (payload word 1).
    ///
    /// # Safety
    /// The block must be free; allocated payloads do not carry links.
    #[inline]
    #[must_use]
    pub unsafe fn next_free(self) -> Self {
        Self(unsafe { self.0.add(WORD_SIZE).cast::<*mut u8>().read() })
    }

    /// Store the free-list `prev` link.
    ///
    /// # Safety
    /// The payload words must be writable and unclaimed by a caller.
    #[inline]
    pub unsafe fn set_prev_free(self, prev: Self) {
        unsafe { self.0.cast::<*mut u8>().write(prev.0) }
    }

    /// Store the free-list `next` link.
    ///
    /// # Safety
    /// The payload words must be writable and unclaimed by a caller.
    #[inline]
    pub unsafe fn set_next_free(self, next: Self) {
        unsafe { self.0.add(WORD_SIZE).cast::<*mut u8>().write(next.0) }
    }
}

impl fmt::Debug for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPtr(0x{:016X})", self.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIN_BLOCK_SIZE;

    #[repr(align(16))]
    struct Arena([u8; 256]);

    /// Two hand-built blocks: a free 64-byte block followed by an allocated
    /// 32-byte one.
    fn build(arena: &mut Arena) -> (BlockPtr, BlockPtr) {
        let base = arena.0.as_mut_ptr();
        unsafe {
            let a = BlockPtr::from_payload(base.add(16));
            a.set_header(BoundaryTag::make_free(64));
            a.set_footer(BoundaryTag::make_free(64));

            let b = a.next_in_heap();
            b.set_header(BoundaryTag::make_allocated(32));
            b.set_footer(BoundaryTag::make_allocated(32));
            (a, b)
        }
    }

    #[test]
    fn header_and_footer_agree() {
        let mut arena = Arena([0; 256]);
        let (a, b) = build(&mut arena);
        unsafe {
            assert_eq!(a.header(), a.footer());
            assert_eq!(b.header(), b.footer());
            assert_eq!(a.size(), 64);
            assert!(!a.is_allocated());
            assert!(b.is_allocated());
        }
    }

    #[test]
    fn neighbors_are_mutually_reachable() {
        let mut arena = Arena([0; 256]);
        let (a, b) = build(&mut arena);
        unsafe {
            assert_eq!(a.next_in_heap(), b);
            assert_eq!(b.prev_in_heap(), a);
            assert_eq!(b.prev_footer(), a.footer());
            assert_eq!(b.addr() - a.addr(), 64);
        }
    }

    #[test]
    fn links_live_in_the_payload() {
        let mut arena = Arena([0; 256]);
        let (a, b) = build(&mut arena);
        unsafe {
            a.set_prev_free(BlockPtr::null());
            a.set_next_free(b);
            assert!(a.prev_free().is_null());
            assert_eq!(a.next_free(), b);
        }
    }

    #[test]
    fn minimum_block_spans_exactly_its_metadata() {
        let mut arena = Arena([0; 256]);
        let base = arena.0.as_mut_ptr();
        unsafe {
            let tiny = BlockPtr::from_payload(base.add(16));
            tiny.set_header(BoundaryTag::make_free(MIN_BLOCK_SIZE));
            tiny.set_footer(BoundaryTag::make_free(MIN_BLOCK_SIZE));
            // Links and footer fit without overlap: prev at +0, next at +8,
            // footer at +16.
            tiny.set_prev_free(BlockPtr::null());
            tiny.set_next_free(BlockPtr::null());
            assert_eq!(tiny.footer(), BoundaryTag::make_free(MIN_BLOCK_SIZE));
            assert!(tiny.prev_free().is_null());
            assert!(tiny.next_free().is_null());
        }
    }
}

//! # Tagged Heap
//!
//! The allocator proper: block placement, splitting, coalescing, and
//! reallocation over a [`Segment`].

use crate::error::InitError;
use crate::free_list::FreeList;
use core::ptr;
use heap_layout::{BlockPtr, BoundaryTag, DOUBLE_WORD, MIN_BLOCK_SIZE, WORD_SIZE, align_up};
use heap_segment::{Segment, SegmentError};
use log::{debug, trace};

/// Bytes requested from the segment whenever the heap has to grow.
pub const CHUNK_SIZE: usize = 4096;

/// A boundary-tagged heap over an upward-growable segment.
///
/// Construct with [`new`](Self::new), bring up with [`init`](Self::init),
/// then allocate. `free` and `realloc` are unsafe for the usual malloc
/// reason: nothing ties the pointers they take back to this heap's
/// provenance at compile time.
pub struct TagHeap<S> {
    pub(crate) segment: S,
    /// Prologue payload; doubles as the free-list sentinel. Null until
    /// [`init`](Self::init) has run.
    pub(crate) base: BlockPtr,
    pub(crate) free: FreeList,
}

// Safety: TagHeap hands out raw pointers but holds its own only into the
// segment it exclusively owns; moving it across threads moves the segment
// with it.
unsafe impl<S: Segment + Send> Send for TagHeap<S> {}

impl<S: Segment> TagHeap<S> {
    /// A heap over `segment`, not yet initialized.
    pub const fn new(segment: S) -> Self {
        Self {
            segment,
            base: BlockPtr::null(),
            free: FreeList::new(),
        }
    }

    /// Lay down the prologue and epilogue sentinels, then map the first
    /// [`CHUNK_SIZE`] bytes as one free block.
    ///
    /// # Errors
    /// [`InitError::Segment`] when either extension is refused;
    /// [`InitError::AlreadyInitialized`] on a second call.
    pub fn init(&mut self) -> Result<(), InitError> {
        if !self.base.is_null() {
            return Err(InitError::AlreadyInitialized);
        }

        // Preamble: | pad | prologue hdr | prev | next | prologue ftr |
        // epilogue hdr |. The pad word shifts payloads onto double-word
        // boundaries.
        let start = self.segment.extend(6 * WORD_SIZE)?.as_ptr();
        let prologue = BlockPtr::from_payload(unsafe { start.add(2 * WORD_SIZE) });
        unsafe {
            let tag = BoundaryTag::make_allocated(2 * DOUBLE_WORD);
            prologue.set_header(tag);
            prologue.set_prev_free(BlockPtr::null());
            prologue.set_next_free(BlockPtr::null());
            prologue.set_footer(tag);
            prologue
                .next_in_heap()
                .set_header(BoundaryTag::make_allocated(0));
        }
        self.base = prologue;
        self.free.reset(prologue);

        self.extend_heap(CHUNK_SIZE)?;
        trace!("heap initialized, {} bytes mapped", self.heap_size());
        Ok(())
    }

    /// Allocate a block with at least `size` payload bytes.
    ///
    /// Returns a double-word aligned payload pointer, or null when `size`
    /// is zero or the segment cannot supply the space.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 || self.base.is_null() {
            return ptr::null_mut();
        }
        let adjusted = Self::adjust(size);

        let block = match unsafe { self.free.find_first_fit(adjusted) } {
            Some(block) => block,
            None => match self.extend_heap(adjusted.max(CHUNK_SIZE)) {
                Ok(block) => block,
                Err(err) => {
                    debug!("allocation of {size} bytes failed: {err}");
                    return ptr::null_mut();
                }
            },
        };
        unsafe { self.place(block, adjusted) };
        block.payload()
    }

    /// Return `payload` to the heap. Accepts null as a no-op.
    ///
    /// # Safety
    /// `payload` must be null or a pointer obtained from this heap's
    /// [`alloc`](Self::alloc)/[`realloc`](Self::realloc) and not freed
    /// since.
    pub unsafe fn free(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        let block = BlockPtr::from_payload(payload);
        unsafe {
            let tag = BoundaryTag::make_free(block.size());
            block.set_header(tag);
            block.set_footer(tag);
            // The links are stale at this point; coalesce's final insert
            // rewrites them.
            self.coalesce(block);
        }
    }

    /// Resize the allocation at `payload` to at least `size` bytes.
    ///
    /// Shrinking keeps the block as-is. Growing first tries to absorb a
    /// free forward neighbor in place; otherwise the data moves to a fresh
    /// block and the old one is freed. `realloc(null, n)` allocates;
    /// `realloc(p, 0)` frees and returns null.
    ///
    /// # Safety
    /// As for [`free`](Self::free).
    pub unsafe fn realloc(&mut self, payload: *mut u8, size: usize) -> *mut u8 {
        if payload.is_null() {
            return self.alloc(size);
        }
        if size == 0 {
            unsafe { self.free(payload) };
            return ptr::null_mut();
        }

        let block = BlockPtr::from_payload(payload);
        let adjusted = Self::adjust(size);
        let old = unsafe { block.size() };
        if adjusted <= old {
            // Oversized blocks stay whole; splitting here would churn the
            // list to save bytes that a later grow would claw back anyway.
            return payload;
        }

        unsafe {
            let next = block.next_in_heap();
            if !next.is_allocated() && old + next.size() >= adjusted {
                let combined = old + next.size();
                self.free.remove(next);
                let tag = BoundaryTag::make_allocated(combined);
                block.set_header(tag);
                block.set_footer(tag);
                return payload;
            }
        }

        let fresh = self.alloc(size);
        if fresh.is_null() {
            return ptr::null_mut();
        }
        unsafe {
            ptr::copy_nonoverlapping(payload, fresh, old - DOUBLE_WORD);
            self.free(payload);
        }
        fresh
    }

    /// Bytes currently mapped, preamble included.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.segment.hi() as usize - self.segment.lo() as usize
    }

    /// Blocks currently on the free list.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        if self.base.is_null() {
            return 0;
        }
        unsafe { self.free.len() }
    }

    /// Request size -> block size: header and footer added, rounded up to
    /// the double word, never below the minimum block.
    const fn adjust(size: usize) -> usize {
        if size <= DOUBLE_WORD {
            MIN_BLOCK_SIZE
        } else {
            align_up(size + DOUBLE_WORD, DOUBLE_WORD)
        }
    }

    /// Map `bytes` more heap (rounded up to the double word), stamp the new
    /// region as one free block, and merge it with a trailing free block.
    fn extend_heap(&mut self, bytes: usize) -> Result<BlockPtr, SegmentError> {
        let size = align_up(bytes, DOUBLE_WORD);
        let start = self.segment.extend(size)?.as_ptr();
        trace!("heap extended by {size} bytes");

        // The region begins where the epilogue header sat, so the old
        // epilogue payload address is the new block's payload address.
        let block = BlockPtr::from_payload(start);
        unsafe {
            let tag = BoundaryTag::make_free(size);
            block.set_header(tag); // overwrites the old epilogue
            block.set_footer(tag);
            block
                .next_in_heap()
                .set_header(BoundaryTag::make_allocated(0));
            Ok(self.coalesce(block))
        }
    }

    /// Stamp `block` allocated for `size` bytes, splitting off the tail
    /// when the remainder can stand alone.
    ///
    /// # Safety
    /// `block` must be on the free list with `block.size() >= size`.
    unsafe fn place(&mut self, block: BlockPtr, size: usize) {
        unsafe {
            let total = block.size();
            if total - size >= MIN_BLOCK_SIZE {
                let tag = BoundaryTag::make_allocated(size);
                block.set_header(tag);
                block.set_footer(tag);
                self.free.remove(block);

                let rest = block.next_in_heap();
                let rest_tag = BoundaryTag::make_free(total - size);
                rest.set_header(rest_tag);
                rest.set_footer(rest_tag);
                // The remainder joins the list through coalesce, which
                // re-establishes the no-adjacent-free invariant. This only
                // works because `block` has already been removed.
                self.coalesce(rest);
            } else {
                let tag = BoundaryTag::make_allocated(total);
                block.set_header(tag);
                block.set_footer(tag);
                self.free.remove(block);
            }
        }
    }

    /// Merge `block` with whichever heap neighbors are free and insert the
    /// result at the list head. Returns the surviving block.
    ///
    /// Free neighbors are removed from the list *before* any size changes:
    /// once a header grows, the neighbor's old tag positions are dangling
    /// and a late `remove` would corrupt unrelated link words. Headers are
    /// written before footers because the footer position derives from the
    /// header.
    ///
    /// # Safety
    /// `block` must carry free tags and be off the list; its neighbors'
    /// tags must be intact.
    unsafe fn coalesce(&mut self, block: BlockPtr) -> BlockPtr {
        unsafe {
            let next = block.next_in_heap();
            let prev_allocated = block.prev_footer().allocated();
            let next_allocated = next.is_allocated();

            let merged = match (prev_allocated, next_allocated) {
                (true, true) => block,
                (true, false) => {
                    let size = block.size() + next.size();
                    self.free.remove(next);
                    let tag = BoundaryTag::make_free(size);
                    block.set_header(tag);
                    block.set_footer(tag);
                    block
                }
                (false, true) => {
                    let prev = block.prev_in_heap();
                    let size = prev.size() + block.size();
                    self.free.remove(prev);
                    let tag = BoundaryTag::make_free(size);
                    prev.set_header(tag);
                    prev.set_footer(tag);
                    prev
                }
                (false, false) => {
                    let prev = block.prev_in_heap();
                    let size = prev.size() + block.size() + next.size();
                    self.free.remove(prev);
                    self.free.remove(next);
                    let tag = BoundaryTag::make_free(size);
                    prev.set_header(tag);
                    prev.set_footer(tag);
                    prev
                }
            };
            self.free.insert(merged);
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heap_segment::{ArenaSegment, ArenaStorage};

    const CAPACITY: usize = 64 * 1024;

    fn new_heap() -> TagHeap<ArenaSegment> {
        let storage = Box::leak(Box::new(ArenaStorage::<CAPACITY>::new()));
        let mut heap = TagHeap::new(ArenaSegment::from_static(storage));
        heap.init().expect("init");
        heap
    }

    #[test]
    fn init_maps_preamble_plus_one_chunk() {
        let heap = new_heap();
        assert_eq!(heap.heap_size(), 6 * WORD_SIZE + CHUNK_SIZE);
        assert_eq!(heap.free_block_count(), 1);
        assert!(heap.check(false));
    }

    #[test]
    fn init_twice_is_rejected() {
        let mut heap = new_heap();
        assert_eq!(heap.init(), Err(InitError::AlreadyInitialized));
    }

    #[test]
    fn init_fails_on_a_hopeless_segment() {
        let storage = Box::leak(Box::new(ArenaStorage::<16>::new()));
        let mut heap = TagHeap::new(ArenaSegment::from_static(storage));
        assert!(matches!(heap.init(), Err(InitError::Segment(_))));
    }

    #[test]
    fn zero_size_alloc_returns_null() {
        let mut heap = new_heap();
        assert!(heap.alloc(0).is_null());
        assert!(heap.check(false));
    }

    #[test]
    fn alloc_returns_aligned_distinct_payloads() {
        let mut heap = new_heap();
        let p = heap.alloc(24);
        let q = heap.alloc(24);
        assert!(!p.is_null() && !q.is_null());
        assert_ne!(p, q);
        assert_eq!(p as usize % DOUBLE_WORD, 0);
        assert_eq!(q as usize % DOUBLE_WORD, 0);
        assert!(heap.check(false));
    }

    #[test]
    fn adjust_rounds_to_block_granularity() {
        type H = TagHeap<ArenaSegment>;
        assert_eq!(H::adjust(1), MIN_BLOCK_SIZE);
        assert_eq!(H::adjust(16), MIN_BLOCK_SIZE);
        assert_eq!(H::adjust(17), 48);
        assert_eq!(H::adjust(24), 48);
        assert_eq!(H::adjust(4000), 4016);
    }

    #[test]
    fn free_coalesces_back_to_a_single_block() {
        let mut heap = new_heap();
        let p = heap.alloc(100);
        let q = heap.alloc(200);
        unsafe {
            heap.free(p);
            heap.free(q);
        }
        assert_eq!(heap.free_block_count(), 1);
        assert!(heap.check(false));
    }

    #[test]
    fn free_null_is_a_no_op() {
        let mut heap = new_heap();
        unsafe { heap.free(core::ptr::null_mut()) };
        assert!(heap.check(false));
    }

    #[test]
    fn exhaustion_surfaces_as_null() {
        let storage = Box::leak(Box::new(ArenaStorage::<{ 48 + CHUNK_SIZE }>::new()));
        let mut heap = TagHeap::new(ArenaSegment::from_static(storage));
        heap.init().expect("init");
        assert!(heap.alloc(8000).is_null());
        // The heap stays usable after a refused extension.
        assert!(!heap.alloc(64).is_null());
        assert!(heap.check(false));
    }
}

//! # Consistency Checker
//!
//! Cross-verifies the boundary tags against the free list in two passes:
//! first along the list links, then along the heap in address order. Every
//! finding is reported through `log::error!`; nothing is ever repaired and
//! nothing aborts. On a heap with corrupted link words the walks are
//! bounds- and step-limited, so the checker terminates even when the
//! structure it inspects no longer makes sense.

use crate::heap::TagHeap;
use heap_layout::{BlockPtr, DOUBLE_WORD, MIN_BLOCK_SIZE, WORD_SIZE};
use heap_segment::Segment;
use log::{debug, error};

/// Payload addresses a sane link may carry: aligned and strictly inside
/// the mapped region.
fn in_bounds(block: BlockPtr, lo: usize, hi: usize) -> bool {
    let addr = block.addr();
    addr % DOUBLE_WORD == 0 && addr > lo && addr < hi
}

impl<S: Segment> TagHeap<S> {
    /// Walk the heap and the free list, reporting every broken invariant.
    ///
    /// Returns whether the heap is consistent, making this the oracle for
    /// property tests. `verbose` additionally dumps every block at debug
    /// level.
    #[must_use]
    pub fn check(&self, verbose: bool) -> bool {
        if self.base.is_null() {
            error!("check: heap not initialized");
            return false;
        }
        let lo = self.segment.lo() as usize;
        let hi = self.segment.hi() as usize;
        // Generous cap for every traversal: no consistent heap has more
        // blocks than this, so exceeding it means a cycle.
        let max_blocks = (hi - lo) / MIN_BLOCK_SIZE + 2;

        if verbose {
            debug!("heap [{lo:#x}, {hi:#x}), {} bytes mapped", hi - lo);
        }

        let mut errors = self.check_sentinels();
        let (list_errors, listed) = unsafe { self.check_free_list(lo, hi, max_blocks) };
        let (heap_errors, in_heap) = unsafe { self.check_heap_order(lo, hi, max_blocks, verbose) };
        errors += list_errors + heap_errors;

        if listed != in_heap {
            error!("free list holds {listed} blocks but the heap holds {in_heap} free blocks");
            errors += 1;
        }
        if errors > 0 {
            error!("heap check found {errors} inconsistencies");
        }
        errors == 0
    }

    fn check_sentinels(&self) -> usize {
        let mut errors = 0;
        unsafe {
            let base = self.base;
            if base.header() != base.footer()
                || !base.is_allocated()
                || base.size() != 2 * DOUBLE_WORD
            {
                error!("prologue corrupted: {:?}", base.header());
                errors += 1;
            }
        }
        errors
    }

    /// Pass 1: follow the `next` links from the head to the prologue.
    ///
    /// Returns the error count and the number of blocks visited.
    unsafe fn check_free_list(&self, lo: usize, hi: usize, max_blocks: usize) -> (usize, usize) {
        let mut errors = 0;
        let mut visited = 0;
        let mut cur = self.free.head();
        unsafe {
            while cur != self.base {
                if visited >= max_blocks {
                    error!("free list does not terminate at the prologue");
                    errors += 1;
                    break;
                }
                if !in_bounds(cur, lo, hi) {
                    error!("free-list entry {cur:?} outside heap bounds");
                    errors += 1;
                    break;
                }
                if cur.is_allocated() {
                    error!("allocated block {cur:?} on the free list");
                    errors += 1;
                    break;
                }
                visited += 1;

                if !(cur.prev_footer().allocated() && cur.next_in_heap().is_allocated()) {
                    error!("free block {cur:?} has a free heap neighbor");
                    errors += 1;
                }

                let prev = cur.prev_free();
                if !prev.is_null() && (!in_bounds(prev, lo, hi) || prev.is_allocated()) {
                    error!("prev link of {cur:?} is not a free block in bounds");
                    errors += 1;
                }

                let next = cur.next_free();
                if next.is_null() || !in_bounds(next, lo, hi) {
                    error!("next link of {cur:?} leaves the heap");
                    errors += 1;
                    break;
                }
                if next != self.base && next.is_allocated() {
                    error!("next link of {cur:?} points to an allocated block");
                    errors += 1;
                    break;
                }
                cur = next;
            }
        }
        (errors, visited)
    }

    /// Pass 2: walk blocks in address order from past the prologue to the
    /// epilogue.
    ///
    /// Returns the error count and the number of free blocks seen.
    unsafe fn check_heap_order(
        &self,
        lo: usize,
        hi: usize,
        max_blocks: usize,
        verbose: bool,
    ) -> (usize, usize) {
        let mut errors = 0;
        let mut free_seen = 0;
        let mut steps = 0;
        unsafe {
            let mut cur = self.base.next_in_heap();
            loop {
                // The epilogue's payload address is exactly `hi`; only its
                // header word is mapped.
                let header_addr = cur.addr().wrapping_sub(WORD_SIZE);
                if header_addr < lo || header_addr >= hi {
                    error!("heap walk left the mapped region at {cur:?}");
                    errors += 1;
                    break;
                }
                if steps >= max_blocks {
                    error!("heap walk did not reach the epilogue");
                    errors += 1;
                    break;
                }
                steps += 1;

                let tag = cur.header();
                if tag.size() == 0 {
                    if !tag.allocated() {
                        error!("epilogue is not marked allocated");
                        errors += 1;
                    }
                    break;
                }
                if verbose {
                    debug!(
                        "block {cur:?}: {} bytes, {}",
                        tag.size(),
                        if tag.allocated() { "allocated" } else { "free" },
                    );
                }

                if cur.addr() % DOUBLE_WORD != 0 {
                    error!("payload {cur:?} is not double-word aligned");
                    errors += 1;
                }
                if tag.size() < MIN_BLOCK_SIZE || tag.size() % DOUBLE_WORD != 0 {
                    error!("block {cur:?} has impossible size {}", tag.size());
                    errors += 1;
                    break;
                }
                if cur.header() != cur.footer() {
                    error!("header/footer mismatch at {cur:?}");
                    errors += 1;
                }
                if !tag.allocated() {
                    free_seen += 1;
                    if !self.free_list_contains(cur, lo, hi, max_blocks) {
                        error!("free block {cur:?} is missing from the free list");
                        errors += 1;
                    }
                    if !cur.next_in_heap().is_allocated() {
                        error!("adjacent free blocks at {cur:?}");
                        errors += 1;
                    }
                }
                cur = cur.next_in_heap();
            }
        }
        (errors, free_seen)
    }

    unsafe fn free_list_contains(
        &self,
        block: BlockPtr,
        lo: usize,
        hi: usize,
        max_blocks: usize,
    ) -> bool {
        let mut cur = self.free.head();
        let mut steps = 0;
        unsafe {
            while cur != self.base && steps < max_blocks && in_bounds(cur, lo, hi) {
                if cur == block {
                    return true;
                }
                cur = cur.next_free();
                steps += 1;
            }
        }
        false
    }
}

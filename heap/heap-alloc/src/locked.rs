//! # Locked Global-Allocator Front End
//!
//! Serialization glue between [`TagHeap`] and `core::alloc::GlobalAlloc`.
//! The allocator itself stays strictly serial; the wrapper only arbitrates
//! which caller runs it, with a test-and-set flag held for the duration of
//! each operation.

use crate::error::InitError;
use crate::heap::TagHeap;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};
use heap_layout::DOUBLE_WORD;
use heap_segment::ArenaSegment;

/// A lock-guarded [`TagHeap`] usable as the global allocator.
///
/// Starts empty; the host hands it a region exactly once:
///
/// ```rust,no_run
/// use heap_alloc::LockedHeap;
/// use heap_segment::ArenaStorage;
///
/// #[global_allocator]
/// static HEAP: LockedHeap = LockedHeap::empty();
///
/// static mut STORAGE: ArenaStorage<{ 1024 * 1024 }> = ArenaStorage::new();
///
/// fn start() {
///     unsafe { HEAP.init((&raw mut STORAGE).cast(), 1024 * 1024) }.expect("heap");
/// }
/// ```
///
/// Requests with an alignment above the double word are refused with null;
/// the block layout guarantees nothing stricter.
pub struct LockedHeap {
    /// Test-and-set flag granting exclusive use of `heap`.
    busy: AtomicBool,
    /// `None` until [`init`](Self::init) attaches a region.
    heap: UnsafeCell<Option<TagHeap<ArenaSegment>>>,
}

// Safety: `busy` admits one caller at a time into `heap`, and the guarded
// `TagHeap<ArenaSegment>` is Send, so sharing the wrapper across threads
// cannot alias allocator state.
unsafe impl Sync for LockedHeap {}

impl LockedHeap {
    /// An allocator with no memory attached. Every request fails until
    /// [`init`](Self::init) succeeds.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            busy: AtomicBool::new(false),
            heap: UnsafeCell::new(None),
        }
    }

    /// Run `f` with exclusive access to the allocator slot.
    ///
    /// Spins on the flag; allocator operations are short and never block,
    /// so the wait is bounded by one operation of another caller.
    fn with_heap<R>(&self, f: impl FnOnce(&mut Option<TagHeap<ArenaSegment>>) -> R) -> R {
        while self.busy.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
        // Safety: the flag stays ours until the release store below, so no
        // other caller can reach `heap` in the meantime.
        let result = f(unsafe { &mut *self.heap.get() });
        self.busy.store(false, Ordering::Release);
        result
    }

    /// Attach the region `[start, start + capacity)` and bring up the heap.
    ///
    /// # Safety
    /// The region must be valid, writable, 16-byte aligned, unused by
    /// anything else, and live for the rest of the program.
    ///
    /// # Errors
    /// [`InitError`] when the region is too small for the preamble and
    /// first chunk, or when the heap was already initialized.
    pub unsafe fn init(&self, start: *mut u8, capacity: usize) -> Result<(), InitError> {
        self.with_heap(|slot| {
            if slot.is_some() {
                return Err(InitError::AlreadyInitialized);
            }
            let mut heap = TagHeap::new(unsafe { ArenaSegment::from_raw(start, capacity) });
            heap.init()?;
            *slot = Some(heap);
            Ok(())
        })
    }

    /// Run the consistency checker while holding the flag.
    #[must_use]
    pub fn check(&self, verbose: bool) -> bool {
        self.with_heap(|slot| slot.as_ref().is_some_and(|heap| heap.check(verbose)))
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    /// # Safety
    /// The `GlobalAlloc` contract applies. Callers must handle null (OOM,
    /// over-aligned request, or an uninitialized heap).
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > DOUBLE_WORD {
            return ptr::null_mut();
        }
        self.with_heap(|slot| {
            slot.as_mut()
                .map_or(ptr::null_mut(), |heap| heap.alloc(layout.size()))
        })
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies. `ptr` must come from this
    /// allocator.
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if ptr.is_null() {
            return;
        }
        self.with_heap(|slot| {
            if let Some(heap) = slot.as_mut() {
                unsafe { heap.free(ptr) };
            }
        });
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies.
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let p = unsafe { self.alloc(layout) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, layout.size()) };
        }
        p
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies. `ptr` must come from this
    /// allocator.
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > DOUBLE_WORD {
            return ptr::null_mut();
        }
        self.with_heap(|slot| {
            slot.as_mut()
                .map_or(ptr::null_mut(), |heap| unsafe { heap.realloc(ptr, new_size) })
        })
    }
}

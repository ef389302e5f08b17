//! Randomized alloc/free/realloc trace with the consistency checker as
//! oracle after every single operation.

use heap_alloc::TagHeap;
use heap_segment::{ArenaSegment, ArenaStorage};

const CAPACITY: usize = 512 * 1024;

/// Keep well below the arena so first-fit fragmentation never causes a
/// spurious out-of-memory.
const MAX_LIVE_BYTES: usize = 64 * 1024;
const MAX_LIVE_BLOCKS: usize = 200;

static mut STORAGE: ArenaStorage<CAPACITY> = ArenaStorage::new();

struct Live {
    ptr: *mut u8,
    len: usize,
    fill: u8,
}

fn assert_filled(e: &Live) {
    for i in 0..e.len {
        assert_eq!(unsafe { e.ptr.add(i).read() }, e.fill, "payload clobbered");
    }
}

fn fill(e: &Live) {
    unsafe { core::ptr::write_bytes(e.ptr, e.fill, e.len) };
}

#[test]
fn randomized_trace_keeps_every_invariant() {
    // Safety: this test is the only user of STORAGE and runs once.
    let segment = unsafe { ArenaSegment::from_raw((&raw mut STORAGE).cast(), CAPACITY) };
    let mut heap = TagHeap::new(segment);
    heap.init().expect("init");

    let mut rng = fastrand::Rng::with_seed(0x0005_EED5);
    let mut live: Vec<Live> = Vec::new();
    let mut live_bytes = 0usize;

    for step in 0..1000 {
        #[allow(clippy::cast_possible_truncation)]
        let fill_byte = (step % 251) as u8;
        match rng.usize(0..10) {
            // Allocation-heavy mix: grow the live set most of the time.
            0..=4 => {
                if live.len() < MAX_LIVE_BLOCKS && live_bytes < MAX_LIVE_BYTES {
                    let len = rng.usize(1..=512);
                    let ptr = heap.alloc(len);
                    assert!(!ptr.is_null(), "allocation failed at step {step}");
                    assert_eq!(ptr as usize % 16, 0, "misaligned payload at step {step}");
                    let entry = Live {
                        ptr,
                        len,
                        fill: fill_byte,
                    };
                    fill(&entry);
                    live_bytes += len;
                    live.push(entry);
                }
            }
            5..=7 => {
                if !live.is_empty() {
                    let entry = live.swap_remove(rng.usize(0..live.len()));
                    assert_filled(&entry);
                    live_bytes -= entry.len;
                    unsafe { heap.free(entry.ptr) };
                }
            }
            _ => {
                if !live.is_empty() {
                    let i = rng.usize(0..live.len());
                    assert_filled(&live[i]);
                    let new_len = rng.usize(1..=768);
                    let moved = unsafe { heap.realloc(live[i].ptr, new_len) };
                    assert!(!moved.is_null(), "realloc failed at step {step}");

                    // Bytes up to the shorter of the two lengths survive.
                    let kept = live[i].len.min(new_len);
                    for off in 0..kept {
                        assert_eq!(unsafe { moved.add(off).read() }, live[i].fill);
                    }

                    live_bytes = live_bytes - live[i].len + new_len;
                    live[i] = Live {
                        ptr: moved,
                        len: new_len,
                        fill: fill_byte,
                    };
                    fill(&live[i]);
                }
            }
        }
        assert!(heap.check(false), "inconsistent heap after step {step}");
    }

    // Drain what is left; the heap must collapse back to one free block.
    for entry in live.drain(..) {
        assert_filled(&entry);
        unsafe { heap.free(entry.ptr) };
        assert!(heap.check(false));
    }
    assert_eq!(heap.free_block_count(), 1);
}

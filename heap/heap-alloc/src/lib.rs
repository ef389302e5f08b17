//! # Boundary-Tagged Heap Allocator
//!
//! A malloc-style allocator over an upward-growable memory segment:
//! boundary-tagged blocks for O(1) coalescing, an explicit doubly-linked
//! free list with LIFO insertion, and first-fit placement with splitting.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  LockedHeap                         │
//! │    • GlobalAlloc front end                          │
//! │    • Spin-lock serialization                        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                  TagHeap                            │
//! │    • alloc / free / realloc                         │
//! │    • first-fit placement and splitting              │
//! │    • four-way coalescing                            │
//! │    • consistency checker                            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                  Segment                            │
//! │    • sbrk-style extension                           │
//! │    • bounds queries                                 │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Heap anatomy
//!
//! The managed region always has this shape:
//!
//! ```text
//! | pad | prologue (2D, allocated) | blocks ... | epilogue (0, allocated) |
//! ```
//!
//! The prologue doubles as the free list's terminal sentinel: it is marked
//! allocated (which terminates the first-fit walk and blocks backward
//! coalescing past the heap base) yet keeps two link words in its payload
//! so that list removal never needs a tail special case. The zero-size
//! allocated epilogue bounds forward coalescing the same way.
//!
//! ## Invariants
//!
//! Between any two operations:
//!
//! - every heap byte belongs to exactly one block;
//! - each block's header equals its footer;
//! - no two adjacent blocks are both free;
//! - a block is free iff it appears exactly once on the free list;
//! - the free list is acyclic and terminates at the prologue;
//! - every payload is double-word aligned.
//!
//! [`TagHeap::check`] cross-verifies all of these and is the oracle behind
//! the randomized tests.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod checker;
mod error;
mod free_list;
mod heap;
mod locked;

pub use error::InitError;
pub use heap::{CHUNK_SIZE, TagHeap};
pub use locked::LockedHeap;

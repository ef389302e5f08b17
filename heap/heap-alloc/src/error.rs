use heap_segment::SegmentError;

/// Failure to bring up a heap.
///
/// Allocation failure is not an error value: `alloc` and `realloc` report
/// it with a null pointer, per the malloc contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The segment refused the preamble or first-chunk extension.
    #[error("heap initialization failed: {0}")]
    Segment(#[from] SegmentError),
    /// `init` was called on an already-initialized heap.
    #[error("heap is already initialized")]
    AlreadyInitialized,
}

//! Allocator Module
//!
//! In-memory mirrors of the blob file: which byte ranges are free, and where
//! each key's blob record lives.
//!
//! ## Responsibilities
//! - Track free records in discovery order
//! - Pick a free record to host a new blob (exact fit, or room to carve a
//!   minimal free record from the remainder)
//! - Plan merges of byte-adjacent free records
//! - Map keys to blob record offsets

mod free_list;
mod key_index;

pub use free_list::{FreeList, FreeSpan, MergePlan, MergeUpdate};
pub use key_index::KeyIndex;

/// How find-space chooses among qualifying free records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitPolicy {
    /// Smallest qualifying record; ties go to the earliest discovered
    #[default]
    BestFit,

    /// First qualifying record in discovery order
    FirstFit,
}

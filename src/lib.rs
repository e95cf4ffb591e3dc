//! # blobheap
//!
//! A single-file binary blob store with:
//! - Opaque byte blobs behind small integer keys
//! - A free-list allocator (best-fit or first-fit) over one file
//! - In-place defragmentation of adjacent free records
//! - A flush after every mutation
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BlobStore                              │
//! │        (StoreResult boundary, event notifications)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Mutex
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (scan / insert / read / update / delete / defrag)     │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │  FreeList   │        │  KeyIndex   │        │   Record    │
//! │ (best-fit)  │        │ (key→offset)│        │   codec     │
//! └─────────────┘        └─────────────┘        └──────┬──────┘
//!                                                      │
//!                                                      ▼
//!                                               ┌─────────────┐
//!                                               │ ByteStream  │
//!                                               │   (file)    │
//!                                               └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod stream;
pub mod record;
pub mod allocator;
pub mod engine;
pub mod events;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use allocator::FitPolicy;
pub use config::{Config, SyncStrategy};
pub use engine::{Engine, StoreStats, UpdateMode};
pub use error::{BlobError, ErrorCode, Result};
pub use events::{StoreEvent, StoreObserver};
pub use store::{BlobStore, StoreResult};
pub use stream::{ByteStream, FileStream, MemoryStream};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blobheap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

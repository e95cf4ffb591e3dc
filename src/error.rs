//! Error types for blobheap
//!
//! Provides a unified error type for all operations, plus the stable
//! numeric codes carried by the store facade's structured results.

use thiserror::Error;

/// Result type alias using BlobError
pub type Result<T> = std::result::Result<T, BlobError>;

/// Unified error type for blobheap operations
#[derive(Debug, Error)]
pub enum BlobError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Key Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    KeyNotFound(u32),

    #[error("Duplicate key: {0}")]
    DuplicateKey(u32),

    #[error("Key space exhausted: no keys left above {}", u32::MAX)]
    KeyspaceExhausted,

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Truncated read at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("Record at offset {offset} is not a blob record (tag {tag}, length {length})")]
    NotABlobRecord { offset: u64, tag: u8, length: u64 },

    #[error("Record too large: {0} bytes does not fit a 32-bit length field")]
    RecordTooLarge(u64),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlobError {
    /// Shorthand for a `CorruptRecord` error
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        BlobError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Numeric code reported by the store facade
    pub fn code(&self) -> ErrorCode {
        match self {
            BlobError::Io(_) => ErrorCode::Io,
            BlobError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            BlobError::DuplicateKey(_) => ErrorCode::DuplicateKey,
            BlobError::KeyspaceExhausted => ErrorCode::KeyspaceExhausted,
            BlobError::CorruptRecord { .. } => ErrorCode::CorruptRecord,
            BlobError::TruncatedRead { .. } => ErrorCode::TruncatedRead,
            BlobError::NotABlobRecord { .. } => ErrorCode::NotABlobRecord,
            BlobError::RecordTooLarge(_) => ErrorCode::RecordTooLarge,
            BlobError::Config(_) => ErrorCode::Config,
        }
    }
}

/// Stable result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,
    KeyNotFound = 1,
    DuplicateKey = 2,
    CorruptRecord = 3,
    TruncatedRead = 4,
    NotABlobRecord = 5,
    Io = 6,
    RecordTooLarge = 7,
    KeyspaceExhausted = 8,
    Config = 9,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

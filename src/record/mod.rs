//! Record Module
//!
//! On-disk record format. The blob file has no file-level header: records
//! tile it back-to-back from offset 0 to end-of-file.
//!
//! ## Record Format
//! ```text
//! Free record
//! ┌──────────┬──────────────┬──────────────────────────────┐
//! │ Tag=0 (1)│ Length (4)   │ Filler (Length - 5)          │
//! └──────────┴──────────────┴──────────────────────────────┘
//!
//! Blob record
//! ┌──────────┬──────────────┬──────────┬───────────────────┐
//! │ Tag=1 (1)│ Length (4)   │ Key (4)  │ Payload           │
//! └──────────┴──────────────┴──────────┴───────────────────┘
//! ```
//!
//! `Length` counts the whole record including its header, so a blob
//! record is `9 + payload_len` bytes. All integers are little-endian.

mod codec;
mod walker;

pub use codec::{
    decode_header, decode_key, encode_blob, encode_free_header, encode_length, RecordHeader,
};
pub use walker::{RecordInfo, RecordWalker};

// =============================================================================
// Layout Constants
// =============================================================================

/// Tag byte size
pub const TAG_LEN: u64 = 1;

/// Header size: Tag (1) + Length (4)
pub const HEADER_LEN: u64 = 5;

/// Blob key size
pub const KEY_LEN: u64 = 4;

/// Bytes a blob record needs beyond its payload: Header (5) + Key (4)
pub const BLOB_OVERHEAD: u64 = HEADER_LEN + KEY_LEN;

/// Smallest valid free record (header only)
pub const MIN_FREE_LEN: u64 = HEADER_LEN;

/// Record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    Free = 0,
    Blob = 1,
}

impl RecordTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(RecordTag::Free),
            1 => Some(RecordTag::Blob),
            _ => None,
        }
    }
}

/// Total record length for a blob holding `payload_len` bytes
pub fn blob_record_len(payload_len: usize) -> u64 {
    payload_len as u64 + BLOB_OVERHEAD
}

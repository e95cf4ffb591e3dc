//! Record codec
//!
//! Pure encode/decode of record headers and bodies.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BlobError, Result};

use super::{blob_record_len, RecordTag, BLOB_OVERHEAD, HEADER_LEN, KEY_LEN};

/// Decoded 5-byte record header
///
/// The tag is kept raw so callers can report unknown tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: u8,
    pub length: u64,
}

impl RecordHeader {
    pub fn record_tag(&self) -> Option<RecordTag> {
        RecordTag::from_byte(self.tag)
    }

    /// Tag is blob and the length can hold at least the key
    pub fn is_blob(&self) -> bool {
        self.tag == RecordTag::Blob as u8 && self.length >= BLOB_OVERHEAD
    }

    pub fn is_free(&self) -> bool {
        self.tag == RecordTag::Free as u8
    }
}

/// Encode a record length as the 4-byte length field
pub fn encode_length(length: u64) -> Result<[u8; 4]> {
    u32::try_from(length)
        .map(u32::to_le_bytes)
        .map_err(|_| BlobError::RecordTooLarge(length))
}

/// Encode the header of a free record spanning `length` bytes
pub fn encode_free_header(length: u64) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN as usize);
    buf.put_u8(RecordTag::Free as u8);
    buf.put_slice(&encode_length(length)?);
    Ok(buf.freeze())
}

/// Encode a complete blob record
pub fn encode_blob(key: u32, payload: &[u8]) -> Result<Bytes> {
    let length = blob_record_len(payload.len());
    let length_field = encode_length(length)?;

    let mut buf = BytesMut::with_capacity(length as usize);
    buf.put_u8(RecordTag::Blob as u8);
    buf.put_slice(&length_field);
    buf.put_u32_le(key);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Decode a record header
pub fn decode_header(raw: &[u8; HEADER_LEN as usize]) -> RecordHeader {
    let mut buf = &raw[..];
    let tag = buf.get_u8();
    let length = u64::from(buf.get_u32_le());
    RecordHeader { tag, length }
}

/// Decode a blob key
pub fn decode_key(raw: &[u8; KEY_LEN as usize]) -> u32 {
    let mut buf = &raw[..];
    buf.get_u32_le()
}

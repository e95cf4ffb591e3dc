//! Record Walker
//!
//! Sequential iteration over every record from offset 0 to end-of-file.

use std::io::SeekFrom;

use tracing::warn;

use crate::error::{BlobError, Result};
use crate::stream::ByteStream;

use super::{decode_header, decode_key, RecordTag, BLOB_OVERHEAD, HEADER_LEN, KEY_LEN, MIN_FREE_LEN};

/// One record as seen by the walker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordInfo {
    Free { offset: u64, length: u64 },
    Blob { offset: u64, length: u64, key: u32 },
}

impl RecordInfo {
    pub fn offset(&self) -> u64 {
        match *self {
            RecordInfo::Free { offset, .. } | RecordInfo::Blob { offset, .. } => offset,
        }
    }

    /// On-disk length field
    pub fn length(&self) -> u64 {
        match *self {
            RecordInfo::Free { length, .. } | RecordInfo::Blob { length, .. } => length,
        }
    }
}

/// Iterator over records in file order
///
/// Stops after the first error.
pub struct RecordWalker<'a, S: ByteStream> {
    stream: &'a mut S,
    /// Start of the next record
    position: u64,
    /// Stream length captured when the walk started
    end: u64,
    failed: bool,
}

impl<'a, S: ByteStream> RecordWalker<'a, S> {
    pub fn new(stream: &'a mut S) -> Result<Self> {
        let end = stream.len()?;
        Ok(Self {
            stream,
            position: 0,
            end,
            failed: false,
        })
    }

    /// Stream length the walk runs to
    pub fn end(&self) -> u64 {
        self.end
    }

    fn read_record(&mut self) -> Result<RecordInfo> {
        let offset = self.position;
        self.stream.seek(SeekFrom::Start(offset))?;

        // Header: tag + length
        let mut raw = [0u8; HEADER_LEN as usize];
        let read = self.stream.read_up_to(&mut raw)?;
        if read < raw.len() {
            return Err(BlobError::TruncatedRead {
                offset,
                expected: HEADER_LEN,
                actual: read as u64,
            });
        }
        let header = decode_header(&raw);

        match header.record_tag() {
            Some(RecordTag::Free) => {
                if header.length < MIN_FREE_LEN {
                    return Err(BlobError::corrupt(
                        offset,
                        format!("free record length {} is below {}", header.length, MIN_FREE_LEN),
                    ));
                }

                // Skip filler. A record torn at the tail is reported as what
                // actually remains, never less than a header.
                let next = offset + header.length;
                if next > self.end {
                    warn!(
                        offset,
                        length = header.length,
                        file_len = self.end,
                        "Free record runs past end of file"
                    );
                }
                self.position = next.min(self.end);

                Ok(RecordInfo::Free {
                    offset,
                    length: self.position - offset,
                })
            }
            Some(RecordTag::Blob) => {
                if header.length < BLOB_OVERHEAD {
                    return Err(BlobError::corrupt(
                        offset,
                        format!("blob record length {} is below {}", header.length, BLOB_OVERHEAD),
                    ));
                }

                let mut raw_key = [0u8; KEY_LEN as usize];
                let read = self.stream.read_up_to(&mut raw_key)?;
                let next = offset + header.length;
                if read < raw_key.len() || next > self.end {
                    return Err(BlobError::TruncatedRead {
                        offset,
                        expected: header.length,
                        actual: self.end - offset,
                    });
                }
                self.position = next;

                Ok(RecordInfo::Blob {
                    offset,
                    length: header.length,
                    key: decode_key(&raw_key),
                })
            }
            None => Err(BlobError::corrupt(
                offset,
                format!("unknown record tag {}", header.tag),
            )),
        }
    }
}

impl<'a, S: ByteStream> Iterator for RecordWalker<'a, S> {
    type Item = Result<RecordInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.end {
            return None;
        }

        let record = self.read_record();
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn walk(bytes: Vec<u8>) -> Vec<Result<RecordInfo>> {
        let mut stream = MemoryStream::new(bytes);
        RecordWalker::new(&mut stream).unwrap().collect()
    }

    #[test]
    fn test_walks_mixed_records() {
        let mut bytes = vec![0, 7, 0, 0, 0, 0xAA, 0xBB];
        bytes.extend_from_slice(&[1, 10, 0, 0, 0, 4, 0, 0, 0, 9]);

        let records: Vec<RecordInfo> = walk(bytes).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            records,
            vec![
                RecordInfo::Free { offset: 0, length: 7 },
                RecordInfo::Blob { offset: 7, length: 10, key: 4 },
            ]
        );
    }

    #[test]
    fn test_unknown_tag_is_corrupt_and_stops() {
        let records = walk(vec![9, 5, 0, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(BlobError::CorruptRecord { offset: 0, .. })));
    }

    #[test]
    fn test_free_record_past_eof_is_clamped() {
        let records = walk(vec![0, 20, 0, 0, 0, 0, 0]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap(), &RecordInfo::Free { offset: 0, length: 7 });
    }

    #[test]
    fn test_blob_past_eof_is_truncated() {
        let records = walk(vec![1, 30, 0, 0, 0, 1, 0, 0, 0, 5]);
        assert!(matches!(records[0], Err(BlobError::TruncatedRead { offset: 0, .. })));
    }
}

//! Engine Module
//!
//! The allocator engine: reads and writes blob records directly against the
//! byte stream and keeps the free list and key index consistent with what
//! was just written.
//!
//! ## Responsibilities
//! - Rebuild the free list and key index by scanning the file on open
//! - Place new blobs into free records (best-fit) or at end-of-stream
//! - Update blobs in place, shrinking or relocating as needed
//! - Turn deleted blobs into free records
//! - Merge byte-adjacent free records (defragmentation)
//!
//! ## Concurrency
//! The engine is single-threaded: every call takes `&mut self` and moves the
//! shared stream cursor. Only the key counter is atomic. Callers sharing an
//! engine serialize access (the store facade wraps it in one mutex).

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::allocator::{FitPolicy, FreeList, FreeSpan, KeyIndex};
use crate::error::{BlobError, Result};
use crate::record::{
    decode_header, decode_key, encode_blob, encode_free_header, encode_length, RecordHeader,
    RecordInfo, RecordTag, RecordWalker, BLOB_OVERHEAD, HEADER_LEN, KEY_LEN, MIN_FREE_LEN,
    TAG_LEN,
};
use crate::stream::ByteStream;

/// A blob read back from the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub offset: u64,
    pub key: u32,
    pub payload: Vec<u8>,
}

/// Whether update checks that the target looks like a blob record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Checked,
    Unchecked,
}

/// Space accounting for an open store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub file_len: u64,
    pub blob_count: usize,
    pub blob_bytes: u64,
    pub free_count: usize,
    pub free_bytes: u64,
    pub largest_free: u64,
    pub next_key: u64,
}

/// The allocator engine over a byte stream
pub struct Engine<S: ByteStream> {
    /// Backing storage (exclusive access needed for every call)
    stream: S,

    /// Mirror of every free record on disk, in discovery order
    free_list: FreeList,

    /// Mirror of every live blob record on disk
    index: KeyIndex,

    /// Next key to hand out. Wider than a key so exhaustion is representable.
    next_key: AtomicU64,

    fit_policy: FitPolicy,
}

impl<S: ByteStream> Engine<S> {
    /// Open an engine over `stream`
    ///
    /// On startup:
    /// 1. Seed an empty stream with one minimal free record
    /// 2. Otherwise scan every record to rebuild the free list and key index
    /// 3. Merge adjacent free records left behind by an unclean shutdown
    /// 4. Reseed the key counter from the largest key on disk
    pub fn open(stream: S, fit_policy: FitPolicy) -> Result<Self> {
        let mut engine = Self {
            stream,
            free_list: FreeList::new(),
            index: KeyIndex::new(),
            next_key: AtomicU64::new(1),
            fit_policy,
        };
        engine.scan()?;
        Ok(engine)
    }

    fn scan(&mut self) -> Result<()> {
        if self.stream.is_empty()? {
            // Step 1: Bootstrap
            self.write_free_header(0, MIN_FREE_LEN)?;
            self.free_list.push(FreeSpan::new(0, MIN_FREE_LEN));
            self.stream.sync()?;
            info!("Initialized empty blob file with a {}-byte free record", MIN_FREE_LEN);
        } else {
            // Step 2: Rebuild in-memory state from the records on disk
            let mut free_list = FreeList::new();
            let mut index = KeyIndex::new();

            let walker = RecordWalker::new(&mut self.stream)?;
            let file_len = walker.end();
            for record in walker {
                match record? {
                    RecordInfo::Free { offset, length } => {
                        free_list.push(FreeSpan::new(offset, length));
                    }
                    RecordInfo::Blob { offset, key, .. } => {
                        if let Some(previous) = index.insert(key, offset) {
                            return Err(BlobError::corrupt(
                                offset,
                                format!("key {} already stored at offset {}", key, previous),
                            ));
                        }
                    }
                }
            }

            self.free_list = free_list;
            self.index = index;
            self.trim_torn_tail(file_len)?;
        }

        // Step 3: Adjacent free records can legitimately survive a crash
        let absorbed = self.defragment()?;
        if absorbed > 0 {
            warn!(absorbed, "Merged adjacent free records found during scan");
            self.stream.sync()?;
        }

        // Step 4: Deleted or reserved-but-unwritten keys are not reused
        let next_key = self.index.max_key().map_or(1, |key| u64::from(key) + 1);
        self.next_key.store(next_key, Ordering::SeqCst);

        info!(
            blobs = self.index.len(),
            free_records = self.free_list.len(),
            free_bytes = self.free_list.total_bytes(),
            next_key,
            "Scanned blob file"
        );
        Ok(())
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Hand out the next key. Keys are never reused.
    pub fn reserve_key(&self) -> Result<u32> {
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        u32::try_from(key).map_err(|_| BlobError::KeyspaceExhausted)
    }

    /// Next key `reserve_key` would return
    pub fn next_key(&self) -> u64 {
        self.next_key.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: u32) -> bool {
        self.index.contains(key)
    }

    /// All live keys, ascending
    pub fn keys(&self) -> Vec<u32> {
        self.index.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Store `payload` under a freshly reserved key
    pub fn insert(&mut self, payload: &[u8]) -> Result<u32> {
        let key = self.reserve_key()?;
        self.insert_with_key(key, payload)?;
        Ok(key)
    }

    /// Store `payload` under a key obtained earlier from `reserve_key`
    pub fn insert_with_key(&mut self, key: u32, payload: &[u8]) -> Result<()> {
        if self.index.contains(key) {
            return Err(BlobError::DuplicateKey(key));
        }

        let record = encode_blob(key, payload)?;
        let offset = self.place_record(&record)?;

        if let Err(e) = self.stream.sync() {
            // Not flushed, so the insert did not happen: give the space back
            if let Err(rollback) = self.release_record(offset, record.len() as u64) {
                warn!(key, offset, error = %rollback, "Failed to release unflushed blob record");
            }
            return Err(e.into());
        }

        self.index.insert(key, offset);

        // Keep the counter ahead of caller-chosen keys
        self.next_key.fetch_max(u64::from(key) + 1, Ordering::SeqCst);

        debug!(key, offset, length = record.len(), "Inserted blob");
        Ok(())
    }

    /// Write an encoded blob record where find-space says, returning its offset
    ///
    /// - exact fit: the free record is overwritten and dropped from the list
    /// - larger fit: the remainder becomes a new free record
    /// - no fit: append at end-of-stream, absorbing a free record that ends
    ///   exactly at EOF if it is too short to qualify on its own
    fn place_record(&mut self, record: &[u8]) -> Result<u64> {
        let raw = record.len() as u64;

        if let Some(position) = self.free_list.find_space(raw, self.fit_policy) {
            let span = self
                .free_list
                .get(position)
                .ok_or_else(|| BlobError::corrupt(0, "free list position out of range"))?;

            // Leftover header first: until the record lands it is interior
            // filler of the free record being consumed
            let leftover = (span.length > raw).then(|| FreeSpan::new(span.offset + raw, span.length - raw));
            if let Some(leftover) = leftover {
                self.write_free_header(leftover.offset, leftover.length)?;
            }
            self.write_at(span.offset, record)?;

            self.free_list.remove(position);
            if let Some(leftover) = leftover {
                self.free_list.push(leftover);
            }

            debug!(offset = span.offset, free_len = span.length, raw, "Reused free record");
            return Ok(span.offset);
        }

        let end = self.stream.len()?;
        let tail = self
            .free_list
            .position_ending_at(end)
            .and_then(|position| self.free_list.get(position).map(|span| (position, span)))
            .filter(|(_, span)| span.length < raw);

        match tail {
            Some((position, span)) => {
                self.write_at(span.offset, record)?;
                self.free_list.remove(position);
                debug!(offset = span.offset, free_len = span.length, raw, "Grew tail free record");
                Ok(span.offset)
            }
            None => {
                self.write_at(end, record)?;
                debug!(offset = end, raw, "Appended record");
                Ok(end)
            }
        }
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Read the payload stored under `key`
    pub fn read(&mut self, key: u32) -> Result<Vec<u8>> {
        self.read_blob(key).map(|blob| blob.payload)
    }

    /// Read the full blob record stored under `key`
    pub fn read_blob(&mut self, key: u32) -> Result<BlobRecord> {
        let offset = self.index.get(key).ok_or(BlobError::KeyNotFound(key))?;
        let header = self.read_header_at(offset)?;

        if header.record_tag() != Some(RecordTag::Blob) {
            return Err(BlobError::corrupt(offset, "offset does not point to a blob record"));
        }
        let payload_len = header.length.checked_sub(BLOB_OVERHEAD).ok_or_else(|| {
            BlobError::corrupt(
                offset,
                format!("blob record length {} is below {}", header.length, BLOB_OVERHEAD),
            )
        })?;

        let mut raw_key = [0u8; KEY_LEN as usize];
        let read = self.stream.read_up_to(&mut raw_key)?;
        if read < raw_key.len() {
            return Err(BlobError::TruncatedRead {
                offset,
                expected: KEY_LEN,
                actual: read as u64,
            });
        }
        let stored_key = decode_key(&raw_key);
        if stored_key != key {
            return Err(BlobError::corrupt(
                offset,
                format!("expected key {}, record holds key {}", key, stored_key),
            ));
        }

        let mut payload = vec![0u8; payload_len as usize];
        let read = self.stream.read_up_to(&mut payload)? as u64;
        if read != payload_len {
            return Err(BlobError::TruncatedRead {
                offset,
                expected: payload_len,
                actual: read,
            });
        }

        Ok(BlobRecord {
            offset,
            key,
            payload,
        })
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Replace the payload stored under `key`
    pub fn update(&mut self, key: u32, payload: &[u8]) -> Result<()> {
        self.update_with(key, payload, UpdateMode::Checked)
    }

    /// Replace the payload stored under `key`
    ///
    /// Branches on the new record length against the old one:
    /// - equal: overwrite in place
    /// - shorter by at least 5: overwrite in place, free the remainder
    /// - otherwise: free the old record and place the blob elsewhere
    pub fn update_with(&mut self, key: u32, payload: &[u8], mode: UpdateMode) -> Result<()> {
        let offset = self.index.get(key).ok_or(BlobError::KeyNotFound(key))?;
        let header = self.read_header_at(offset)?;
        if mode == UpdateMode::Checked && !header.is_blob() {
            return Err(BlobError::NotABlobRecord {
                offset,
                tag: header.tag,
                length: header.length,
            });
        }

        let record = encode_blob(key, payload)?;
        let new_raw = record.len() as u64;
        let old_raw = header.length;

        if new_raw == old_raw {
            self.write_at(offset, &record)?;
            self.index.insert(key, offset);
            debug!(key, offset, "Updated blob in place");
        } else if new_raw + MIN_FREE_LEN <= old_raw {
            self.write_at(offset, &record)?;
            let leftover = FreeSpan::new(offset + new_raw, old_raw - new_raw);
            self.write_free_header(leftover.offset, leftover.length)?;
            self.free_list.push(leftover);
            debug!(key, offset, freed = leftover.length, "Shrank blob in place");
        } else {
            // Grows, or shrinks by 1-4 bytes: the old footprint cannot hold
            // the new record plus a valid leftover
            self.write_free_header(offset, old_raw)?;
            self.free_list.push(FreeSpan::new(offset, old_raw));

            let new_offset = match self.place_record(&record) {
                Ok(new_offset) => new_offset,
                Err(e) => {
                    self.restore_blob(key, offset, old_raw);
                    return Err(e);
                }
            };
            self.index.insert(key, new_offset);
            debug!(key, from = offset, to = new_offset, "Relocated blob");
        }

        self.defragment()?;
        self.stream.sync()?;
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove `key` and turn its record into free space
    pub fn delete(&mut self, key: u32) -> Result<()> {
        let offset = self.index.get(key).ok_or(BlobError::KeyNotFound(key))?;
        let header = self.read_header_at(offset)?;
        if header.record_tag() != Some(RecordTag::Blob) {
            return Err(BlobError::NotABlobRecord {
                offset,
                tag: header.tag,
                length: header.length,
            });
        }

        self.index.remove(key);
        self.release_record(offset, header.length)?;

        self.stream.sync()?;
        debug!(key, offset, length = header.length, "Deleted blob");
        Ok(())
    }

    // =========================================================================
    // Defragmentation
    // =========================================================================

    /// Merge every chain of byte-adjacent free records
    ///
    /// Writes one new length per surviving record, then drops the absorbed
    /// entries from the list. Absorbed records' bytes stay on disk as filler.
    /// Returns the number of absorbed records.
    pub fn defragment(&mut self) -> Result<usize> {
        let plan = self.free_list.plan_merges();
        if plan.is_empty() {
            return Ok(0);
        }

        for update in &plan.updates {
            self.write_length(update.merged.offset, update.merged.length)?;
            self.free_list.apply_update(update);
            debug!(
                offset = update.merged.offset,
                length = update.merged.length,
                "Merged free records"
            );
        }

        let absorbed = plan.removals.len();
        self.free_list.remove_positions(plan.removals);
        Ok(absorbed)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Flush the stream
    pub fn flush(&mut self) -> Result<()> {
        self.stream.sync()?;
        Ok(())
    }

    /// Space accounting from in-memory state
    pub fn stats(&mut self) -> Result<StoreStats> {
        let file_len = self.stream.len()?;
        let free_bytes = self.free_list.total_bytes();
        Ok(StoreStats {
            file_len,
            blob_count: self.index.len(),
            blob_bytes: file_len.saturating_sub(free_bytes),
            free_count: self.free_list.len(),
            free_bytes,
            largest_free: self.free_list.largest().map_or(0, |span| span.length),
            next_key: self.next_key(),
        })
    }

    /// Walk the file and check it against the in-memory state
    ///
    /// Checks that records tile the file exactly, that the free list and key
    /// index match the records on disk, and that no two free records touch.
    pub fn verify(&mut self) -> Result<StoreStats> {
        let mut disk_free = Vec::new();
        let mut disk_blobs = Vec::new();
        let mut blob_bytes = 0;

        let walker = RecordWalker::new(&mut self.stream)?;
        let file_len = walker.end();
        for record in walker {
            match record? {
                RecordInfo::Free { offset, length } => disk_free.push(FreeSpan::new(offset, length)),
                RecordInfo::Blob { offset, length, key } => {
                    blob_bytes += length;
                    disk_blobs.push((key, offset));
                }
            }
        }

        // The walker reports a torn tail as what remains; the header must agree
        if let Some(last) = disk_free.last().copied().filter(|span| span.end() == file_len) {
            let declared = self.read_header_at(last.offset)?.length;
            if declared != last.length {
                return Err(BlobError::corrupt(
                    last.offset,
                    format!(
                        "free record of length {} runs past end of file {}",
                        declared, file_len
                    ),
                ));
            }
        }

        // Records are walked in file order, so adjacency is a neighbour check
        if let Some(pair) = disk_free.windows(2).find(|pair| pair[0].end() == pair[1].offset) {
            return Err(BlobError::corrupt(
                pair[1].offset,
                format!("free record adjoins the free record at {}", pair[0].offset),
            ));
        }

        let mut mirrored: Vec<FreeSpan> = self.free_list.iter().copied().collect();
        mirrored.sort();
        if mirrored != disk_free {
            return Err(BlobError::corrupt(
                0,
                format!("free list {:?} does not match free records {:?}", mirrored, disk_free),
            ));
        }

        disk_blobs.sort_unstable();
        let indexed: Vec<(u32, u64)> = self.index.iter().collect();
        if indexed != disk_blobs {
            return Err(BlobError::corrupt(
                0,
                format!("key index {:?} does not match blob records {:?}", indexed, disk_blobs),
            ));
        }

        Ok(StoreStats {
            file_len,
            blob_count: disk_blobs.len(),
            blob_bytes,
            free_count: disk_free.len(),
            free_bytes: disk_free.iter().map(|span| span.length).sum(),
            largest_free: disk_free.iter().map(|span| span.length).max().unwrap_or(0),
            next_key: self.next_key(),
        })
    }

    /// Free records in discovery order
    pub fn free_spans(&self) -> &[FreeSpan] {
        self.free_list.as_slice()
    }

    /// Offset of the blob record for `key`
    pub fn offset_of(&self, key: u32) -> Option<u64> {
        self.index.get(key)
    }

    pub fn fit_policy(&self) -> FitPolicy {
        self.fit_policy
    }

    /// Flush and hand back the stream
    pub fn into_stream(mut self) -> Result<S> {
        self.stream.sync()?;
        Ok(self.stream)
    }

    /// Flush and release the stream
    pub fn close(self) -> Result<()> {
        self.into_stream().map(drop)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Rewrite the header of a free record torn at the end of the file so it
    /// covers only the bytes that exist
    fn trim_torn_tail(&mut self, file_len: u64) -> Result<()> {
        let Some(span) = self.free_list.iter().copied().find(|span| span.end() == file_len) else {
            return Ok(());
        };

        let declared = self.read_header_at(span.offset)?.length;
        if declared != span.length {
            self.write_length(span.offset, span.length)?;
            self.stream.sync()?;
            warn!(
                offset = span.offset,
                declared,
                length = span.length,
                "Trimmed free record torn at end of file"
            );
        }
        Ok(())
    }

    /// Turn the record at `offset` into free space and merge it
    fn release_record(&mut self, offset: u64, length: u64) -> Result<()> {
        self.free_list.push(FreeSpan::new(offset, length));
        self.defragment()?;

        // If a preceding free record absorbed this one, its header already
        // covers these bytes. Otherwise flip the tag; the length is correct.
        if self.free_list.position_of(offset).is_some() {
            self.write_at(offset, &[RecordTag::Free as u8])?;
        }
        Ok(())
    }

    /// Undo freeing a blob whose relocation failed
    ///
    /// Placement never writes into the freed span except when growing the
    /// last record in place, which rewrites the same key first. If the header
    /// cannot be restored the key is dropped so the index never points at
    /// free space.
    fn restore_blob(&mut self, key: u32, offset: u64, length: u64) {
        if let Some(position) = self.free_list.position_of(offset) {
            self.free_list.remove(position);
        }

        let restored = self
            .write_at(offset, &[RecordTag::Blob as u8])
            .and_then(|()| self.write_length(offset, length));
        if let Err(e) = restored {
            self.index.remove(key);
            warn!(key, offset, error = %e, "Failed to restore blob after failed relocation");
        }
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn write_free_header(&mut self, offset: u64, length: u64) -> Result<()> {
        let header = encode_free_header(length)?;
        self.write_at(offset, &header)
    }

    /// Rewrite only the length field, past the tag byte
    fn write_length(&mut self, offset: u64, length: u64) -> Result<()> {
        let field = encode_length(length)?;
        self.write_at(offset + TAG_LEN, &field)
    }

    fn read_header_at(&mut self, offset: u64) -> Result<RecordHeader> {
        self.stream.seek(SeekFrom::Start(offset))?;
        let mut raw = [0u8; HEADER_LEN as usize];
        let read = self.stream.read_up_to(&mut raw)?;
        if read < raw.len() {
            return Err(BlobError::TruncatedRead {
                offset,
                expected: HEADER_LEN,
                actual: read as u64,
            });
        }
        Ok(decode_header(&raw))
    }
}

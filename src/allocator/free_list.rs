//! Free list
//!
//! Discovery-ordered list of free records with best-fit lookup and merge
//! planning.

use crate::record::MIN_FREE_LEN;

use super::FitPolicy;

/// A free record: `offset` points at its tag byte, `length` is the on-disk
/// length field (whole record, at least 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FreeSpan {
    pub offset: u64,
    pub length: u64,
}

impl FreeSpan {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// First byte past this span
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Can this span host a record of `raw` bytes?
    ///
    /// Either it is consumed exactly, or the remainder is large enough to
    /// become a minimal free record. Remainders of 1-4 bytes cannot be
    /// represented, so those spans are skipped.
    pub fn fits(&self, raw: u64) -> bool {
        self.length == raw || self.length >= raw + MIN_FREE_LEN
    }
}

/// A surviving span whose length grows after a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeUpdate {
    /// Position in the (unsorted) free list
    pub position: usize,
    /// Span after the merge
    pub merged: FreeSpan,
}

/// Result of merge planning
///
/// Positions always refer to the free list as it was when the plan was made.
/// Apply every update before any removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    pub updates: Vec<MergeUpdate>,
    pub removals: Vec<usize>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// In-memory mirror of every free record in the file
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    spans: Vec<FreeSpan>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, span: FreeSpan) {
        self.spans.push(span);
    }

    pub fn get(&self, position: usize) -> Option<FreeSpan> {
        self.spans.get(position).copied()
    }

    pub fn remove(&mut self, position: usize) -> FreeSpan {
        self.spans.remove(position)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn as_slice(&self) -> &[FreeSpan] {
        &self.spans
    }

    pub fn iter(&self) -> impl Iterator<Item = &FreeSpan> {
        self.spans.iter()
    }

    /// Position of the span starting at `offset`
    pub fn position_of(&self, offset: u64) -> Option<usize> {
        self.spans.iter().position(|span| span.offset == offset)
    }

    /// Position of the span that ends exactly at `end`
    pub fn position_ending_at(&self, end: u64) -> Option<usize> {
        self.spans.iter().position(|span| span.end() == end)
    }

    /// Sum of all free record lengths
    pub fn total_bytes(&self) -> u64 {
        self.spans.iter().map(|span| span.length).sum()
    }

    pub fn largest(&self) -> Option<FreeSpan> {
        self.spans.iter().copied().max_by_key(|span| span.length)
    }

    // =========================================================================
    // Find-Space
    // =========================================================================

    /// Find a span able to host a record of `raw` bytes
    ///
    /// Returns its position, or `None` when the caller must append at
    /// end-of-stream.
    pub fn find_space(&self, raw: u64, policy: FitPolicy) -> Option<usize> {
        let mut candidates = self
            .spans
            .iter()
            .enumerate()
            .filter(|(_, span)| span.fits(raw));

        match policy {
            FitPolicy::FirstFit => candidates.next().map(|(position, _)| position),
            // min_by_key keeps the first of equal lengths
            FitPolicy::BestFit => candidates
                .min_by_key(|(_, span)| span.length)
                .map(|(position, _)| position),
        }
    }

    // =========================================================================
    // Defragmentation
    // =========================================================================

    /// Plan the merge of every chain of byte-adjacent spans
    ///
    /// Works on a sorted copy that remembers each span's position in the
    /// unsorted list. The lowest span of a chain survives with the merged
    /// length; the others are queued for removal.
    pub fn plan_merges(&self) -> MergePlan {
        let mut sorted: Vec<(usize, FreeSpan)> = self.spans.iter().copied().enumerate().collect();
        sorted.sort_by_key(|(_, span)| span.offset);

        let mut plan = MergePlan::default();
        let mut i = 0;
        while i < sorted.len() {
            let (head_position, head) = sorted[i];
            let mut end = head.end();

            let mut j = i + 1;
            while j < sorted.len() && sorted[j].1.offset == end {
                plan.removals.push(sorted[j].0);
                end = sorted[j].1.end();
                j += 1;
            }

            if j > i + 1 {
                plan.updates.push(MergeUpdate {
                    position: head_position,
                    merged: FreeSpan::new(head.offset, end - head.offset),
                });
            }
            i = j;
        }

        plan
    }

    /// Apply one planned length update in place
    pub fn apply_update(&mut self, update: &MergeUpdate) {
        self.spans[update.position] = update.merged;
    }

    /// Remove the given positions (original-list positions)
    ///
    /// Removes from the highest position down so earlier removals cannot
    /// shift later ones.
    pub fn remove_positions(&mut self, mut positions: Vec<usize>) {
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();
        for position in positions {
            self.spans.remove(position);
        }
    }
}

impl FromIterator<FreeSpan> for FreeList {
    fn from_iter<I: IntoIterator<Item = FreeSpan>>(iter: I) -> Self {
        Self {
            spans: iter.into_iter().collect(),
        }
    }
}

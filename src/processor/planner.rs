//! Range planning against the ledger head: which trailing batches to re-scan
//! this pass, and how to cut them into range queries the ledger will accept.

/// Identifier of one ledger batch.
pub type BatchId = u64;

/// Minimum span (`head - start`) worth scanning.
const MIN_SCAN_SPAN: u64 = 2;

/// Half-open range `[start, end)` of batch identifiers scheduled for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    start: BatchId,
    end: BatchId,
}

/// Closed range `[start, end]` sent to the ledger in a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: BatchId,
    pub end: BatchId,
}

/// Computes the scan range for `head` with `lag_offset` trailing batches.
///
/// Returns `None` when the range would span fewer than two batches, which
/// tells the caller to wait for the ledger to advance.
pub fn plan(head: BatchId, lag_offset: u64) -> Option<ScanRange> {
    let start = head.saturating_sub(lag_offset).max(1);
    if head.saturating_sub(start) < MIN_SCAN_SPAN {
        return None;
    }
    Some(ScanRange { start, end: head })
}

impl ScanRange {
    pub fn start(&self) -> BatchId {
        self.start
    }

    /// Exclusive upper bound (the head that produced this range).
    pub fn end(&self) -> BatchId {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Splits the range into consecutive chunks of at most `batch_size` ids.
    pub fn chunks(&self, batch_size: u64) -> Chunks {
        Chunks {
            next: self.start,
            end: self.end,
            size: batch_size.max(1),
        }
    }
}

/// Iterator over the chunks of a [`ScanRange`], in batch order.
#[derive(Debug, Clone)]
pub struct Chunks {
    next: BatchId,
    end: BatchId,
    size: u64,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let start = self.next;
        let last = start.saturating_add(self.size - 1).min(self.end - 1);
        self.next = last + 1;

        // The range query rejects degenerate [a, a] ranges.
        let end = if last == start { last + 1 } else { last };
        Some(Chunk { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        let count = remaining.div_ceil(self.size) as usize;
        (count, Some(count))
    }
}

impl ExactSizeIterator for Chunks {}

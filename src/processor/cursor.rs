//! Per-process view of where the ledger head is. Never persisted.

use super::planner::{plan, BatchId, ScanRange};

/// How a freshly read head relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadObservation {
    First(BatchId),
    Advanced { previous: BatchId, head: BatchId },
    Stalled(BatchId),
    /// The ledger reported a lower head than before. The cursor keeps the
    /// previous value and the pass is treated as a transient read failure.
    Regressed { previous: BatchId, observed: BatchId },
}

#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    last_head: Option<BatchId>,
    lag_offset: u64,
}

impl Cursor {
    pub fn new(lag_offset: u64) -> Self {
        Self {
            last_head: None,
            lag_offset,
        }
    }

    pub fn last_head(&self) -> Option<BatchId> {
        self.last_head
    }

    pub fn lag_offset(&self) -> u64 {
        self.lag_offset
    }

    pub fn observe(&mut self, head: BatchId) -> HeadObservation {
        let observation = match self.last_head {
            None => HeadObservation::First(head),
            Some(previous) if head > previous => HeadObservation::Advanced { previous, head },
            Some(previous) if head == previous => HeadObservation::Stalled(head),
            Some(previous) => {
                return HeadObservation::Regressed {
                    previous,
                    observed: head,
                }
            }
        };

        self.last_head = Some(head);
        observation
    }

    /// Scan range for the last accepted head, if there is work to do.
    pub fn plan(&self) -> Option<ScanRange> {
        self.last_head.and_then(|head| plan(head, self.lag_offset))
    }
}

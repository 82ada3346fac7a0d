pub(crate) mod backoff;
pub mod cursor;
pub mod dedup;
pub mod head;
pub mod planner;
pub mod poll;

pub use cursor::{Cursor, HeadObservation};
pub use dedup::DedupWindow;
pub use head::ResilientHeadReader;
pub use planner::{plan, BatchId, Chunk, ScanRange};
pub use poll::{IdleReason, LoopState, PassOutcome, PassStats, PollLoop};

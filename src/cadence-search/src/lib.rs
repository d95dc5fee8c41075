//! Fan-out search over provider skills and best-result selection.

pub mod aggregator;
pub mod legacy;
pub mod select;
pub mod session;

pub use aggregator::SearchAggregator;
pub use legacy::{LegacyCommonPlay, SearchAdapter};
pub use select::{select_best, select_best_with};
pub use session::{ReplyGroup, SearchSession, StopReason};

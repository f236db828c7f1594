pub mod atomic;
pub mod history;
pub mod snapshot;

pub use history::{HISTORY_LIMIT, HistoryLog};
pub use snapshot::RateCache;

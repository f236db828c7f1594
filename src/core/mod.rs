//! Rate model, configuration and the update pipeline

pub mod config;
pub mod error;
pub mod log;
pub mod rates;
pub mod scheduler;
pub mod source;
pub mod updater;

// Re-export main types for cleaner imports
pub use error::{ConfigError, FailureKind, FetchError, PersistenceError};
pub use rates::{RateMap, RatePair, Snapshot};
pub use scheduler::{RatesScheduler, SchedulerStats};
pub use source::RateSource;
pub use updater::{RatesStatus, RatesUpdater, UpdateResult};

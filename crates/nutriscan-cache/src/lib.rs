// SQLite-based local store
// Keeps scans working offline and holds history + preferences across restarts

pub mod cache;
pub mod error;

pub use cache::{CacheManager, ScanCounts, ScanEvent};
pub use error::{CacheError, Result};

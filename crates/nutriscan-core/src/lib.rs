// Scan pipeline: capture, resolution, evaluation and history
pub mod barcode;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod preferences;
pub mod providers;
pub mod resolver;
pub mod source;
pub mod stats;

pub use catalog::{Catalog, SyncReport};
pub use config::Config;
pub use connectivity::ConnectivityBelief;
pub use error::Error;
pub use evaluator::{Evaluation, Evaluator, HealthLabel};
pub use models::{ProductRecord, ResolutionSource, ScanEvent, ScanResult};
pub use preferences::Preferences;
pub use resolver::ProductResolver;
pub use source::ProductSource;
pub use stats::{ScanStats, StatisticsAggregator};

pub type Result<T> = std::result::Result<T, Error>;

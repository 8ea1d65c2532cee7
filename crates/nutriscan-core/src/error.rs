use nutriscan_api::NutritionApiError;
use nutriscan_cache::CacheError;
use thiserror::Error;

/// Everything that can go wrong between a scanned symbol and a result
#[derive(Error, Debug)]
pub enum Error {
    /// Neither the service nor the cache knows this barcode
    #[error("Product not found: {0}")]
    NotFound(String),

    /// Rejected before any I/O happened
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout or transport failure talking to the service
    #[error("Service temporarily unavailable: {0}")]
    Transient(String),

    /// A cache write or read failed. Never swallowed.
    #[error("Cache operation failed: {0}")]
    PersistenceFailure(String),

    #[error("Service is offline: {0}")]
    Offline(String),

    #[error("Service error: {0}")]
    ApiError(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::PersistenceFailure(err.to_string())
    }
}

impl From<NutritionApiError> for Error {
    fn from(err: NutritionApiError) -> Self {
        match err {
            NutritionApiError::NotFound(barcode) => Error::NotFound(barcode),
            e if e.is_transient() => Error::Transient(e.to_string()),
            e => Error::ApiError(e.to_string()),
        }
    }
}

// HTTP client for the remote product service
pub mod client;
pub mod models;
pub mod retry;

// Re-export common types
pub use client::{NutritionApiError, NutritionClient, Result, Timeouts};
pub use models::{Envelope, ProductPayload};
pub use retry::RetryPolicy;

use crate::{models::ProductRecord, Result};

/// Where products come from when we're online.
///
/// The HTTP client implements this in production. Tests swap in a mock so the
/// resolver's fallback logic can be exercised without a server.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProductSource: Send + Sync {
    /// Look up one product by canonical barcode
    async fn fetch_product(&self, barcode: &str) -> Result<ProductRecord>;

    /// Cheap reachability probe
    async fn health_check(&self) -> Result<()>;

    /// Add a product to the service catalog
    async fn submit_product(&self, product: &ProductRecord) -> Result<()>;

    /// Full catalog, used to warm the cache before going offline
    async fn fetch_catalog(&self) -> Result<Vec<ProductRecord>>;
}

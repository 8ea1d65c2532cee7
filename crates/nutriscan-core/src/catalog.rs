// Catalog maintenance: adding products and warming the cache
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    evaluator::normalize_tags, models::ProductRecord, resolver::ProductResolver, Error, Result,
};

/// Outcome of pulling the service catalog into the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub stored: usize,
    pub skipped: usize,
}

/// Product management that sits beside the scan path. Shares the resolver's
/// service handle, cache and connectivity belief.
pub struct Catalog {
    resolver: Arc<ProductResolver>,
}

impl Catalog {
    pub fn new(resolver: Arc<ProductResolver>) -> Self {
        Self { resolver }
    }

    /// Send a new product to the service, then keep a local copy. Writes no
    /// scan history.
    pub async fn submit_product(&self, mut product: ProductRecord) -> Result<ProductRecord> {
        product.barcode = crate::barcode::normalize(product.barcode.trim());
        product.name = product.name.trim().to_string();
        product.allergens = normalize_tags(&product.allergens);
        product.validate()?;

        if !self.resolver.connectivity().is_online() {
            return Err(Error::Offline(format!(
                "cannot add {} while the service is unreachable",
                product.barcode
            )));
        }

        self.resolver.remote().submit_product(&product).await?;
        self.resolver
            .cache()
            .upsert_product(&product.barcode, &product.name, &product)?;

        info!("Added product {} ({})", product.barcode, product.name);
        Ok(product)
    }

    /// Copy the whole service catalog into the cache in one transaction
    pub async fn sync(&self) -> Result<SyncReport> {
        if !self.resolver.connectivity().is_online() {
            return Err(Error::Offline("cannot sync the catalog".into()));
        }

        let products = self.resolver.remote().fetch_catalog().await?;
        let fetched = products.len();

        let storable: Vec<ProductRecord> = products
            .into_iter()
            .filter(|p| {
                let ok = !p.barcode.trim().is_empty() && !p.name.trim().is_empty();
                if !ok {
                    warn!("Skipping catalog entry without barcode or name: {:?}", p.barcode);
                }
                ok
            })
            .map(|mut p| {
                p.barcode = crate::barcode::normalize(p.barcode.trim());
                p
            })
            .collect();

        let stored = self.store_all(&storable)?;
        info!("Synced {} of {} catalog products", stored, fetched);

        Ok(SyncReport {
            fetched,
            stored,
            skipped: fetched - storable.len(),
        })
    }

    /// Load products straight into the cache without touching the service
    pub fn import(&self, products: &[ProductRecord]) -> Result<usize> {
        for product in products {
            product.validate()?;
        }
        self.store_all(products)
    }

    pub fn cached_products(&self) -> Result<Vec<ProductRecord>> {
        Ok(self.resolver.cache().list_products()?)
    }

    pub fn cached_count(&self) -> Result<u64> {
        Ok(self.resolver.cache().product_count()?)
    }

    fn store_all(&self, products: &[ProductRecord]) -> Result<usize> {
        let stored = self.resolver.cache().upsert_products(
            products
                .iter()
                .map(|p| (p.barcode.as_str(), p.name.as_str(), p)),
        )?;
        Ok(stored)
    }
}

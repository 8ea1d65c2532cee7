// Barcode resolution with remote-first lookup and cache fallback
use nutriscan_api::Timeouts;
use nutriscan_cache::CacheManager;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    barcode,
    connectivity::ConnectivityBelief,
    evaluator::{Evaluation, Evaluator},
    models::{ProductRecord, ResolutionSource, ScanResult},
    source::ProductSource,
    Error, Result,
};

/// Turns barcodes into scan results.
///
/// Tries the service when we believe it is reachable, writes good answers
/// through to the cache, and falls back to the cache on any remote failure.
/// Every successful resolution appends exactly one history entry.
pub struct ProductResolver {
    remote: Arc<dyn ProductSource>,
    cache: Arc<CacheManager>,
    connectivity: ConnectivityBelief,
    lookup_timeout: Duration,
    health_timeout: Duration,
}

impl ProductResolver {
    pub fn new(remote: Arc<dyn ProductSource>, cache: Arc<CacheManager>) -> Self {
        let timeouts = Timeouts::default();
        Self {
            remote,
            cache,
            connectivity: ConnectivityBelief::new(),
            lookup_timeout: timeouts.lookup,
            health_timeout: timeouts.health,
        }
    }

    pub fn with_timeouts(mut self, timeouts: &Timeouts) -> Self {
        self.lookup_timeout = timeouts.lookup;
        self.health_timeout = timeouts.health;
        self
    }

    pub fn with_connectivity(mut self, connectivity: ConnectivityBelief) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn connectivity(&self) -> &ConnectivityBelief {
        &self.connectivity
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<dyn ProductSource> {
        &self.remote
    }

    /// Re-probe the service. Until the next call, every resolution is routed
    /// on this answer.
    pub async fn refresh_connectivity(&self) -> bool {
        self.connectivity
            .refresh(self.remote.as_ref(), self.health_timeout)
            .await
    }

    /// Resolve raw decoded text to a scan result
    pub async fn resolve(&self, raw: &str) -> Result<ScanResult> {
        let barcode = barcode::normalize(raw);
        validate_barcode(&barcode)?;

        // Snapshot preferences now so history reflects what the user had set
        // at the moment of the scan
        let allergens = self.cache.get_preferences()?;

        if self.connectivity.is_online() {
            if let Some(product) = self.fetch_remote(&barcode).await {
                return self.write_through(&barcode, product, &allergens);
            }
        } else {
            debug!("Offline, skipping remote lookup for {}", barcode);
        }

        self.resolve_from_cache(&barcode, &allergens)
    }

    /// Single bounded attempt. Any failure means "use the cache".
    async fn fetch_remote(&self, barcode: &str) -> Option<ProductRecord> {
        match tokio::time::timeout(self.lookup_timeout, self.remote.fetch_product(barcode)).await {
            Ok(Ok(product)) if product.name.trim().is_empty() => {
                warn!("Service returned {} without a name, ignoring it", barcode);
                None
            }
            Ok(Ok(product)) => Some(product),
            Ok(Err(Error::NotFound(_))) => {
                debug!("Service does not know {}", barcode);
                None
            }
            Ok(Err(e)) => {
                debug!("Remote lookup for {} failed: {}", barcode, e);
                None
            }
            Err(_) => {
                debug!(
                    "Remote lookup for {} timed out after {:?}",
                    barcode, self.lookup_timeout
                );
                None
            }
        }
    }

    fn write_through(
        &self,
        barcode: &str,
        mut product: ProductRecord,
        allergens: &BTreeSet<String>,
    ) -> Result<ScanResult> {
        // Cache under the key we looked up, whatever form the service echoed back
        product.barcode = barcode.to_string();

        let evaluation = Evaluator::evaluate(&product, allergens);
        let scan_id = self.cache.record_scan(
            barcode,
            &product.name,
            &product,
            evaluation.is_healthy,
            evaluation.has_conflict,
        )?;

        info!("Resolved {} online: {}", barcode, product.name);
        Ok(scan_result(product, ResolutionSource::Remote, evaluation, scan_id))
    }

    fn resolve_from_cache(&self, barcode: &str, allergens: &BTreeSet<String>) -> Result<ScanResult> {
        let product = self
            .cache
            .get_product::<ProductRecord>(barcode)?
            .ok_or_else(|| Error::NotFound(barcode.to_string()))?;

        let evaluation = Evaluator::evaluate(&product, allergens);
        let scan_id =
            self.cache
                .append_scan_event(barcode, evaluation.is_healthy, evaluation.has_conflict)?;

        info!("Resolved {} from cache: {}", barcode, product.name);
        Ok(scan_result(product, ResolutionSource::Cache, evaluation, scan_id))
    }
}

fn validate_barcode(barcode: &str) -> Result<()> {
    if barcode.trim().is_empty() {
        return Err(Error::InvalidInput("barcode is empty".into()));
    }
    if barcode.chars().any(char::is_control) {
        return Err(Error::InvalidInput(format!(
            "barcode {:?} contains control characters",
            barcode
        )));
    }
    Ok(())
}

fn scan_result(
    product: ProductRecord,
    source: ResolutionSource,
    evaluation: Evaluation,
    scan_id: i64,
) -> ScanResult {
    ScanResult {
        product,
        source,
        conflicts: evaluation.conflicts,
        health_label: evaluation.health_label,
        scan_id,
    }
}

use nutriscan_cache::{CacheManager, ScanCounts, ScanEvent};
use serde::Serialize;
use std::sync::Arc;

use crate::Result;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Counts over the whole scan history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub total: u64,
    pub healthy: u64,
    pub allergen_conflicts: u64,
}

impl ScanStats {
    pub fn healthy_percentage(&self) -> f64 {
        percentage(self.healthy, self.total)
    }

    pub fn allergen_percentage(&self) -> f64 {
        percentage(self.allergen_conflicts, self.total)
    }
}

impl From<ScanCounts> for ScanStats {
    fn from(counts: ScanCounts) -> Self {
        Self {
            total: counts.total,
            healthy: counts.healthy,
            allergen_conflicts: counts.allergen_conflicts,
        }
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Read-only view over scan history. Never caches: every call hits the store.
pub struct StatisticsAggregator {
    cache: Arc<CacheManager>,
}

impl StatisticsAggregator {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    /// All three counts come from one query, so they always agree with each other
    pub fn stats(&self) -> Result<ScanStats> {
        Ok(self.cache.scan_counts()?.into())
    }

    /// Newest first
    pub fn recent_scans(&self, limit: usize) -> Result<Vec<ScanEvent>> {
        Ok(self.cache.recent_scans(limit)?)
    }
}

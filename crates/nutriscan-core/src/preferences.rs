use nutriscan_cache::CacheManager;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::{evaluator::normalize_tags, Result};

/// The user's allergen set. Always replaced as a whole.
pub struct Preferences {
    cache: Arc<CacheManager>,
}

impl Preferences {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub fn allergens(&self) -> Result<BTreeSet<String>> {
        Ok(normalize_tags(self.cache.get_preferences()?))
    }

    /// Replace the stored set. Returns what was actually saved after
    /// normalization.
    pub fn set_allergens<I, S>(&self, tags: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allergens = normalize_tags(tags);
        self.cache.set_preferences(&allergens)?;
        info!("Saved {} allergen preference(s)", allergens.len());
        Ok(allergens)
    }

    pub fn clear(&self) -> Result<()> {
        self.cache.set_preferences(&BTreeSet::new())?;
        Ok(())
    }
}

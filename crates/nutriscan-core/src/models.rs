use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::evaluator::{HealthLabel, HEALTHY_THRESHOLD};
use crate::{Error, Result};

pub use nutriscan_cache::ScanEvent;

/// Score assumed when the service didn't send one
pub const DEFAULT_HEALTH_SCORE: u8 = 50;

/// A product as the rest of the system sees it. Nutrients are per 100g.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub barcode: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub sugar: Option<f64>,
    #[serde(default)]
    pub fats: Option<f64>,
    #[serde(default)]
    pub saturated_fats: Option<f64>,
    #[serde(default)]
    pub fiber: Option<f64>,
    #[serde(default)]
    pub sodium: Option<f64>,
    /// Lowercased, trimmed tags
    #[serde(default)]
    pub allergens: BTreeSet<String>,
    /// 0-100
    #[serde(default = "default_health_score")]
    pub health_score: u8,
    /// Explicit verdict from the service. Wins over the score threshold.
    #[serde(default, rename = "is_healthy")]
    pub healthy_override: Option<bool>,
}

fn default_health_score() -> u8 {
    DEFAULT_HEALTH_SCORE
}

/// One line of a nutrition panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutritionFact {
    pub label: &'static str,
    pub value: f64,
    pub unit: &'static str,
}

impl ProductRecord {
    pub fn new(barcode: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            name: name.into(),
            brand: None,
            category: None,
            calories: None,
            protein: None,
            carbs: None,
            sugar: None,
            fats: None,
            saturated_fats: None,
            fiber: None,
            sodium: None,
            allergens: BTreeSet::new(),
            health_score: DEFAULT_HEALTH_SCORE,
            healthy_override: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy_override
            .unwrap_or(self.health_score >= HEALTHY_THRESHOLD)
    }

    pub fn health_label(&self) -> HealthLabel {
        HealthLabel::from_score(self.health_score)
    }

    /// Reject records that could never be served back by a lookup
    pub fn validate(&self) -> Result<()> {
        if self.barcode.trim().is_empty() {
            return Err(Error::InvalidInput("barcode must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "product {} has no name",
                self.barcode
            )));
        }
        if self.health_score > 100 {
            return Err(Error::InvalidInput(format!(
                "health score {} is outside 0-100",
                self.health_score
            )));
        }
        Ok(())
    }

    /// Only the nutrients the service actually reported, in panel order
    pub fn nutrition_facts(&self) -> Vec<NutritionFact> {
        [
            ("Calories", self.calories, "kcal"),
            ("Protein", self.protein, "g"),
            ("Carbs", self.carbs, "g"),
            ("Sugar", self.sugar, "g"),
            ("Fats", self.fats, "g"),
            ("Saturated fats", self.saturated_fats, "g"),
            ("Fiber", self.fiber, "g"),
            ("Sodium", self.sodium, "mg"),
        ]
        .into_iter()
        .filter_map(|(label, value, unit)| value.map(|value| NutritionFact { label, value, unit }))
        .collect()
    }
}

/// Where a scan result came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResolutionSource {
    Remote,
    Cache,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionSource::Remote => write!(f, "online"),
            ResolutionSource::Cache => write!(f, "cached"),
        }
    }
}

/// What the user gets back for one scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub product: ProductRecord,
    pub source: ResolutionSource,
    /// User allergens present in this product
    pub conflicts: BTreeSet<String>,
    pub health_label: HealthLabel,
    /// Id of the history entry written for this scan
    pub scan_id: i64,
}

impl ScanResult {
    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_beats_score() {
        let mut product = ProductRecord::new("1", "Candy");
        product.health_score = 90;
        assert!(product.is_healthy());

        product.healthy_override = Some(false);
        assert!(!product.is_healthy());

        product.health_score = 10;
        product.healthy_override = Some(true);
        assert!(product.is_healthy());
    }

    #[test]
    fn test_score_threshold() {
        let mut product = ProductRecord::new("1", "Oats");
        product.health_score = 60;
        assert!(product.is_healthy());
        product.health_score = 59;
        assert!(!product.is_healthy());
    }

    #[test]
    fn test_label_follows_score_not_override() {
        let mut product = ProductRecord::new("1", "Crisps");
        product.health_score = 45;
        product.healthy_override = Some(true);
        assert_eq!(product.health_label(), HealthLabel::Moderate);

        product.health_score = 70;
        assert_eq!(product.health_label(), HealthLabel::Healthy);
    }

    #[test]
    fn test_validate() {
        assert!(ProductRecord::new("1", "Oats").validate().is_ok());
        assert!(matches!(
            ProductRecord::new("1", "  ").validate(),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ProductRecord::new("", "Oats").validate(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_nutrition_facts_skip_missing_values() {
        let mut product = ProductRecord::new("1", "Oats");
        product.calories = Some(389.0);
        product.fiber = Some(10.6);

        let facts = product.nutrition_facts();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].label, "Calories");
        assert_eq!(facts[0].unit, "kcal");
        assert_eq!(facts[1].label, "Fiber");
    }

    #[test]
    fn test_cached_json_without_optional_fields() {
        let product: ProductRecord =
            serde_json::from_str(r#"{"barcode":"1","name":"Oats"}"#).unwrap();
        assert_eq!(product.health_score, DEFAULT_HEALTH_SCORE);
        assert!(product.allergens.is_empty());
        assert_eq!(product.healthy_override, None);
    }
}

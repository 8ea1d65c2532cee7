use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::ProductRecord;

/// Score at or above which a product counts as healthy when the service
/// gave no explicit verdict
pub const HEALTHY_THRESHOLD: u8 = 60;

/// Display bucket for a health score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthLabel {
    /// Score 70-100
    Healthy,
    /// Score 40-69
    Moderate,
    /// Score 0-39
    Poor,
}

impl HealthLabel {
    pub fn from_score(score: u8) -> Self {
        match score {
            70..=u8::MAX => HealthLabel::Healthy,
            40..=69 => HealthLabel::Moderate,
            _ => HealthLabel::Poor,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            HealthLabel::Healthy => "✓",
            HealthLabel::Moderate => "○",
            HealthLabel::Poor => "✗",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthLabel::Healthy => "Healthy",
            HealthLabel::Moderate => "Moderate",
            HealthLabel::Poor => "Poor",
        }
    }
}

impl std::fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of checking one product against one user's allergens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub conflicts: BTreeSet<String>,
    pub has_conflict: bool,
    pub health_label: HealthLabel,
    pub is_healthy: bool,
}

/// Pure product evaluation. No I/O, same inputs give the same answer.
pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(product: &ProductRecord, user_allergens: &BTreeSet<String>) -> Evaluation {
        let product_tags = normalize_tags(&product.allergens);
        let user_tags = normalize_tags(user_allergens);

        let conflicts: BTreeSet<String> = product_tags.intersection(&user_tags).cloned().collect();

        Evaluation {
            has_conflict: !conflicts.is_empty(),
            conflicts,
            health_label: HealthLabel::from_score(product.health_score),
            is_healthy: product.is_healthy(),
        }
    }
}

/// Canonical form of an allergen tag
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Normalize a set of tags, dropping blanks
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| normalize_tag(tag.as_ref()))
        .filter(|tag| !tag.is_empty())
        .collect()
}

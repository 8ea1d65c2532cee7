// Nutrition service provider - bridges the HTTP client with ProductSource
use async_trait::async_trait;
use nutriscan_api::{NutritionClient, ProductPayload};

use crate::{
    evaluator::normalize_tags,
    models::{ProductRecord, DEFAULT_HEALTH_SCORE},
    source::ProductSource,
    Result,
};

/// Wrapper around NutritionClient that implements ProductSource
pub struct NutritionApiSource {
    client: NutritionClient,
}

impl NutritionApiSource {
    pub fn new(client: NutritionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProductSource for NutritionApiSource {
    async fn fetch_product(&self, barcode: &str) -> Result<ProductRecord> {
        let payload = self.client.get_product(barcode).await?;
        Ok(payload_to_record(payload))
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health_check().await?;
        Ok(())
    }

    async fn submit_product(&self, product: &ProductRecord) -> Result<()> {
        self.client.add_product(&record_to_payload(product)).await?;
        Ok(())
    }

    async fn fetch_catalog(&self) -> Result<Vec<ProductRecord>> {
        let payloads = self.client.list_products().await?;
        Ok(payloads.into_iter().map(payload_to_record).collect())
    }
}

/// Convert a wire product to our internal record
pub fn payload_to_record(p: ProductPayload) -> ProductRecord {
    ProductRecord {
        barcode: p.barcode.trim().to_string(),
        name: p.name.trim().to_string(),
        brand: p.brand.filter(|b| !b.trim().is_empty()),
        category: p.category.filter(|c| !c.trim().is_empty()),
        calories: p.calories,
        protein: p.protein,
        carbs: p.carbs,
        sugar: p.sugar,
        fats: p.fats,
        saturated_fats: p.saturated_fats,
        fiber: p.fiber,
        sodium: p.sodium,
        allergens: normalize_tags(&p.allergens),
        health_score: p
            .health_score
            .filter(|s| s.is_finite())
            .map(|s| s.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(DEFAULT_HEALTH_SCORE),
        healthy_override: p.is_healthy,
    }
}

/// Convert our record back to the wire shape for submission
pub fn record_to_payload(r: &ProductRecord) -> ProductPayload {
    ProductPayload {
        barcode: r.barcode.clone(),
        name: r.name.clone(),
        brand: r.brand.clone(),
        category: r.category.clone(),
        calories: r.calories,
        protein: r.protein,
        carbs: r.carbs,
        sugar: r.sugar,
        fats: r.fats,
        saturated_fats: r.saturated_fats,
        fiber: r.fiber,
        sodium: r.sodium,
        allergens: r.allergens.iter().cloned().collect(),
        health_score: Some(f64::from(r.health_score)),
        is_healthy: r.healthy_override,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_conversion_cleans_values() {
        let payload = ProductPayload {
            barcode: " 1234567890 ".into(),
            name: "Test Bar".into(),
            brand: Some("  ".into()),
            allergens: vec!["Dairy".into(), " nuts".into()],
            health_score: Some(80.4),
            ..Default::default()
        };

        let record = payload_to_record(payload);
        assert_eq!(record.barcode, "1234567890");
        assert_eq!(record.brand, None);
        assert_eq!(record.health_score, 80);
        assert!(record.allergens.contains("dairy"));
        assert!(record.allergens.contains("nuts"));
    }

    #[test]
    fn test_score_is_clamped_and_defaulted() {
        let high = ProductPayload {
            health_score: Some(250.0),
            ..Default::default()
        };
        assert_eq!(payload_to_record(high).health_score, 100);

        let missing = ProductPayload::default();
        assert_eq!(payload_to_record(missing).health_score, DEFAULT_HEALTH_SCORE);

        let nan = ProductPayload {
            health_score: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(payload_to_record(nan).health_score, DEFAULT_HEALTH_SCORE);
    }

    #[test]
    fn test_record_to_payload_keeps_override() {
        let mut record = ProductRecord::new("1", "Soda");
        record.healthy_override = Some(false);
        record.health_score = 20;

        let payload = record_to_payload(&record);
        assert_eq!(payload.is_healthy, Some(false));
        assert_eq!(payload.health_score, Some(20.0));
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Response wrapper used by every endpoint of the product service
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Product as it travels over the wire.
///
/// The service is lenient about types: numbers sometimes arrive as strings,
/// `is_healthy` as `0`/`1`, and allergens either as a JSON list or as a
/// comma-separated string. All of that is absorbed here so the rest of the
/// system only ever sees clean values. Nutrients are per 100g.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub protein: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub carbs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub sugar: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fats: Option<f64>,
    #[serde(default, alias = "saturatedFats", deserialize_with = "lenient_number")]
    pub saturated_fats: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fiber: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub sodium: Option<f64>,
    #[serde(default, deserialize_with = "allergen_list")]
    pub allergens: Vec<String>,
    #[serde(default, alias = "healthScore", deserialize_with = "lenient_number")]
    pub health_score: Option<f64>,
    #[serde(default, alias = "isHealthy", deserialize_with = "lenient_flag")]
    pub is_healthy: Option<bool>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        Some(Value::String(s)) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn allergen_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    Ok(raw
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty() && !tag.eq_ignore_ascii_case("none"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_snake_case_payload() {
        let json = r#"{
            "barcode": "1234567890",
            "name": "Test Bar",
            "brand": "Acme",
            "calories": 250,
            "saturated_fats": 1.5,
            "allergens": ["dairy", "soy"],
            "health_score": 80,
            "is_healthy": 1
        }"#;

        let product: ProductPayload = serde_json::from_str(json).unwrap();
        assert_eq!(product.name, "Test Bar");
        assert_eq!(product.calories, Some(250.0));
        assert_eq!(product.saturated_fats, Some(1.5));
        assert_eq!(product.allergens, vec!["dairy", "soy"]);
        assert_eq!(product.health_score, Some(80.0));
        assert_eq!(product.is_healthy, Some(true));
        assert_eq!(product.category, None);
    }

    #[test]
    fn test_parses_camel_case_and_string_numbers() {
        let json = r#"{
            "barcode": "42",
            "name": "Crackers",
            "saturatedFats": "2.25",
            "sodium": "0.4",
            "healthScore": "55",
            "isHealthy": false
        }"#;

        let product: ProductPayload = serde_json::from_str(json).unwrap();
        assert_eq!(product.saturated_fats, Some(2.25));
        assert_eq!(product.sodium, Some(0.4));
        assert_eq!(product.health_score, Some(55.0));
        assert_eq!(product.is_healthy, Some(false));
        assert!(product.allergens.is_empty());
    }

    #[test]
    fn test_allergens_from_comma_string() {
        let json = r#"{"barcode": "1", "name": "Bread", "allergens": "gluten, wheat,,None"}"#;
        let product: ProductPayload = serde_json::from_str(json).unwrap();
        assert_eq!(product.allergens, vec!["gluten", "wheat"]);
    }

    #[test]
    fn test_null_fields_are_absent() {
        let json = r#"{"barcode": "1", "name": "Water", "calories": null, "allergens": null, "is_healthy": null}"#;
        let product: ProductPayload = serde_json::from_str(json).unwrap();
        assert_eq!(product.calories, None);
        assert!(product.allergens.is_empty());
        assert_eq!(product.is_healthy, None);
    }

    #[test]
    fn test_envelope_without_data() {
        let json = r#"{"success": false, "error": "Product not found"}"#;
        let envelope: Envelope<ProductPayload> = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error.as_deref(), Some("Product not found"));
    }
}

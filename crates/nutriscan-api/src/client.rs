use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::models::{Envelope, ProductPayload};
use crate::retry::{is_retryable_status, with_retry, RetryPolicy};

const USER_AGENT: &str = "NutriScan/0.1.0";

#[derive(Error, Debug)]
pub enum NutritionApiError {
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Service rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for NutritionApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NutritionApiError::Timeout
        } else {
            NutritionApiError::NetworkError(err)
        }
    }
}

impl NutritionApiError {
    /// Worth another attempt: the service or the network hiccuped
    pub fn is_transient(&self) -> bool {
        match self {
            NutritionApiError::Timeout | NutritionApiError::NetworkError(_) => true,
            NutritionApiError::RequestFailed { status, .. } => {
                reqwest::StatusCode::from_u16(*status)
                    .map(is_retryable_status)
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NutritionApiError>;

/// Per-call timeouts. Lookups sit on the scan path so they stay short; the
/// health check is shorter still since it only feeds the online/offline belief.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub lookup: Duration,
    pub health: Duration,
    pub submit: Duration,
    pub sync: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(5),
            health: Duration::from_secs(3),
            submit: Duration::from_secs(10),
            sync: Duration::from_secs(5),
        }
    }
}

pub struct NutritionClient {
    client: reqwest::Client,
    base_url: String,
    timeouts: Timeouts,
    retry_policy: RetryPolicy,
}

impl NutritionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeouts: Timeouts::default(),
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Resolve one barcode. Single attempt, bounded by the lookup timeout.
    pub async fn get_product(&self, barcode: &str) -> Result<ProductPayload> {
        let url = format!("{}/product", self.base_url);
        debug!("GET {}?barcode={}", url, barcode);

        let response = self
            .client
            .get(&url)
            .query(&[("barcode", barcode)])
            .timeout(self.timeouts.lookup)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NutritionApiError::NotFound(barcode.to_string()));
        }

        let envelope: Envelope<ProductPayload> = read_envelope(response).await?;
        if !envelope.success {
            return Err(NutritionApiError::Rejected(
                envelope.error.unwrap_or_else(|| format!("no product for {}", barcode)),
            ));
        }

        envelope
            .data
            .ok_or_else(|| NutritionApiError::MalformedResponse("missing product payload".into()))
    }

    /// Cheap reachability probe. Any 2xx counts as up.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/healthcheck", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeouts.health)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NutritionApiError::RequestFailed {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }

    /// Insert or update a product on the service
    pub async fn add_product(&self, product: &ProductPayload) -> Result<()> {
        let url = format!("{}/product", self.base_url);
        debug!("POST {} ({})", url, product.barcode);

        let response = self
            .client
            .post(&url)
            .json(product)
            .timeout(self.timeouts.submit)
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = read_envelope(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(NutritionApiError::Rejected(
                envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Fetch the whole catalog. Transient failures are retried per the policy.
    pub async fn list_products(&self) -> Result<Vec<ProductPayload>> {
        let url = format!("{}/products", self.base_url);

        with_retry(&self.retry_policy, NutritionApiError::is_transient, || async {
            let response = self
                .client
                .get(&url)
                .timeout(self.timeouts.sync)
                .send()
                .await?;

            let envelope: Envelope<Vec<ProductPayload>> = read_envelope(response).await?;
            if !envelope.success {
                return Err(NutritionApiError::Rejected(
                    envelope.error.unwrap_or_else(|| "catalog unavailable".to_string()),
                ));
            }

            Ok(envelope.data.unwrap_or_default())
        })
        .await
    }
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(NutritionApiError::RequestFailed {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| NutritionApiError::MalformedResponse(e.to_string()))
}

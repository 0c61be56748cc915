//! Pricing function gateway
//!
//! The guaranteed-margin calculation runs in a hosted serverless function.
//! This module only sends the request and decodes the response; failures
//! are surfaced to the caller and never retried.

use super::types::{CalculationRequest, CalculationResponse};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Remote procedure that back-solves a selling price
#[async_trait]
pub trait PricingGateway: Send + Sync {
    /// Gateway name for logs
    fn name(&self) -> &'static str;

    /// Run the pricing calculation
    async fn calculate(&self, request: &CalculationRequest) -> Result<CalculationResponse>;
}

/// HTTP client for the hosted pricing function
pub struct HttpPricingGateway {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpPricingGateway {
    pub fn new(endpoint: Url, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PricingGateway for HttpPricingGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn calculate(&self, request: &CalculationRequest) -> Result<CalculationResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            "Calling pricing function for entry {} (request {})",
            request.pipeline_entry_id,
            request_id
        );

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("X-Request-Id", &request_id)
            .json(request);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key).header("apikey", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: serde_json::Value = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                AppError::Pricing(format!(
                    "Pricing function returned an unreadable body ({}): {}",
                    status, e
                ))
            })?
        };

        if let Some(message) = body.get("error").and_then(|e| e.as_str()) {
            return Err(AppError::Pricing(message.to_string()));
        }

        if !status.is_success() {
            return Err(AppError::Pricing(format!(
                "Pricing function returned {}",
                status
            )));
        }

        let result: CalculationResponse = serde_json::from_value(body).map_err(|e| {
            AppError::Pricing(format!("Pricing function returned an unexpected shape: {}", e))
        })?;
        tracing::info!(
            "Pricing function returned selling price {:.2} for entry {}",
            result.calculations.selling_price,
            request.pipeline_entry_id
        );

        Ok(result)
    }
}

/// Gateway used when no pricing endpoint is configured
pub struct UnconfiguredPricingGateway;

#[async_trait]
impl PricingGateway for UnconfiguredPricingGateway {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn calculate(&self, _request: &CalculationRequest) -> Result<CalculationResponse> {
        Err(AppError::Config(
            "Pricing function URL is not configured (set ROOFLINE_PRICING_URL)".to_string(),
        ))
    }
}

//! Stripe payment intent client.
//!
//! Talks to the Stripe REST API directly with form-encoded requests and
//! basic auth, the same wire format the official SDKs use.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use super::types::{Metadata, PaymentIntent};

/// Currency for every payment intent this service creates.
pub const CURRENCY: &str = "gbp";

/// Parameters for creating a payment intent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreatePaymentIntent {
    /// Amount in minor currency units (pence)
    pub amount: i64,
    /// Metadata forwarded verbatim to Stripe
    pub metadata: Metadata,
    /// Caller-supplied key that makes client retries safe
    pub idempotency_key: Option<String>,
}

/// Errors returned by a payment processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("stripe request timed out")]
    Timeout,

    #[error("stripe request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("stripe api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode stripe response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stripe response did not include a client secret")]
    MissingClientSecret,
}

impl From<reqwest::Error> for ProcessorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProcessorError::Timeout
        } else {
            ProcessorError::Http(e)
        }
    }
}

/// Something that can create payment intents.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError>;
}

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    /// Create a new client for the given API base URL.
    pub fn new(
        client: Client,
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into(),
            timeout,
        }
    }

    fn payment_intents_url(&self) -> String {
        format!("{}/v1/payment_intents", self.api_base)
    }
}

/// Build the form body for `POST /v1/payment_intents`.
///
/// Automatic payment methods are always enabled and the currency is fixed.
pub fn payment_intent_form(request: &CreatePaymentIntent) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount.to_string()),
        ("currency".to_string(), CURRENCY.to_string()),
        (
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ),
    ];

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }

    form
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError> {
        info!(
            amount = request.amount,
            currency = CURRENCY,
            metadata_keys = request.metadata.len(),
            has_idempotency_key = request.idempotency_key.is_some(),
            "stripe_payment_intent_create_starting"
        );

        let mut builder = self
            .client
            .post(self.payment_intents_url())
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(self.timeout)
            .form(&payment_intent_form(request));

        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, timeout = e.is_timeout(), "stripe_payment_intent_request_error");
            ProcessorError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| "Unknown Stripe error".to_string());

            error!(
                status_code = status.as_u16(),
                message = %message,
                "stripe_payment_intent_rejected"
            );

            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let intent: PaymentIntent = serde_json::from_str(&body)?;

        info!(
            payment_intent_id = %intent.id,
            amount = intent.amount,
            "stripe_payment_intent_created"
        );

        Ok(intent)
    }
}

//! HTTP endpoint handlers.
//!
//! Both API endpoints only accept POST (plus the CORS preflight on the
//! payment endpoint). Everything else gets a 405 before any external call
//! is made.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::crm::{forward_lead, GhlClient, LeadSink};
use crate::dedup::DeliveryLedger;
use crate::lead::LeadPayload;
use crate::stripe::{
    CreatePaymentIntent, Metadata, PaymentProcessor, ProcessorError, StripeClient, WebhookEvent,
};
use crate::web::signature::{construct_event, SIGNATURE_HEADER};
use crate::Config;

/// Header a caller can set to make payment intent creation retry-safe.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub lead_sink: Arc<dyn LeadSink>,
    /// Present when webhook deduplication is enabled
    pub deliveries: Option<DeliveryLedger>,
}

impl AppState {
    /// Assemble state from explicit collaborators.
    pub fn new(
        config: Config,
        processor: Arc<dyn PaymentProcessor>,
        lead_sink: Arc<dyn LeadSink>,
    ) -> Self {
        let deliveries = config.dedup_enabled.then(|| {
            DeliveryLedger::new(
                Duration::from_secs(config.dedup_ttl_secs),
                config.dedup_capacity,
            )
        });

        Self {
            config: Arc::new(config),
            processor,
            lead_sink,
            deliveries,
        }
    }

    /// Build state with the real Stripe and GHL clients.
    pub fn from_config(config: Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().pool_max_idle_per_host(16).build()?;

        let processor = StripeClient::new(
            client.clone(),
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
            config.processor_timeout(),
        );
        let lead_sink = GhlClient::new(
            client,
            config.ghl_webhook_url.clone(),
            config.crm_timeout(),
        );

        Ok(Self::new(config, Arc::new(processor), Arc::new(lead_sink)))
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Fallback for any method a route does not serve.
pub async fn method_not_allowed() -> Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Payment Intent
// =============================================================================

/// Payment intent request body.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    /// Amount in pence
    pub amount: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub client_secret: String,
}

/// CORS preflight for the payment endpoint.
pub async fn payment_preflight() -> StatusCode {
    StatusCode::OK
}

/// Payment intent endpoint.
///
/// Creates a GBP payment intent with automatic payment methods and returns
/// its client secret. Processor failures are logged in full but reported to
/// the caller as a generic 500.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, body_length = body.len(), "payment_request_invalid");
            return json_error(StatusCode::BAD_REQUEST, "Invalid payment request");
        }
    };

    if request.amount <= 0 {
        warn!(amount = request.amount, "payment_request_invalid_amount");
        return json_error(
            StatusCode::BAD_REQUEST,
            "amount must be a positive integer in minor units",
        );
    }

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    info!(
        amount = request.amount,
        metadata_keys = request.metadata.len(),
        has_idempotency_key = idempotency_key.is_some(),
        "payment_request_received"
    );

    let create = CreatePaymentIntent {
        amount: request.amount,
        metadata: request.metadata,
        idempotency_key,
    };

    let result = state
        .processor
        .create_payment_intent(&create)
        .await
        .and_then(|intent| {
            intent
                .client_secret
                .map(|secret| (intent.id, secret))
                .ok_or(ProcessorError::MissingClientSecret)
        });

    match result {
        Ok((payment_intent_id, client_secret)) => {
            info!(payment_intent_id = %payment_intent_id, "payment_intent_created");
            (
                StatusCode::OK,
                Json(PaymentResponse { client_secret }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, amount = create.amount, "payment_intent_failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment intent creation failed",
            )
        }
    }
}

// =============================================================================
// Stripe Webhook
// =============================================================================

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Stripe webhook endpoint.
///
/// This endpoint:
/// 1. Verifies the signature over the raw body
/// 2. Forwards a lead to GHL for `payment_intent.succeeded`
/// 3. Returns 200 for every verified event, whatever happened in step 2
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "stripe_webhook_received"
    );

    let event = match construct_event(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        state.config.signature_tolerance_secs,
    ) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "stripe_webhook_verification_failed");
            return (StatusCode::BAD_REQUEST, format!("Webhook Error: {}", e)).into_response();
        }
    };

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "stripe_webhook_verified"
    );

    if event.is_payment_succeeded() {
        handle_payment_succeeded(&state, &event).await;
    } else {
        info!(event_type = %event.event_type, "stripe_webhook_ignored");
    }

    (StatusCode::OK, Json(WebhookAck { received: true })).into_response()
}

/// Map a succeeded payment intent to a lead and forward it.
async fn handle_payment_succeeded(state: &AppState, event: &WebhookEvent) {
    let intent = match event.payment_intent() {
        Ok(intent) => intent,
        Err(e) => {
            error!(event_id = %event.id, error = %e, "stripe_webhook_payment_intent_invalid");
            return;
        }
    };

    info!(
        payment_intent_id = %intent.id,
        amount = intent.amount,
        "payment_succeeded"
    );

    // Held across the forward; dropping it unconfirmed frees the id again,
    // including when the request is cancelled mid-forward.
    let claim = match &state.deliveries {
        Some(ledger) => match ledger.claim(&intent.id) {
            Some(claim) => Some(claim),
            None => {
                info!(payment_intent_id = %intent.id, "payment_duplicate_skipped");
                return;
            }
        },
        None => None,
    };

    let lead = LeadPayload::from_payment_intent(&intent, Utc::now());

    match forward_lead(
        state.lead_sink.as_ref(),
        &lead,
        &state.config.forward_failure_policy,
    )
    .await
    {
        Ok(()) => {
            if let Some(claim) = claim {
                claim.confirm();
            }
        }
        Err(e) => {
            error!(
                payment_intent_id = %intent.id,
                error = %e,
                "crm_forward_dropped"
            );
        }
    }
}

//! Web server module.
//!
//! This module provides the HTTP surface of the service:
//! - `/api/payment`: payment intent creation for the landing page
//! - `/api/webhook`: signed Stripe events, forwarded to GHL
//! - `/health`: liveness probe

pub mod handlers;
pub mod router;
pub mod signature;

pub use handlers::{
    create_payment_intent, health, method_not_allowed, payment_preflight, stripe_webhook,
    AppState, ErrorResponse, HealthResponse, PaymentRequest, PaymentResponse, WebhookAck,
};
pub use router::{router, PAYMENT_PATH, WEBHOOK_PATH};
pub use signature::{compute_signature, construct_event, verify_signature, SignatureError};

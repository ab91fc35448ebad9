//! Lead Bridge - payment intents in, paid leads out.
//!
//! This library backs the `lead-bridge-web` binary, which exposes two
//! endpoints:
//! - `/api/payment`: creates a Stripe payment intent and hands the client
//!   secret back to the landing page
//! - `/api/webhook`: receives signed Stripe events and forwards paid leads
//!   to the GHL inbound webhook
//!
//! ## Flow
//!
//! ```text
//! Landing page → /api/payment → Stripe → client confirms payment
//! Stripe → payment_intent.succeeded → /api/webhook → LeadPayload → GHL
//! ```

pub mod config;
pub mod crm;
pub mod dedup;
pub mod lead;
pub mod stripe;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use crm::{ForwardError, ForwardFailurePolicy, GhlClient, LeadSink};
pub use dedup::DeliveryLedger;
pub use lead::LeadPayload;
pub use stripe::{
    CreatePaymentIntent, Metadata, PaymentIntent, PaymentProcessor, ProcessorError, StripeClient,
    WebhookEvent,
};
pub use web::{router, AppState};

//! Stripe integration.
//!
//! This module provides:
//! - The subset of Stripe objects this service reads (payment intents, events)
//! - A [`PaymentProcessor`] seam with a REST-backed [`StripeClient`]
//!
//! Webhook signature verification lives in `web::signature`, next to the
//! handler that enforces it.

pub mod client;
pub mod types;

pub use client::{CreatePaymentIntent, PaymentProcessor, ProcessorError, StripeClient, CURRENCY};
pub use types::{EventData, Metadata, PaymentIntent, WebhookEvent, PAYMENT_INTENT_SUCCEEDED};

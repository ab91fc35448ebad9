//! CRM forwarding.
//!
//! This module provides:
//! - The [`LeadSink`] seam and its GHL inbound webhook implementation
//! - The [`ForwardFailurePolicy`] that decides what happens when GHL is down
//!
//! Forwarding is best effort. A lead that cannot be delivered under the
//! configured policy is logged and dropped; the Stripe webhook is still
//! acknowledged.

pub mod client;
pub mod policy;

pub use client::{ForwardError, GhlClient, LeadSink};
pub use policy::{forward_lead, ForwardFailurePolicy};

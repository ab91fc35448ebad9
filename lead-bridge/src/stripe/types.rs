//! Stripe object types.
//!
//! Only the fields this service reads are modelled. Unknown fields are
//! ignored so new Stripe API versions do not break deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Event type that triggers lead forwarding.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Free-form string metadata attached to a payment intent.
pub type Metadata = BTreeMap<String, String>;

/// A Stripe payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent id (pi_...)
    pub id: String,
    /// Amount in minor currency units
    #[serde(default)]
    pub amount: i64,
    /// Metadata supplied when the intent was created
    #[serde(default)]
    pub metadata: Metadata,
    /// Secret the browser uses to confirm the payment
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// A Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event id (evt_...)
    #[serde(default)]
    pub id: String,
    /// Event type, e.g. `payment_intent.succeeded`
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// The object the event is about; its shape depends on the event type.
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn is_payment_succeeded(&self) -> bool {
        self.event_type == PAYMENT_INTENT_SUCCEEDED
    }

    /// Interpret the event object as a payment intent.
    pub fn payment_intent(&self) -> Result<PaymentIntent, serde_json::Error> {
        PaymentIntent::deserialize(&self.data.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserialization() {
        let json = r#"{
            "id": "evt_123",
            "object": "event",
            "type": "payment_intent.succeeded",
            "livemode": false,
            "data": {
                "object": {
                    "id": "pi_123",
                    "object": "payment_intent",
                    "amount": 9000,
                    "currency": "gbp",
                    "metadata": {"businessName": "Joe's Cafe", "budget": "90"}
                }
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert!(event.is_payment_succeeded());

        let intent = event.payment_intent().unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.amount, 9000);
        assert_eq!(intent.metadata.get("businessName").unwrap(), "Joe's Cafe");
        assert_eq!(intent.client_secret, None);
    }

    #[test]
    fn test_other_event_object_is_not_a_payment_intent() {
        let json = r#"{
            "id": "evt_456",
            "type": "charge.refunded",
            "data": {"object": {"object": "charge", "amount_refunded": 100}}
        }"#;

        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert!(!event.is_payment_succeeded());
        assert!(event.payment_intent().is_err());
    }
}

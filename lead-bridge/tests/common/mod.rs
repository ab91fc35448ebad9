//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{body::Body, http::Response, Router};
use serde_json::Value;

use leadbridge::web::compute_signature;
use leadbridge::{
    router, AppState, Config, CreatePaymentIntent, ForwardError, LeadPayload, LeadSink,
    PaymentIntent, PaymentProcessor, ProcessorError,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Records every request and echoes the metadata back, as Stripe does.
#[derive(Default)]
pub struct MockProcessor {
    pub requests: Mutex<Vec<CreatePaymentIntent>>,
    pub fail: bool,
    pub omit_client_secret: bool,
}

impl MockProcessor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Succeeds but returns an intent without a client secret.
    pub fn without_client_secret() -> Self {
        Self {
            omit_client_secret: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.fail {
            return Err(ProcessorError::Api {
                status: 402,
                message: "Your card was declined.".to_string(),
            });
        }

        Ok(PaymentIntent {
            id: "pi_test".to_string(),
            amount: request.amount,
            metadata: request.metadata.clone(),
            client_secret: (!self.omit_client_secret).then(|| "pi_test_secret_abc".to_string()),
        })
    }
}

/// Records every lead; optionally rejects each one with a status code.
#[derive(Default)]
pub struct MockSink {
    pub leads: Mutex<Vec<LeadPayload>>,
    pub reject_with: Option<u16>,
    /// When set, the next call never completes.
    pub stall_next: AtomicBool,
}

impl MockSink {
    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_with: Some(status),
            ..Default::default()
        }
    }

    /// Stalls on its first call, then accepts every lead.
    pub fn stalling_once() -> Self {
        Self {
            stall_next: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<LeadPayload> {
        self.leads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LeadSink for MockSink {
    async fn send_lead(&self, lead: &LeadPayload) -> Result<(), ForwardError> {
        self.leads.lock().unwrap().push(lead.clone());

        if self.stall_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        match self.reject_with {
            Some(status) => Err(ForwardError::Status {
                status,
                body: "rejected".to_string(),
            }),
            None => Ok(()),
        }
    }
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("GHL_WEBHOOK_URL", "https://ghl.invalid/hooks/lead"),
        ("CRM_RETRY_BACKOFF_MS", "1"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    Config::from_source(|name| vars.get(name).cloned()).unwrap()
}

pub fn app(config: Config, processor: Arc<MockProcessor>, sink: Arc<MockSink>) -> Router {
    router(AppState::new(config, processor, sink))
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// A `Stripe-Signature` header for `payload` signed right now.
pub fn signature_header(secret: &str, payload: &[u8]) -> String {
    let timestamp = now();
    format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload).unwrap()
    )
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

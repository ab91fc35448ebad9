//! GHL inbound webhook client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::lead::LeadPayload;

/// Errors from a single lead delivery attempt.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("crm request timed out")]
    Timeout,

    #[error("crm request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("crm responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ForwardError::Timeout
        } else {
            ForwardError::Http(e)
        }
    }
}

/// Destination for paid leads.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn send_lead(&self, lead: &LeadPayload) -> Result<(), ForwardError>;
}

/// Posts leads as JSON to a GHL inbound webhook URL.
#[derive(Clone)]
pub struct GhlClient {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl GhlClient {
    pub fn new(client: Client, url: Url, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

#[async_trait]
impl LeadSink for GhlClient {
    async fn send_lead(&self, lead: &LeadPayload) -> Result<(), ForwardError> {
        info!(
            stripe_payment_id = %lead.stripe_payment_id,
            host = self.url.host_str().unwrap_or(""),
            timeout_seconds = self.timeout.as_secs_f64(),
            "ghl_send_starting"
        );

        let response = match self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(lead)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(
                        stripe_payment_id = %lead.stripe_payment_id,
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "ghl_send_timeout"
                    );
                } else {
                    error!(
                        stripe_payment_id = %lead.stripe_payment_id,
                        error = %e,
                        "ghl_send_error"
                    );
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                stripe_payment_id = %lead.stripe_payment_id,
                status_code = status.as_u16(),
                body = %body,
                "ghl_send_rejected"
            );
            return Err(ForwardError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            stripe_payment_id = %lead.stripe_payment_id,
            status_code = status.as_u16(),
            "ghl_send_complete"
        );

        Ok(())
    }
}

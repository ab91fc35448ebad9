//! Forward failure policy.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use super::client::{ForwardError, LeadSink};
use crate::lead::LeadPayload;

/// What to do when a lead cannot be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardFailurePolicy {
    /// Log the failure and drop the lead.
    Log,
    /// Retry up to `attempts` more times, waiting `backoff * n` (saturating)
    /// before the n-th retry, then log and drop.
    Retry { attempts: u32, backoff: Duration },
}

impl ForwardFailurePolicy {
    /// Parse a policy name ("log" or "retry").
    pub fn parse(raw: &str, attempts: u32, backoff: Duration) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "log" => Some(ForwardFailurePolicy::Log),
            "retry" => Some(ForwardFailurePolicy::Retry { attempts, backoff }),
            _ => None,
        }
    }

    fn max_attempts(&self) -> u32 {
        match self {
            ForwardFailurePolicy::Log => 1,
            ForwardFailurePolicy::Retry { attempts, .. } => attempts.saturating_add(1),
        }
    }
}

/// Wait before retry number `attempt`, capped at `Duration::MAX`.
fn backoff_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(attempt)
}

/// Deliver a lead under the given policy.
///
/// Returns the last error when every permitted attempt failed. The caller
/// decides how to report that; it never affects the webhook response.
pub async fn forward_lead(
    sink: &dyn LeadSink,
    lead: &LeadPayload,
    policy: &ForwardFailurePolicy,
) -> Result<(), ForwardError> {
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match sink.send_lead(lead).await {
            Ok(()) => {
                info!(
                    stripe_payment_id = %lead.stripe_payment_id,
                    attempt = attempt,
                    "crm_forward_succeeded"
                );
                return Ok(());
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    stripe_payment_id = %lead.stripe_payment_id,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "crm_forward_attempt_failed"
                );

                if let ForwardFailurePolicy::Retry { backoff, .. } = policy {
                    sleep(backoff_delay(*backoff, attempt)).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::PaymentIntent;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LeadSink for FlakySink {
        async fn send_lead(&self, _lead: &LeadPayload) -> Result<(), ForwardError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ForwardError::Status {
                    status: 503,
                    body: String::new(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn sink(failures: u32) -> FlakySink {
        FlakySink {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    fn lead() -> LeadPayload {
        let intent = PaymentIntent {
            id: "pi_1".to_string(),
            amount: 100,
            metadata: Default::default(),
            client_secret: None,
        };
        LeadPayload::from_payment_intent(&intent, Utc::now())
    }

    fn retry(attempts: u32) -> ForwardFailurePolicy {
        ForwardFailurePolicy::Retry {
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_parse() {
        let backoff = Duration::from_millis(5);
        assert_eq!(
            ForwardFailurePolicy::parse("LOG", 2, backoff),
            Some(ForwardFailurePolicy::Log)
        );
        assert_eq!(
            ForwardFailurePolicy::parse(" retry ", 2, backoff),
            Some(ForwardFailurePolicy::Retry {
                attempts: 2,
                backoff
            })
        );
        assert_eq!(ForwardFailurePolicy::parse("queue", 2, backoff), None);
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(
            backoff_delay(Duration::from_millis(500), 3),
            Duration::from_millis(1500)
        );
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
        assert_eq!(
            backoff_delay(Duration::from_millis(u64::MAX), u32::MAX),
            Duration::MAX
        );
    }

    #[tokio::test]
    async fn test_log_policy_makes_one_attempt() {
        let sink = sink(1);
        let result = forward_lead(&sink, &lead(), &ForwardFailurePolicy::Log).await;

        assert!(matches!(result, Err(ForwardError::Status { status: 503, .. })));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_policy_recovers() {
        let sink = sink(2);
        forward_lead(&sink, &lead(), &retry(2)).await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_policy_gives_up() {
        let sink = sink(10);
        let result = forward_lead(&sink, &lead(), &retry(2)).await;

        assert!(result.is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }
}

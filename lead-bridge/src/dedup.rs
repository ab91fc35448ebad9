//! Delivery deduplication for webhook redeliveries.
//!
//! Stripe may deliver the same event more than once. The ledger remembers
//! which payment intents have already been forwarded so GHL sees each paid
//! lead once. Entries expire after a TTL and the ledger never holds more
//! than `capacity` ids; when full, the oldest id is evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

/// Bounded, expiring set of processed payment intent ids.
#[derive(Clone)]
pub struct DeliveryLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Instant>>,
}

/// An id claimed for forwarding.
///
/// Dropping the claim without calling [`DeliveryClaim::confirm`] releases the
/// id, so a redelivery can forward it again. This covers failed forwards and
/// requests cancelled mid-forward alike.
#[must_use = "dropping a claim releases it"]
pub struct DeliveryClaim {
    ledger: DeliveryLedger,
    id: String,
    confirmed: bool,
}

impl DeliveryClaim {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keep the id in the ledger until it expires.
    pub fn confirm(mut self) {
        self.confirmed = true;
    }
}

impl Drop for DeliveryClaim {
    fn drop(&mut self) {
        if !self.confirmed {
            debug!(id = %self.id, "delivery_claim_released");
            self.ledger.release(&self.id);
        }
    }
}

impl DeliveryLedger {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                ttl,
                capacity: capacity.max(1),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    // Critical sections never await, and a panic mid-update leaves the map usable.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim an id for forwarding.
    ///
    /// Returns `None` if the id was claimed within the TTL.
    pub fn claim(&self, id: &str) -> Option<DeliveryClaim> {
        self.claim_at(id, Instant::now())
    }

    fn claim_at(&self, id: &str, now: Instant) -> Option<DeliveryClaim> {
        let mut entries = self.entries();

        if let Some(claimed_at) = entries.get(id) {
            if now.saturating_duration_since(*claimed_at) < self.inner.ttl {
                return None;
            }
        }

        let ttl = self.inner.ttl;
        entries.retain(|_, claimed_at| now.saturating_duration_since(*claimed_at) < ttl);

        if entries.len() >= self.inner.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, claimed_at)| **claimed_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(evicted = %oldest, "delivery_ledger_evicted");
                entries.remove(&oldest);
            }
        }

        entries.insert(id.to_string(), now);

        Some(DeliveryClaim {
            ledger: self.clone(),
            id: id.to_string(),
            confirmed: false,
        })
    }

    /// Forget an id so a later redelivery can forward it again.
    pub fn release(&self, id: &str) {
        self.entries().remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_claim_rejected() {
        let ledger = DeliveryLedger::new(Duration::from_secs(60), 10);

        let first = ledger.claim("pi_1").unwrap();
        assert!(ledger.claim("pi_1").is_none());
        ledger.claim("pi_2").unwrap().confirm();
        assert_eq!(ledger.len(), 2);

        first.confirm();
        assert!(ledger.claim("pi_1").is_none());
    }

    #[test]
    fn test_release_allows_reclaim() {
        let ledger = DeliveryLedger::new(Duration::from_secs(60), 10);

        ledger.claim("pi_1").unwrap().confirm();
        ledger.release("pi_1");
        assert!(ledger.claim("pi_1").is_some());
    }

    #[test]
    fn test_unconfirmed_claim_released_on_drop() {
        let ledger = DeliveryLedger::new(Duration::from_secs(60), 10);

        let claim = ledger.claim("pi_1").unwrap();
        assert_eq!(claim.id(), "pi_1");
        assert!(ledger.claim("pi_1").is_none());

        drop(claim);
        assert!(ledger.is_empty());
        assert!(ledger.claim("pi_1").is_some());
    }

    #[test]
    fn test_expired_claim_can_be_reclaimed() {
        let ledger = DeliveryLedger::new(Duration::from_secs(60), 10);
        let start = Instant::now();

        ledger.claim_at("pi_1", start).unwrap().confirm();
        assert!(ledger
            .claim_at("pi_1", start + Duration::from_secs(59))
            .is_none());
        assert!(ledger
            .claim_at("pi_1", start + Duration::from_secs(61))
            .is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let ledger = DeliveryLedger::new(Duration::from_secs(60), 2);
        let start = Instant::now();

        ledger.claim_at("pi_1", start).unwrap().confirm();
        ledger
            .claim_at("pi_2", start + Duration::from_secs(1))
            .unwrap()
            .confirm();
        ledger
            .claim_at("pi_3", start + Duration::from_secs(2))
            .unwrap()
            .confirm();

        assert_eq!(ledger.len(), 2);
        // pi_1 was evicted, so it is claimable again
        ledger
            .claim_at("pi_1", start + Duration::from_secs(3))
            .unwrap()
            .confirm();
        assert!(ledger
            .claim_at("pi_3", start + Duration::from_secs(4))
            .is_none());
    }
}

//! Correlation store — pending escalations keyed by operator-channel message id.
//!
//! The only mutable shared state in the core. A guest question that could not
//! be answered is posted to the operator chat; the resulting message id
//! becomes the key under which the guest is remembered until the operator
//! replies. `take` is an atomic lookup+remove: under concurrent replies to
//! the same escalation, exactly one caller gets the guest back.
//!
//! The store is bounded two ways (the original kept it unbounded for the
//! life of the process): entries older than the TTL are evicted, and when the
//! capacity is reached the oldest entry is dropped first. Eviction runs on
//! `put`; an abandoned escalation quietly ages out.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::router::{ChatId, UserId};

/// Message id of the escalation as posted to the operator chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(pub i64);

impl std::fmt::Display for EscalationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The guest who asked: their user id and the chat the answer goes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user: UserId,
    pub chat: ChatId,
}

/// One escalated question awaiting an operator reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEscalation {
    pub requester: Requester,
    pub created_at: DateTime<Utc>,
}

impl PendingEscalation {
    pub fn new(requester: Requester) -> Self {
        Self {
            requester,
            created_at: Utc::now(),
        }
    }
}

/// Default bound on simultaneously pending escalations.
pub const DEFAULT_CAPACITY: usize = 256;
/// Default time-to-live for an unanswered escalation.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Mutex-guarded map from escalation id to pending escalation.
///
/// All methods are synchronous; the lock is never held across an await.
pub struct CorrelationStore {
    inner: Mutex<HashMap<i64, PendingEscalation>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::hours(DEFAULT_TTL_HOURS))
    }
}

impl CorrelationStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Record a pending escalation. A key collision overwrites (last write
    /// wins) and is logged, and the displaced entry is returned so the caller
    /// can observe it.
    pub fn put(&self, id: EscalationId, pending: PendingEscalation) -> Option<PendingEscalation> {
        let mut map = self.inner.lock().expect("correlation store poisoned");
        Self::evict(&mut map, self.capacity, self.ttl);
        let previous = map.insert(id.0, pending);
        if let Some(ref prev) = previous {
            warn!(
                escalation = %id,
                requester = %prev.requester.user,
                "Escalation id collision; previous pending entry overwritten"
            );
        }
        previous
    }

    /// Atomically look up and remove. The second `take` on the same id
    /// observes absence, regardless of interleaving.
    pub fn take(&self, id: EscalationId) -> Option<PendingEscalation> {
        let mut map = self.inner.lock().expect("correlation store poisoned");
        map.remove(&id.0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("correlation store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, then the oldest entries down to capacity.
    fn evict(map: &mut HashMap<i64, PendingEscalation>, capacity: usize, ttl: Duration) {
        let cutoff = Utc::now() - ttl;
        let expired: Vec<i64> = map
            .iter()
            .filter(|(_, p)| p.created_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            warn!(escalation = id, "Pending escalation expired unanswered");
            map.remove(&id);
        }

        while map.len() >= capacity {
            let oldest = map
                .iter()
                .min_by_key(|(_, p)| p.created_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    warn!(escalation = id, "Correlation store full; dropping oldest entry");
                    map.remove(&id);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requester(user: i64) -> Requester {
        Requester {
            user: UserId(user),
            chat: ChatId(user),
        }
    }

    #[test]
    fn put_then_take_returns_exact_requester() {
        let store = CorrelationStore::default();
        store.put(EscalationId(501), PendingEscalation::new(requester(42)));
        let taken = store.take(EscalationId(501)).expect("entry present");
        assert_eq!(taken.requester.user, UserId(42));
        assert!(store.is_empty());
    }

    #[test]
    fn second_take_observes_absence() {
        let store = CorrelationStore::default();
        store.put(EscalationId(501), PendingEscalation::new(requester(42)));
        assert!(store.take(EscalationId(501)).is_some());
        assert!(store.take(EscalationId(501)).is_none());
    }

    #[test]
    fn take_of_unknown_id_is_none() {
        let store = CorrelationStore::default();
        assert!(store.take(EscalationId(999)).is_none());
    }

    #[test]
    fn collision_overwrites_and_returns_previous() {
        let store = CorrelationStore::default();
        store.put(EscalationId(7), PendingEscalation::new(requester(1)));
        let previous = store.put(EscalationId(7), PendingEscalation::new(requester(2)));
        assert_eq!(previous.unwrap().requester.user, UserId(1));
        assert_eq!(store.take(EscalationId(7)).unwrap().requester.user, UserId(2));
    }

    #[test]
    fn expired_entries_are_evicted_on_put() {
        let store = CorrelationStore::new(64, Duration::hours(1));
        let stale = PendingEscalation {
            requester: requester(1),
            created_at: Utc::now() - Duration::hours(2),
        };
        store.put(EscalationId(1), stale);
        assert_eq!(store.len(), 1);
        store.put(EscalationId(2), PendingEscalation::new(requester(2)));
        assert!(store.take(EscalationId(1)).is_none());
        assert!(store.take(EscalationId(2)).is_some());
    }

    #[test]
    fn capacity_bound_drops_oldest_first() {
        let store = CorrelationStore::new(2, Duration::hours(24));
        let old = PendingEscalation {
            requester: requester(1),
            created_at: Utc::now() - Duration::minutes(30),
        };
        store.put(EscalationId(1), old);
        store.put(EscalationId(2), PendingEscalation::new(requester(2)));
        store.put(EscalationId(3), PendingEscalation::new(requester(3)));
        assert!(store.take(EscalationId(1)).is_none());
        assert!(store.take(EscalationId(2)).is_some());
        assert!(store.take(EscalationId(3)).is_some());
    }

    #[test]
    fn concurrent_takes_deliver_exactly_once() {
        use std::sync::Arc;

        let store = Arc::new(CorrelationStore::default());
        store.put(EscalationId(501), PendingEscalation::new(requester(42)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.take(EscalationId(501)).is_some())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }
}

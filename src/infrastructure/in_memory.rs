use crate::domain::negotiation::{NegotiationId, PendingNegotiation};
use crate::domain::ports::{ClockRef, NegotiationStore};
use crate::error::{NegotiationError, Result};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
enum Slot {
    /// A start is in flight for this id.
    Reserved { since: Instant },
    Pending(Box<PendingNegotiation>),
}

impl Slot {
    fn since(&self) -> Instant {
        match self {
            Slot::Reserved { since } => *since,
            Slot::Pending(pending) => pending.created_at,
        }
    }
}

/// A thread-safe in-memory store for negotiations waiting on consent.
///
/// Uses `Arc<RwLock<HashMap<NegotiationId, _>>>` so clones share state. Entries
/// older than the retention window are treated as gone on every access and
/// physically removed by [`NegotiationStore::evict_expired`]. Nothing survives a
/// restart.
#[derive(Clone)]
pub struct InMemoryNegotiationStore {
    slots: Arc<RwLock<HashMap<NegotiationId, Slot>>>,
    retention: Duration,
    clock: ClockRef,
}

impl InMemoryNegotiationStore {
    /// Creates an empty store using the system clock.
    pub fn new(retention: Duration) -> Self {
        Self::with_clock(retention, Arc::new(SystemClock))
    }

    pub fn with_clock(retention: Duration, clock: ClockRef) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            retention,
            clock,
        }
    }

    /// Slots physically held, including reservations and expired entries not
    /// yet swept.
    pub async fn held(&self) -> usize {
        self.slots.read().await.len()
    }

    fn is_live(&self, since: Instant, now: Instant) -> bool {
        now.saturating_duration_since(since) <= self.retention
    }
}

#[async_trait]
impl NegotiationStore for InMemoryNegotiationStore {
    async fn reserve(&self, id: &NegotiationId) -> Result<()> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        if slots.get(id).is_some_and(|slot| self.is_live(slot.since(), now)) {
            return Err(NegotiationError::DuplicateNegotiation(id.clone()));
        }
        slots.insert(id.clone(), Slot::Reserved { since: now });
        debug!(negotiation = %id, "reserved negotiation id");
        Ok(())
    }

    async fn release(&self, id: &NegotiationId) -> Result<()> {
        let mut slots = self.slots.write().await;
        if matches!(slots.get(id), Some(Slot::Reserved { .. })) {
            slots.remove(id);
            debug!(negotiation = %id, "released reservation");
        }
        Ok(())
    }

    async fn put(&self, pending: PendingNegotiation) -> Result<()> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        if let Some(Slot::Pending(existing)) = slots.get(&pending.id)
            && self.is_live(existing.created_at, now)
        {
            return Err(NegotiationError::DuplicateNegotiation(pending.id));
        }
        debug!(negotiation = %pending.id, "stored pending negotiation");
        slots.insert(pending.id.clone(), Slot::Pending(Box::new(pending)));
        Ok(())
    }

    async fn take(&self, id: &NegotiationId) -> Result<PendingNegotiation> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        match slots.remove(id) {
            Some(Slot::Pending(pending)) if self.is_live(pending.created_at, now) => {
                debug!(negotiation = %id, "took pending negotiation");
                Ok(*pending)
            }
            Some(reserved @ Slot::Reserved { .. }) => {
                // A start is still running; it is not resumable yet.
                slots.insert(id.clone(), reserved);
                Err(NegotiationError::NegotiationNotFound(id.clone()))
            }
            Some(Slot::Pending(_)) => {
                debug!(negotiation = %id, "dropped expired negotiation on take");
                Err(NegotiationError::NegotiationNotFound(id.clone()))
            }
            None => Err(NegotiationError::NegotiationNotFound(id.clone())),
        }
    }

    async fn peek(&self, id: &NegotiationId) -> Result<Option<PendingNegotiation>> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        Ok(match slots.get(id) {
            Some(Slot::Pending(pending)) if self.is_live(pending.created_at, now) => {
                Some(pending.as_ref().clone())
            }
            _ => None,
        })
    }

    async fn evict_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| self.is_live(slot.since(), now));
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired negotiations");
        }
        Ok(evicted)
    }

    async fn len(&self) -> Result<usize> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        Ok(slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)) && self.is_live(slot.since(), now))
            .count())
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }
}

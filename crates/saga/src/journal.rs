//! Append-only record of saga events.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use tokio::sync::RwLock;

use crate::error::SagaError;
use crate::events::SagaEvent;

/// Default number of sagas an in-memory journal keeps.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

/// Storage for saga events, one ordered log per saga.
#[async_trait]
pub trait SagaJournal: Send + Sync {
    async fn append(&self, saga_id: SagaId, event: &SagaEvent) -> Result<(), SagaError>;

    /// Returns the saga's events in append order; empty if unknown.
    async fn load(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>, SagaError>;
}

#[derive(Default)]
struct Logs {
    by_saga: HashMap<SagaId, Vec<SagaEvent>>,
    // start order, oldest first
    order: VecDeque<SagaId>,
}

impl Logs {
    fn is_finished(&self, saga_id: &SagaId) -> bool {
        self.by_saga
            .get(saga_id)
            .and_then(|events| events.last())
            .is_some_and(|event| {
                matches!(
                    event,
                    SagaEvent::SagaCompleted(_)
                        | SagaEvent::SagaFailed(_)
                        | SagaEvent::ReconciliationRequired(_)
                )
            })
    }

    /// Drops the oldest finished sagas until at most `capacity` remain.
    /// Sagas still in flight are never evicted.
    fn evict(&mut self, capacity: usize) {
        while self.by_saga.len() > capacity {
            let Some(index) = self.order.iter().position(|id| self.is_finished(id)) else {
                return;
            };
            if let Some(saga_id) = self.order.remove(index) {
                self.by_saga.remove(&saga_id);
                tracing::debug!(%saga_id, "evicted finished saga from journal");
            }
        }
    }
}

/// In-memory journal bounded to a number of sagas.
///
/// Once full, starting a saga evicts the oldest finished one, after which
/// it can no longer be looked up.
#[derive(Clone)]
pub struct InMemorySagaJournal {
    logs: Arc<RwLock<Logs>>,
    capacity: usize,
}

impl InMemorySagaJournal {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            logs: Arc::default(),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemorySagaJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SagaJournal for InMemorySagaJournal {
    async fn append(&self, saga_id: SagaId, event: &SagaEvent) -> Result<(), SagaError> {
        let mut logs = self.logs.write().await;
        if let SagaEvent::SagaStarted(_) = event {
            if logs.by_saga.contains_key(&saga_id) {
                return Err(SagaError::Journal(format!("saga {saga_id} already started")));
            }
            logs.by_saga.insert(saga_id, vec![event.clone()]);
            logs.order.push_back(saga_id);
            logs.evict(self.capacity);
        } else {
            let Some(events) = logs.by_saga.get_mut(&saga_id) else {
                return Err(SagaError::Journal(format!(
                    "{} for unknown saga {saga_id}",
                    event.event_type()
                )));
            };
            events.push(event.clone());
        }
        metrics::gauge!("saga_journal_sagas").set(logs.by_saga.len() as f64);
        Ok(())
    }

    async fn load(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>, SagaError> {
        Ok(self
            .logs
            .read()
            .await
            .by_saga
            .get(&saga_id)
            .cloned()
            .unwrap_or_default())
    }
}

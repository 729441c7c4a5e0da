//! Inconsistencies the saga detected but could not repair.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{SagaId, TripId, VehicleId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A vehicle whose status may disagree with its trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub saga_id: SagaId,
    pub vehicle_id: VehicleId,
    pub trip_id: Option<TripId>,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

/// In-memory queue of pending reconciliation items, oldest first.
#[derive(Clone, Default)]
pub struct ReconciliationQueue {
    items: Arc<RwLock<Vec<ReconciliationItem>>>,
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, item: ReconciliationItem) {
        self.items.write().await.push(item);
    }

    pub async fn pending(&self) -> Vec<ReconciliationItem> {
        self.items.read().await.clone()
    }

    /// Removes and returns the item recorded for `saga_id`.
    pub async fn resolve(&self, saga_id: SagaId) -> Option<ReconciliationItem> {
        let mut items = self.items.write().await;
        let index = items.iter().position(|item| item.saga_id == saga_id)?;
        Some(items.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(vehicle: &str) -> ReconciliationItem {
        ReconciliationItem {
            saga_id: SagaId::new(),
            vehicle_id: VehicleId::new(vehicle),
            trip_id: None,
            reason: "unlock failed".to_string(),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn push_and_resolve() {
        let queue = ReconciliationQueue::new();
        let first = item("v1");
        let second = item("v2");
        queue.push(first.clone()).await;
        queue.push(second.clone()).await;
        assert_eq!(queue.pending().await.len(), 2);

        assert_eq!(queue.resolve(first.saga_id).await, Some(first));
        assert_eq!(queue.pending().await, vec![second]);
        assert!(queue.resolve(SagaId::new()).await.is_none());
    }
}

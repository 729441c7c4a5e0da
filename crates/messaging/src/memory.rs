use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{
    BusError, Result,
    bus::{Acknowledger, Delivery, DeliveryStream, Message, Publisher, Subscriber},
};

/// Default number of messages an in-memory topic retains for replay.
pub const DEFAULT_RETENTION: usize = 10_000;

#[derive(Default)]
struct TopicState {
    log: VecDeque<Message>,
    groups: HashMap<String, mpsc::UnboundedSender<Message>>,
}

/// Single-process bus for tests and local runs.
///
/// Each consumer group gets its own queue, so every group sees every message.
/// A new group first receives the topic's retained history, like a broker
/// consumer starting from the earliest offset. Unacknowledged deliveries go
/// back to the end of their group's queue.
///
/// Each topic retains at most `retention` messages; older ones are dropped
/// from the replay history as new ones arrive.
#[derive(Clone)]
pub struct InMemoryBus {
    topics: Arc<RwLock<HashMap<String, TopicState>>>,
    retention: usize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            topics: Arc::default(),
            retention,
        }
    }

    /// Returns the retained messages of `topic`, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<Message> {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|t| t.log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of live consumer groups on `topic`.
    pub async fn group_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|t| t.groups.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()> {
        let message = Message {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
        };

        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();
        state
            .groups
            .retain(|_, tx| tx.send(message.clone()).is_ok());
        if self.retention > 0 {
            if state.log.len() == self.retention {
                state.log.pop_front();
            }
            state.log.push_back(message);
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBus {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<DeliveryStream> {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();
        if state.groups.get(group).is_some_and(|tx| !tx.is_closed()) {
            return Err(BusError::Subscribe {
                topic: topic.to_string(),
                reason: format!("group {group} is already subscribed"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for message in &state.log {
            // rx is alive, send cannot fail here
            let _ = tx.send(message.clone());
        }
        let weak = tx.downgrade();
        state.groups.insert(group.to_string(), tx);
        tracing::debug!(topic, group, backlog = state.log.len(), "subscribed");

        let stream = futures_util::stream::unfold((rx, weak), |(mut rx, weak)| async move {
            let message = rx.recv().await?;
            let acker = MemoryAck {
                queue: weak.clone(),
                message: message.clone(),
            };
            Some((Ok(Delivery::new(message, Box::new(acker))), (rx, weak)))
        });
        Ok(Box::pin(stream))
    }
}

struct MemoryAck {
    queue: mpsc::WeakUnboundedSender<Message>,
    message: Message,
}

impl Acknowledger for MemoryAck {
    fn ack(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn requeue(self: Box<Self>) {
        if let Some(queue) = self.queue.upgrade() {
            let _ = queue.send(self.message);
        }
    }
}

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::Result;

/// A message as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Backend hook that settles a delivery.
pub trait Acknowledger: Send {
    /// Marks the message as processed for this consumer group.
    fn ack(self: Box<Self>) -> Result<()>;

    /// Gives the message back to the bus without processing it.
    fn requeue(self: Box<Self>);
}

/// A received message that must be acknowledged.
///
/// Dropping a delivery without calling [`Delivery::ack`] requeues it, so a
/// consumer that stops mid-message never loses it.
pub struct Delivery {
    message: Message,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    pub fn new(message: Message, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            message,
            acker: Some(acker),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    /// Acknowledges the delivery.
    pub fn ack(mut self) -> Result<()> {
        match self.acker.take() {
            Some(acker) => acker.ack(),
            None => Ok(()),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            acker.requeue();
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

/// A stream of deliveries for one subscription.
///
/// An `Err` item means the subscription itself broke; the stream should not
/// be polled further.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Publishing side of the bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()>;
}

/// Consuming side of the bus.
///
/// Every distinct `group` receives every message on the topic.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<DeliveryStream>;
}

/// Serializes `value` as JSON and publishes it.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn Publisher,
    topic: &str,
    key: Option<&str>,
    value: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    publisher.publish(topic, key, &payload).await
}

/// Builds a per-process consumer group name, `<service>-<random suffix>`.
///
/// Each process instance gets its own group so that restarts never attach to
/// a subscription left behind by a previous instance.
pub fn consumer_group(service: &str) -> String {
    format!("{service}-{}", uuid::Uuid::new_v4().simple())
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::Message as _;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::{
    BusError, Result,
    bus::{Acknowledger, Delivery, DeliveryStream, Message, Publisher, Subscriber},
};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka-backed bus.
///
/// Offsets are stored only when a delivery is acknowledged and committed by
/// the client's periodic auto-commit.
#[derive(Clone)]
pub struct KafkaBus {
    brokers: String,
    producer: FutureProducer,
}

impl KafkaBus {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        Ok(Self {
            brokers: brokers.to_string(),
            producer,
        })
    }
}

#[async_trait]
impl Publisher for KafkaBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()> {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok(_) => Ok(()),
            Err((e, _msg)) => {
                tracing::error!(topic, error = %e, "failed to publish message");
                Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl Subscriber for KafkaBus {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<DeliveryStream> {
        let subscribe_err = |reason: String| BusError::Subscribe {
            topic: topic.to_string(),
            reason,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| subscribe_err(e.to_string()))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| subscribe_err(e.to_string()))?;
        tracing::info!(topic, group, "kafka consumer subscribed");

        let topic = topic.to_string();
        let consumer = Arc::new(consumer);
        let stream = futures_util::stream::unfold(consumer, move |consumer| {
            let topic = topic.clone();
            async move {
                let next = match consumer.recv().await {
                    Ok(borrowed) => {
                        let owned = borrowed.detach();
                        let message = Message {
                            topic: owned.topic().to_string(),
                            key: owned.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                            payload: owned.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        };
                        let acker = KafkaAck {
                            consumer: Arc::clone(&consumer),
                            topic: message.topic.clone(),
                            partition: owned.partition(),
                            offset: owned.offset(),
                        };
                        Ok(Delivery::new(message, Box::new(acker)))
                    }
                    Err(e) => Err(BusError::Subscribe {
                        topic,
                        reason: e.to_string(),
                    }),
                };
                Some((next, consumer))
            }
        });
        Ok(Box::pin(stream))
    }
}

struct KafkaAck {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl Acknowledger for KafkaAck {
    fn ack(self: Box<Self>) -> Result<()> {
        self.consumer
            .store_offset(&self.topic, self.partition, self.offset + 1)
            .map_err(|e| BusError::Ack(e.to_string()))
    }

    fn requeue(self: Box<Self>) {
        // The offset stays unstored; the message comes back after a restart
        // or rebalance.
        tracing::warn!(
            topic = %self.topic,
            partition = self.partition,
            offset = self.offset,
            "delivery dropped without ack"
        );
    }
}

//! Parking space for messages that could not be decoded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use messaging::{Message, Publisher, publish_json};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;

/// Topic that receives the dead letters of `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}.dead-letter")
}

/// A message set aside instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub key: Option<String>,
    /// Original payload, lossily decoded as UTF-8.
    pub payload: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_message(message: &Message, reason: impl Into<String>) -> Self {
        Self {
            source_topic: message.topic.clone(),
            key: message.key.clone(),
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter) -> Result<()>;
}

/// Keeps dead letters in memory.
#[derive(Clone, Default)]
pub struct InMemoryDeadLetters {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        self.letters.write().await.push(letter);
        Ok(())
    }
}

/// Publishes dead letters as JSON to `<source topic>.dead-letter`.
#[derive(Clone)]
pub struct PublisherDeadLetters {
    publisher: Arc<dyn Publisher>,
}

impl PublisherDeadLetters {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl DeadLetterSink for PublisherDeadLetters {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        let topic = dead_letter_topic(&letter.source_topic);
        publish_json(
            self.publisher.as_ref(),
            &topic,
            letter.key.as_deref(),
            &letter,
        )
        .await?;
        Ok(())
    }
}

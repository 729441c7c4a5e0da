//! Long-lived telemetry consumer task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::TelemetryEvent;
use futures_util::StreamExt;
use messaging::{Delivery, Subscriber};

use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::dedupe::{DEFAULT_DEDUPE_WINDOW, Deduplicator};
use crate::handler::{HandleOutcome, TelemetryHandler};
use crate::shutdown::Shutdown;
use crate::{Result, TelemetryError};

/// Per-consumer counters.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    applied: AtomicU64,
    duplicates: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub applied: u64,
    pub duplicates: u64,
    pub stale: u64,
    pub rejected: u64,
    pub dead_lettered: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Number of deliveries settled so far.
    pub fn total(&self) -> u64 {
        self.applied + self.duplicates + self.stale + self.rejected + self.dead_lettered
    }
}

/// Consumes one topic under one consumer group and feeds a handler.
///
/// Every delivery is acknowledged once its outcome is known: applied,
/// duplicate, stale, rejected by the store, or dead-lettered. Only a failed
/// subscription stops the loop with an error.
pub struct TelemetryConsumer<H: TelemetryHandler> {
    subscriber: Arc<dyn Subscriber>,
    topic: String,
    group: String,
    handler: H,
    dead_letters: Arc<dyn DeadLetterSink>,
    dedupe_window: usize,
    stats: Arc<ConsumerStats>,
}

impl<H: TelemetryHandler> TelemetryConsumer<H> {
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: H,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            subscriber,
            topic: topic.into(),
            group: group.into(),
            handler,
            dead_letters,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            stats: Arc::default(),
        }
    }

    /// Overrides the number of event IDs remembered for deduplication.
    pub fn with_dedupe_window(mut self, window: usize) -> Self {
        self.dedupe_window = window;
        self
    }

    /// Shared handle to this consumer's counters.
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until `shutdown` fires or the subscription fails.
    #[tracing::instrument(skip_all, fields(topic = %self.topic, group = %self.group, handler = self.handler.name()))]
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let mut stream = self.subscriber.subscribe(&self.topic, &self.group).await?;
        let mut dedupe = Deduplicator::new(self.dedupe_window);
        tracing::info!("telemetry consumer started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(stats = ?self.stats.snapshot(), "telemetry consumer stopped");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "telemetry subscription failed");
                        return Err(e.into());
                    }
                    None => {
                        tracing::error!("telemetry subscription ended");
                        return Err(TelemetryError::StreamEnded(self.topic.clone()));
                    }
                },
            };

            self.process(delivery, &mut dedupe).await;
        }
    }

    async fn process(&self, delivery: Delivery, dedupe: &mut Deduplicator) {
        let event: TelemetryEvent = match serde_json::from_slice(delivery.payload()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable telemetry payload");
                let letter = DeadLetter::from_message(delivery.message(), e.to_string());
                if let Err(e) = self.dead_letters.send(letter).await {
                    tracing::error!(error = %e, "failed to dead-letter payload");
                }
                self.count(&self.stats.dead_lettered, "dead_lettered");
                settle(delivery);
                return;
            }
        };

        if dedupe.contains(&event.event_id) {
            tracing::debug!(event_id = %event.event_id, "duplicate event skipped");
            self.count(&self.stats.duplicates, "duplicate");
            settle(delivery);
            return;
        }

        match self.handler.handle(&event).await {
            Ok(outcome) => {
                dedupe.remember(event.event_id);
                let counter = match outcome {
                    HandleOutcome::Applied => &self.stats.applied,
                    HandleOutcome::Duplicate => &self.stats.duplicates,
                    HandleOutcome::Stale => &self.stats.stale,
                };
                self.count(counter, outcome.as_str());
                tracing::debug!(
                    event_id = %event.event_id,
                    trip_id = %event.trip_id,
                    vehicle_id = %event.vehicle_id,
                    outcome = outcome.as_str(),
                    "telemetry event handled"
                );
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    trip_id = %event.trip_id,
                    vehicle_id = %event.vehicle_id,
                    error = %e,
                    "telemetry event rejected"
                );
                self.count(&self.stats.rejected, "rejected");
            }
        }
        settle(delivery);
    }

    fn count(&self, counter: &AtomicU64, outcome: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "telemetry_events_total",
            "consumer" => self.handler.name(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

fn settle(delivery: Delivery) {
    if let Err(e) = delivery.ack() {
        tracing::warn!(error = %e, "failed to acknowledge delivery");
    }
}

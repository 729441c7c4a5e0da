//! Saga instance rebuilt from its journal.

use chrono::{DateTime, Utc};
use common::{SagaId, TripId, VehicleId};
use serde::{Deserialize, Serialize};

use crate::events::{SagaEvent, StepCompletedData, StepFailedData};
use crate::state::SagaState;
use crate::trip_lifecycle::SagaKind;

/// One execution of a trip saga.
///
/// Every field is derived from the applied events, which are kept in order
/// so the instance doubles as its own audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<SagaId>,
    kind: Option<SagaKind>,
    subject: String,
    state: SagaState,
    current_step: usize,
    completed_steps: Vec<String>,
    compensated_steps: Vec<String>,
    vehicle_id: Option<VehicleId>,
    trip_id: Option<TripId>,
    failure_reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    events: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Rebuilds an instance by applying `events` in order.
    pub fn from_events(events: impl IntoIterator<Item = SagaEvent>) -> Self {
        let mut saga = Self::default();
        for event in events {
            saga.apply(event);
        }
        saga
    }

    /// Returns true if `event` is a legal next event for this saga.
    ///
    /// Steps must run in the order of the saga's kind, and nothing follows
    /// a terminal state.
    pub fn can_apply(&self, event: &SagaEvent) -> bool {
        match event {
            SagaEvent::SagaStarted(_) => self.state.can_run(),
            SagaEvent::StepStarted(data) => {
                self.state == SagaState::Running
                    && self.next_step() == Some(data.step_name.as_str())
            }
            SagaEvent::StepCompleted(StepCompletedData { step_name, .. })
            | SagaEvent::StepFailed(StepFailedData { step_name, .. }) => {
                self.state == SagaState::Running
                    && self.step_in_progress() == Some(step_name.as_str())
            }
            SagaEvent::CompensationStarted(_) => self.state.can_compensate(),
            SagaEvent::CompensationStepCompleted(_) | SagaEvent::CompensationStepFailed(_) => {
                self.state == SagaState::Compensating
            }
            SagaEvent::ReconciliationRequired(_) => self.state.can_require_reconciliation(),
            SagaEvent::SagaCompleted(_) => self.state.can_complete(),
            SagaEvent::SagaFailed(_) => self.state.can_fail(),
        }
    }

    /// Applies `event`, or ignores it if it is not a legal next event.
    pub fn apply(&mut self, event: SagaEvent) {
        if !self.can_apply(&event) {
            tracing::warn!(
                saga_id = ?self.id,
                state = %self.state,
                event = event.event_type(),
                "ignoring out-of-order saga event"
            );
            return;
        }

        match &event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.kind = Some(data.kind);
                self.subject = data.subject.clone();
                self.started_at = Some(data.started_at);
                self.state = SagaState::Running;
            }
            SagaEvent::StepStarted(_) => {
                self.current_step += 1;
            }
            SagaEvent::StepCompleted(data) => {
                self.completed_steps.push(data.step_name.clone());
                if let Some(vehicle_id) = &data.vehicle_id {
                    self.vehicle_id = Some(vehicle_id.clone());
                }
                if let Some(trip_id) = data.trip_id {
                    self.trip_id = Some(trip_id);
                }
            }
            SagaEvent::StepFailed(data) => {
                self.failure_reason = Some(data.error.clone());
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(data) => {
                self.compensated_steps.push(data.step_name.clone());
            }
            SagaEvent::CompensationStepFailed(_) => {}
            SagaEvent::ReconciliationRequired(data) => {
                self.state = SagaState::ReconciliationRequired;
                self.vehicle_id = Some(data.vehicle_id.clone());
                if data.trip_id.is_some() {
                    self.trip_id = data.trip_id;
                }
                self.failure_reason = Some(data.reason.clone());
            }
            SagaEvent::SagaCompleted(data) => {
                self.state = SagaState::Completed;
                self.finished_at = Some(data.completed_at);
            }
            SagaEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason.clone());
                self.finished_at = Some(data.failed_at);
            }
        }
        self.events.push(event);
    }
}

// Query methods
impl SagaInstance {
    /// The step the saga runs next, if any remain.
    pub fn next_step(&self) -> Option<&'static str> {
        self.kind?.steps().get(self.current_step).copied()
    }

    /// The step that was started last.
    pub fn step_in_progress(&self) -> Option<&'static str> {
        let index = self.current_step.checked_sub(1)?;
        self.kind?.steps().get(index).copied()
    }

    pub fn id(&self) -> Option<SagaId> {
        self.id
    }

    pub fn kind(&self) -> Option<SagaKind> {
        self.kind
    }

    /// Vehicle ID for a start saga, trip ID for an end saga.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn compensated_steps(&self) -> &[String] {
        &self.compensated_steps
    }

    pub fn vehicle_id(&self) -> Option<&VehicleId> {
        self.vehicle_id.as_ref()
    }

    pub fn trip_id(&self) -> Option<TripId> {
        self.trip_id
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn events(&self) -> &[SagaEvent] {
        &self.events
    }
}

//! Saga coordinator for the trip lifecycle.

use std::time::Instant;

use chrono::Utc;
use common::{SagaId, Trip, TripId, VehicleId};
use domain::{Command, EndTrip, StartTrip};

use crate::aggregate::SagaInstance;
use crate::clients::{TripClient, VehicleClient};
use crate::error::{ClientError, SagaError};
use crate::events::SagaEvent;
use crate::journal::SagaJournal;
use crate::reconciliation::{ReconciliationItem, ReconciliationQueue};
use crate::trip_lifecycle::{
    STEP_CREATE_TRIP, STEP_END_TRIP, STEP_LOCK_VEHICLE, STEP_UNLOCK_VEHICLE, SagaKind,
};

/// Result of one saga run.
///
/// The saga ID is known even when the saga failed, so callers can always
/// point at the journal.
#[derive(Debug)]
pub struct SagaOutcome<T> {
    pub saga_id: SagaId,
    pub result: Result<T, SagaError>,
}

/// Orchestrates trip start and end across the vehicle and trip services.
///
/// Start locks the vehicle, then creates the trip; a failed create is
/// compensated by unlocking. End finishes the trip, then unlocks; a failed
/// unlock is not compensated and lands in the reconciliation queue.
pub struct TripSagaCoordinator<V, T, J>
where
    V: VehicleClient,
    T: TripClient,
    J: SagaJournal,
{
    vehicles: V,
    trips: T,
    journal: J,
    reconciliation: ReconciliationQueue,
}

impl<V, T, J> TripSagaCoordinator<V, T, J>
where
    V: VehicleClient,
    T: TripClient,
    J: SagaJournal,
{
    pub fn new(vehicles: V, trips: T, journal: J, reconciliation: ReconciliationQueue) -> Self {
        Self {
            vehicles,
            trips,
            journal,
            reconciliation,
        }
    }

    pub fn vehicles(&self) -> &V {
        &self.vehicles
    }

    pub fn trips(&self) -> &T {
        &self.trips
    }

    pub fn reconciliation(&self) -> &ReconciliationQueue {
        &self.reconciliation
    }

    /// Locks the vehicle and creates a trip for it.
    ///
    /// Returns `Err` without starting a saga if the command is invalid.
    #[tracing::instrument(skip(self), fields(saga_type = "StartTrip"))]
    pub async fn start_trip(&self, cmd: StartTrip) -> Result<SagaOutcome<Trip>, SagaError> {
        cmd.validate()
            .map_err(|e| SagaError::Validation(e.to_string()))?;

        metrics::counter!("saga_executions_total", "kind" => "StartTrip").increment(1);
        let saga_start = Instant::now();
        let saga_id = SagaId::new();
        let vehicle_id = cmd.vehicle_id;

        let mut saga = SagaInstance::default();
        self.record(
            &mut saga,
            SagaEvent::saga_started(saga_id, SagaKind::StartTrip, vehicle_id.as_str()),
        )
        .await;

        // Step 1: lock the vehicle
        tracing::info!(%saga_id, step = STEP_LOCK_VEHICLE, "saga step started");
        self.record(&mut saga, SagaEvent::step_started(STEP_LOCK_VEHICLE))
            .await;
        if let Err(e) = self.vehicles.lock(&vehicle_id).await {
            self.record(&mut saga, SagaEvent::step_failed(STEP_LOCK_VEHICLE, e.to_string()))
                .await;
            self.compensate(&mut saga, saga_id, STEP_LOCK_VEHICLE, &e)
                .await;
            self.finish(&saga, saga_start);
            return Ok(SagaOutcome {
                saga_id,
                result: Err(e.into()),
            });
        }
        self.record(
            &mut saga,
            SagaEvent::step_completed(STEP_LOCK_VEHICLE, Some(vehicle_id.clone()), None),
        )
        .await;

        // Step 2: create the trip for the locked vehicle
        tracing::info!(%saga_id, step = STEP_CREATE_TRIP, "saga step started");
        self.record(&mut saga, SagaEvent::step_started(STEP_CREATE_TRIP))
            .await;
        let result = match self.trips.start_trip(&vehicle_id, cmd.location).await {
            Ok(trip) => {
                self.record(
                    &mut saga,
                    SagaEvent::step_completed(STEP_CREATE_TRIP, Some(vehicle_id), Some(trip.id)),
                )
                .await;
                self.record(&mut saga, SagaEvent::saga_completed()).await;
                Ok(trip)
            }
            Err(e) => {
                self.record(&mut saga, SagaEvent::step_failed(STEP_CREATE_TRIP, e.to_string()))
                    .await;
                self.compensate(&mut saga, saga_id, STEP_CREATE_TRIP, &e)
                    .await;
                Err(e.into())
            }
        };

        self.finish(&saga, saga_start);
        Ok(SagaOutcome { saga_id, result })
    }

    /// Ends the trip and releases its vehicle.
    ///
    /// There is no compensation: an ended trip stays ended. If the unlock
    /// fails the error is surfaced and the vehicle is queued for
    /// reconciliation.
    #[tracing::instrument(skip(self), fields(saga_type = "EndTrip"))]
    pub async fn end_trip(&self, cmd: EndTrip) -> Result<SagaOutcome<Trip>, SagaError> {
        cmd.validate()
            .map_err(|e| SagaError::Validation(e.to_string()))?;

        metrics::counter!("saga_executions_total", "kind" => "EndTrip").increment(1);
        let saga_start = Instant::now();
        let saga_id = SagaId::new();
        let trip_id = cmd.trip_id;

        let mut saga = SagaInstance::default();
        self.record(
            &mut saga,
            SagaEvent::saga_started(saga_id, SagaKind::EndTrip, trip_id.to_string()),
        )
        .await;

        // Step 1: end the trip
        tracing::info!(%saga_id, step = STEP_END_TRIP, "saga step started");
        self.record(&mut saga, SagaEvent::step_started(STEP_END_TRIP))
            .await;
        let trip = match self.trips.end_trip(trip_id, cmd.location).await {
            Ok(trip) => {
                self.record(
                    &mut saga,
                    SagaEvent::step_completed(
                        STEP_END_TRIP,
                        Some(trip.vehicle_id.clone()),
                        Some(trip_id),
                    ),
                )
                .await;
                trip
            }
            Err(e) => {
                self.record(&mut saga, SagaEvent::step_failed(STEP_END_TRIP, e.to_string()))
                    .await;
                self.compensate(&mut saga, saga_id, STEP_END_TRIP, &e)
                    .await;
                self.finish(&saga, saga_start);
                return Ok(SagaOutcome {
                    saga_id,
                    result: Err(e.into()),
                });
            }
        };

        // Step 2: release the vehicle
        tracing::info!(%saga_id, step = STEP_UNLOCK_VEHICLE, "saga step started");
        self.record(&mut saga, SagaEvent::step_started(STEP_UNLOCK_VEHICLE))
            .await;
        let result = match self.vehicles.unlock(&trip.vehicle_id).await {
            Ok(_) => {
                self.record(
                    &mut saga,
                    SagaEvent::step_completed(
                        STEP_UNLOCK_VEHICLE,
                        Some(trip.vehicle_id.clone()),
                        Some(trip_id),
                    ),
                )
                .await;
                self.record(&mut saga, SagaEvent::saga_completed()).await;
                Ok(trip)
            }
            Err(e) => {
                self.record(
                    &mut saga,
                    SagaEvent::step_failed(STEP_UNLOCK_VEHICLE, e.to_string()),
                )
                .await;
                self.require_reconciliation(
                    &mut saga,
                    saga_id,
                    trip.vehicle_id.clone(),
                    Some(trip_id),
                    format!("trip ended but vehicle unlock failed: {e}"),
                )
                .await;
                Err(e.into())
            }
        };

        self.finish(&saga, saga_start);
        Ok(SagaOutcome { saga_id, result })
    }

    /// Rebuilds a saga from its journal.
    pub async fn get_saga(&self, saga_id: SagaId) -> Result<SagaInstance, SagaError> {
        let events = self.journal.load(saga_id).await?;
        if events.is_empty() {
            return Err(SagaError::NotFound(saga_id));
        }
        Ok(SagaInstance::from_events(events))
    }

    pub async fn pending_reconciliations(&self) -> Vec<ReconciliationItem> {
        self.reconciliation.pending().await
    }

    /// Removes a reconciliation item once an operator has repaired the
    /// vehicle.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_reconciliation(
        &self,
        saga_id: SagaId,
    ) -> Result<ReconciliationItem, SagaError> {
        let item = self
            .reconciliation
            .resolve(saga_id)
            .await
            .ok_or(SagaError::NothingToReconcile(saga_id))?;
        tracing::info!(%saga_id, vehicle_id = %item.vehicle_id, "reconciliation resolved");
        metrics::counter!("saga_reconciliations_resolved_total").increment(1);
        Ok(item)
    }

    /// Undoes completed steps in reverse order.
    #[tracing::instrument(skip(self, saga, cause))]
    async fn compensate(
        &self,
        saga: &mut SagaInstance,
        saga_id: SagaId,
        failed_step: &str,
        cause: &ClientError,
    ) {
        self.record(saga, SagaEvent::compensation_started(failed_step))
            .await;

        let completed: Vec<String> = saga.completed_steps().to_vec();
        for step in completed.iter().rev() {
            match step.as_str() {
                STEP_LOCK_VEHICLE => {
                    let Some(vehicle_id) = saga.vehicle_id().cloned() else {
                        continue;
                    };
                    match self.vehicles.unlock(&vehicle_id).await {
                        Ok(_) => {
                            tracing::info!(%saga_id, %vehicle_id, "vehicle lock compensated");
                            self.record(saga, SagaEvent::compensation_step_completed(step))
                                .await;
                        }
                        Err(e) => {
                            self.record(
                                saga,
                                SagaEvent::compensation_step_failed(step, e.to_string()),
                            )
                            .await;
                            self.require_reconciliation(
                                saga,
                                saga_id,
                                vehicle_id,
                                None,
                                format!("vehicle locked without trip, unlock failed: {e}"),
                            )
                            .await;
                            return;
                        }
                    }
                }
                // trip writes are never undone
                _ => {}
            }
        }

        self.record(saga, SagaEvent::saga_failed(cause.to_string()))
            .await;
    }

    async fn require_reconciliation(
        &self,
        saga: &mut SagaInstance,
        saga_id: SagaId,
        vehicle_id: VehicleId,
        trip_id: Option<TripId>,
        reason: String,
    ) {
        let kind = saga.kind().map(|k| k.as_str()).unwrap_or("unknown");
        tracing::error!(
            %saga_id,
            %vehicle_id,
            trip_id = ?trip_id,
            reason = %reason,
            reconciliation_required = true,
            "saga left vehicle and trip inconsistent"
        );
        metrics::counter!("saga_uncompensated_total", "kind" => kind).increment(1);

        self.record(
            saga,
            SagaEvent::reconciliation_required(vehicle_id.clone(), trip_id, reason.clone()),
        )
        .await;
        self.reconciliation
            .push(ReconciliationItem {
                saga_id,
                vehicle_id,
                trip_id,
                reason,
                detected_at: Utc::now(),
            })
            .await;
    }

    /// Applies an event and journals it. A journal failure is logged and
    /// never interrupts the saga.
    async fn record(&self, saga: &mut SagaInstance, event: SagaEvent) {
        if !saga.can_apply(&event) {
            tracing::error!(
                saga_id = ?saga.id(),
                state = %saga.state(),
                event = event.event_type(),
                "saga event out of order, not journaled"
            );
            return;
        }
        let saga_id = match &event {
            SagaEvent::SagaStarted(data) => Some(data.saga_id),
            _ => saga.id(),
        };
        if let Some(saga_id) = saga_id {
            tracing::debug!(%saga_id, event = event.event_type(), "saga event");
            if let Err(e) = self.journal.append(saga_id, &event).await {
                tracing::error!(%saga_id, event = event.event_type(), error = %e, "failed to journal saga event");
            }
        }
        saga.apply(event);
    }

    fn finish(&self, saga: &SagaInstance, started: Instant) {
        let kind = saga.kind().map(|k| k.as_str()).unwrap_or("unknown");
        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds", "kind" => kind).record(duration);

        match saga.state() {
            crate::state::SagaState::Completed => {
                metrics::counter!("saga_completed", "kind" => kind).increment(1);
                tracing::info!(saga_id = ?saga.id(), duration, "saga completed successfully");
            }
            state => {
                metrics::counter!("saga_failed", "kind" => kind).increment(1);
                tracing::warn!(
                    saga_id = ?saga.id(),
                    %state,
                    reason = saga.failure_reason().unwrap_or("unknown"),
                    duration,
                    "saga did not complete"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::local::{LocalTripClient, LocalVehicleClient};
    use crate::journal::InMemorySagaJournal;
    use crate::state::SagaState;
    use common::{Coordinates, TimeOrderedIds, Vehicle};
    use domain::{TripService, VehicleService};
    use store::{InMemoryTripStore, InMemoryVehicleStore};

    type TestCoordinator = TripSagaCoordinator<
        LocalVehicleClient<InMemoryVehicleStore>,
        LocalTripClient<InMemoryTripStore, TimeOrderedIds>,
        InMemorySagaJournal,
    >;

    fn setup() -> TestCoordinator {
        let vehicles = InMemoryVehicleStore::with_vehicles([
            Vehicle::available("v1", Coordinates::new(0.0, 0.0)),
            Vehicle::available("v2", Coordinates::new(0.0, 0.0)),
        ]);
        TripSagaCoordinator::new(
            LocalVehicleClient::new(VehicleService::new(vehicles)),
            LocalTripClient::new(TripService::new(InMemoryTripStore::new(), TimeOrderedIds)),
            InMemorySagaJournal::new(),
            ReconciliationQueue::new(),
        )
    }

    #[tokio::test]
    async fn test_start_trip_happy_path() {
        let coordinator = setup();
        let outcome = coordinator
            .start_trip(StartTrip::new("v1", Coordinates::new(1.0, 2.0)))
            .await
            .unwrap();
        let trip = outcome.result.unwrap();

        let saga = coordinator.get_saga(outcome.saga_id).await.unwrap();
        assert_eq!(saga.state(), SagaState::Completed);
        assert_eq!(saga.completed_steps(), &["lock_vehicle", "create_trip"]);
        assert_eq!(saga.trip_id(), Some(trip.id));
    }

    #[tokio::test]
    async fn test_lock_failure_has_nothing_to_compensate() {
        let coordinator = setup();
        coordinator
            .start_trip(StartTrip::new("v1", Coordinates::new(1.0, 2.0)))
            .await
            .unwrap();

        let outcome = coordinator
            .start_trip(StartTrip::new("v1", Coordinates::new(1.0, 2.0)))
            .await
            .unwrap();
        assert!(matches!(
            outcome.result,
            Err(SagaError::Step(ClientError::AlreadyInUse(_)))
        ));

        let saga = coordinator.get_saga(outcome.saga_id).await.unwrap();
        assert_eq!(saga.state(), SagaState::Failed);
        assert!(saga.completed_steps().is_empty());
        assert!(saga.compensated_steps().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_unlocks_vehicle() {
        let coordinator = setup();
        coordinator.trips().set_fail_on_create(true);

        let outcome = coordinator
            .start_trip(StartTrip::new("v2", Coordinates::new(1.0, 2.0)))
            .await
            .unwrap();
        assert!(matches!(
            outcome.result,
            Err(SagaError::Step(ClientError::Transport { .. }))
        ));

        let vehicle = coordinator
            .vehicles()
            .get_vehicle(&VehicleId::new("v2"))
            .await
            .unwrap();
        assert!(vehicle.is_available());

        let saga = coordinator.get_saga(outcome.saga_id).await.unwrap();
        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.compensated_steps(), &["lock_vehicle"]);
        assert!(coordinator.pending_reconciliations().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_requires_reconciliation() {
        let coordinator = setup();
        coordinator.trips().set_fail_on_create(true);
        coordinator.vehicles().set_fail_on_unlock(true);

        let outcome = coordinator
            .start_trip(StartTrip::new("v2", Coordinates::new(1.0, 2.0)))
            .await
            .unwrap();
        assert!(outcome.result.is_err());

        let saga = coordinator.get_saga(outcome.saga_id).await.unwrap();
        assert_eq!(saga.state(), SagaState::ReconciliationRequired);

        let pending = coordinator.pending_reconciliations().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].saga_id, outcome.saga_id);
        assert_eq!(pending[0].vehicle_id, VehicleId::new("v2"));
        assert!(pending[0].trip_id.is_none());
    }

    #[tokio::test]
    async fn test_invalid_command_starts_no_saga() {
        let coordinator = setup();
        let err = coordinator
            .start_trip(StartTrip::new("v1", Coordinates::new(120.0, 0.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_nonexistent_saga() {
        let coordinator = setup();
        let saga_id = SagaId::new();
        assert!(matches!(
            coordinator.get_saga(saga_id).await,
            Err(SagaError::NotFound(id)) if id == saga_id
        ));
    }

    #[tokio::test]
    async fn test_resolved_reconciliation_leaves_queue() {
        let coordinator = setup();
        coordinator.trips().set_fail_on_create(true);
        coordinator.vehicles().set_fail_on_unlock(true);
        let outcome = coordinator
            .start_trip(StartTrip::new("v1", Coordinates::new(1.0, 2.0)))
            .await
            .unwrap();

        let item = coordinator
            .resolve_reconciliation(outcome.saga_id)
            .await
            .unwrap();
        assert_eq!(item.vehicle_id, VehicleId::new("v1"));
        assert!(coordinator.pending_reconciliations().await.is_empty());
        assert!(matches!(
            coordinator.resolve_reconciliation(outcome.saga_id).await,
            Err(SagaError::NothingToReconcile(_))
        ));
    }
}

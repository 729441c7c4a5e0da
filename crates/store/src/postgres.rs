use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Coordinates, Location, Trip, TripId, TripStatus, Vehicle, VehicleId, VehicleStatus};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    Result, StoreError,
    trip::{LocationAppend, TripStore, storage_precision},
    vehicle::{LocationUpdate, PageRequest, VehicleStore},
};

const VEHICLE_COLUMNS: &str = "public_id, lat, lng, status, location_updated_at";

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

fn row_to_vehicle(row: PgRow) -> Result<Vehicle> {
    let status: String = row.try_get("status")?;
    Ok(Vehicle {
        id: VehicleId::new(row.try_get::<String, _>("public_id")?),
        status: status
            .parse::<VehicleStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        location: Coordinates::new(row.try_get("lat")?, row.try_get("lng")?),
        location_updated_at: row.try_get("location_updated_at")?,
    })
}

fn row_to_location(row: PgRow) -> Result<Location> {
    Ok(Location {
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        recorded_at: row.try_get("created_at")?,
    })
}

fn is_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

/// PostgreSQL-backed vehicle store.
#[derive(Clone)]
pub struct PostgresVehicleStore {
    pool: PgPool,
}

impl PostgresVehicleStore {
    /// Creates a new PostgreSQL vehicle store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, id: &VehicleId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM vehicles WHERE public_id = $1)")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl VehicleStore for PostgresVehicleStore {
    async fn get(&self, id: &VehicleId) -> Result<Vehicle> {
        let row = sqlx::query(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE public_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_vehicle(row),
            None => Err(StoreError::VehicleNotFound(id.clone())),
        }
    }

    async fn list(&self, page: &PageRequest) -> Result<Vec<Vehicle>> {
        let limit = i64::from(page.limit);
        let rows = match &page.cursor {
            None => {
                sqlx::query(&format!(
                    "SELECT {VEHICLE_COLUMNS} FROM vehicles ORDER BY public_id DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Some(cursor) => {
                sqlx::query(&format!(
                    r#"
                    SELECT {VEHICLE_COLUMNS} FROM vehicles
                    WHERE public_id <= $1
                    ORDER BY public_id DESC
                    LIMIT $2
                    "#
                ))
                .bind(cursor.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(row_to_vehicle).collect()
    }

    async fn lock(&self, id: &VehicleId) -> Result<Vehicle> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE vehicles SET status = 'in_use'
            WHERE public_id = $1 AND status = 'available'
            RETURNING {VEHICLE_COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_vehicle(row),
            None if self.exists(id).await? => {
                tracing::debug!(vehicle_id = %id, "lock rejected, vehicle already in use");
                Err(StoreError::VehicleInUse(id.clone()))
            }
            None => Err(StoreError::VehicleNotFound(id.clone())),
        }
    }

    async fn unlock(&self, id: &VehicleId) -> Result<Vehicle> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE vehicles SET status = 'available'
            WHERE public_id = $1
            RETURNING {VEHICLE_COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_vehicle(row),
            None => Err(StoreError::VehicleNotFound(id.clone())),
        }
    }

    async fn update_location(
        &self,
        id: &VehicleId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationUpdate> {
        let recorded_at = storage_precision(recorded_at);
        let result = sqlx::query(
            r#"
            UPDATE vehicles SET lat = $2, lng = $3, location_updated_at = $4
            WHERE public_id = $1
              AND (location_updated_at IS NULL OR location_updated_at < $4)
            "#,
        )
        .bind(id.as_str())
        .bind(location.lat)
        .bind(location.lng)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(LocationUpdate::Applied)
        } else if self.exists(id).await? {
            Ok(LocationUpdate::Stale)
        } else {
            Err(StoreError::VehicleNotFound(id.clone()))
        }
    }

    async fn create_vehicles(&self, vehicles: Vec<Vehicle>) -> Result<Vec<Vehicle>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(vehicles.len());

        for vehicle in vehicles {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO vehicles (public_id, lat, lng, status, location_updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (public_id) DO NOTHING
                RETURNING {VEHICLE_COLUMNS}
                "#
            ))
            .bind(vehicle.id.as_str())
            .bind(vehicle.location.lat)
            .bind(vehicle.location.lng)
            .bind(vehicle.status.as_str())
            .bind(vehicle.location_updated_at)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                created.push(row_to_vehicle(row)?);
            }
        }

        tx.commit().await?;
        Ok(created)
    }
}

/// PostgreSQL-backed trip store.
///
/// With `shared_vehicles` set, trip transactions also update the `vehicles`
/// table of the same database.
#[derive(Clone)]
pub struct PostgresTripStore {
    pool: PgPool,
    shared_vehicles: bool,
}

impl PostgresTripStore {
    /// Creates a trip store that leaves vehicle status alone.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            shared_vehicles: false,
        }
    }

    /// Creates a trip store that locks/unlocks vehicles in its transactions.
    pub fn with_shared_vehicles(pool: PgPool) -> Self {
        Self {
            pool,
            shared_vehicles: true,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_location(
        tx: &mut Transaction<'_, Postgres>,
        trip_id: TripId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationAppend> {
        let recorded_at = storage_precision(recorded_at);
        let result = sqlx::query(
            r#"
            INSERT INTO locations (lat, lng, trip_public_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (trip_public_id, created_at) DO NOTHING
            "#,
        )
        .bind(location.lat)
        .bind(location.lng)
        .bind(trip_id.as_uuid())
        .bind(recorded_at)
        .execute(&mut **tx)
        .await?;

        Ok(if result.rows_affected() > 0 {
            LocationAppend::Appended
        } else {
            LocationAppend::Duplicate
        })
    }

    async fn set_vehicle_status(
        tx: &mut Transaction<'_, Postgres>,
        vehicle_id: &VehicleId,
        status: VehicleStatus,
    ) -> Result<()> {
        let updated: Option<String> = sqlx::query_scalar(
            "UPDATE vehicles SET status = $2 WHERE public_id = $1 RETURNING public_id",
        )
        .bind(vehicle_id.as_str())
        .bind(status.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match updated {
            Some(_) => Ok(()),
            None => Err(StoreError::VehicleNotFound(vehicle_id.clone())),
        }
    }

    async fn trip_status(
        tx: &mut Transaction<'_, Postgres>,
        trip_id: TripId,
    ) -> Result<Option<TripStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM trips WHERE public_id = $1 FOR SHARE")
                .bind(trip_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;

        status
            .map(|s| {
                s.parse::<TripStatus>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .transpose()
    }
}

#[async_trait]
impl TripStore for PostgresTripStore {
    async fn create_trip(
        &self,
        trip_id: TripId,
        vehicle_id: &VehicleId,
        location: Coordinates,
        started_at: DateTime<Utc>,
    ) -> Result<Trip> {
        let started_at = storage_precision(started_at);
        // Start a transaction; dropping it on an error path rolls back
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO trips (public_id, vehicle_public_id, status, started_at)
            VALUES ($1, $2, 'active', $3)
            "#,
        )
        .bind(trip_id.as_uuid())
        .bind(vehicle_id.as_str())
        .bind(started_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, "one_active_trip_per_vehicle") {
                return StoreError::VehicleInUse(vehicle_id.clone());
            }
            StoreError::Database(e)
        })?;

        if self.shared_vehicles {
            Self::set_vehicle_status(&mut tx, vehicle_id, VehicleStatus::InUse).await?;
        }

        Self::insert_location(&mut tx, trip_id, location, started_at).await?;

        tx.commit().await?;

        Ok(Trip {
            id: trip_id,
            status: TripStatus::Active,
            vehicle_id: vehicle_id.clone(),
            locations: vec![Location::new(location, started_at)],
            started_at,
            ended_at: None,
        })
    }

    async fn end_trip(
        &self,
        trip_id: TripId,
        location: Coordinates,
        ended_at: DateTime<Utc>,
    ) -> Result<Trip> {
        let ended_at = storage_precision(ended_at);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE trips SET status = 'ended', ended_at = $2
            WHERE public_id = $1 AND status = 'active'
            RETURNING vehicle_public_id, started_at
            "#,
        )
        .bind(trip_id.as_uuid())
        .bind(ended_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return match Self::trip_status(&mut tx, trip_id).await? {
                Some(_) => Err(StoreError::TripNotActive(trip_id)),
                None => Err(StoreError::TripNotFound(trip_id)),
            };
        };

        let vehicle_id = VehicleId::new(row.try_get::<String, _>("vehicle_public_id")?);
        let started_at: DateTime<Utc> = row.try_get("started_at")?;

        Self::insert_location(&mut tx, trip_id, location, ended_at).await?;

        if self.shared_vehicles {
            Self::set_vehicle_status(&mut tx, &vehicle_id, VehicleStatus::Available).await?;
        }

        tx.commit().await?;

        // Re-read the full history after commit
        let locations = self.locations_for_trip(trip_id).await?;

        Ok(Trip {
            id: trip_id,
            status: TripStatus::Ended,
            vehicle_id,
            locations,
            started_at,
            ended_at: Some(ended_at),
        })
    }

    async fn add_location(
        &self,
        trip_id: TripId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationAppend> {
        let recorded_at = storage_precision(recorded_at);
        let mut tx = self.pool.begin().await?;

        // Row lock conflicts with a concurrent end_trip
        match Self::trip_status(&mut tx, trip_id).await? {
            None => return Err(StoreError::TripNotFound(trip_id)),
            Some(TripStatus::Ended) => return Err(StoreError::TripNotActive(trip_id)),
            Some(TripStatus::Active) => {}
        }

        let outcome = Self::insert_location(&mut tx, trip_id, location, recorded_at).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_trip(&self, trip_id: TripId) -> Result<Trip> {
        let row = sqlx::query(
            r#"
            SELECT vehicle_public_id, status, started_at, ended_at
            FROM trips
            WHERE public_id = $1
            "#,
        )
        .bind(trip_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::TripNotFound(trip_id))?;

        let status: String = row.try_get("status")?;
        let locations = self.locations_for_trip(trip_id).await?;

        Ok(Trip {
            id: trip_id,
            status: status
                .parse::<TripStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            vehicle_id: VehicleId::new(row.try_get::<String, _>("vehicle_public_id")?),
            locations,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    async fn locations_for_trip(&self, trip_id: TripId) -> Result<Vec<Location>> {
        let rows = sqlx::query(
            r#"
            SELECT lat, lng, created_at
            FROM locations
            WHERE trip_public_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(trip_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_location).collect()
    }
}

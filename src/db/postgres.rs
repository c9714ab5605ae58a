use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::RideStore;

use crate::{
    entities::{ActiveRide, Coordinates, Ride, RidePoint},
    error::{already_finalized_error, not_found_error, points_changed_error, Error},
};

type Database = Postgres;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip(db_uri))]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Database>) -> Result<Self, Error> {
        pool.execute(
            "CREATE TABLE IF NOT EXISTS rides (id UUID PRIMARY KEY, status VARCHAR NOT NULL, staff_id BIGINT NOT NULL, data JSONB NOT NULL)",
        )
        .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS ride_points (id BIGSERIAL PRIMARY KEY, ride_id UUID NOT NULL, lat DOUBLE PRECISION NOT NULL, lng DOUBLE PRECISION NOT NULL, recorded_at TIMESTAMPTZ NOT NULL, CONSTRAINT fk_point_ride FOREIGN KEY(ride_id) REFERENCES rides(id))")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS ride_points_order ON ride_points (ride_id, recorded_at, id)")
            .await?;

        Ok(Self { pool })
    }
}

fn point_from_row(row: &PgRow) -> Result<RidePoint, Error> {
    let lat: f64 = row.try_get("lat")?;
    let lng: f64 = row.try_get("lng")?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

    Ok(RidePoint::new(Coordinates::new(lat, lng), recorded_at))
}

#[tracing::instrument(skip(tx))]
async fn fetch_ride_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Ride, Error> {
    let Json(ride): Json<Ride> = tx
        .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(ride)
}

#[tracing::instrument(skip(tx, ride), fields(ride_id = %ride.id))]
async fn update_ride(tx: &mut Transaction<'_, Database>, ride: &Ride) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE rides SET status = $2, data = $3 WHERE id = $1")
            .bind(&ride.id)
            .bind(ride.status.name())
            .bind(Json(ride)),
    )
    .await?;

    Ok(())
}

#[async_trait]
impl RideStore for PgStore {
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO rides (id, status, staff_id, data) VALUES ($1, $2, $3, $4)")
                .bind(&ride.id)
                .bind(ride.status.name())
                .bind(ride.staff_id)
                .bind(Json(ride)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(&id))
            .await?;

        match maybe_result {
            Some(result) => {
                let Json(ride): Json<Ride> = result.try_get("data")?;
                Ok(Some(ride))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn append_point(&self, ride_id: Uuid, point: &RidePoint) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        // holding the ride row keeps appends and finalization from interleaving
        let ride = fetch_ride_for_update(&mut tx, &ride_id).await?;
        if ride.is_finalized() {
            return Err(already_finalized_error());
        }

        tx.execute(
            sqlx::query(
                "INSERT INTO ride_points (ride_id, lat, lng, recorded_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(&ride_id)
            .bind(point.coordinates.lat)
            .bind(point.coordinates.lng)
            .bind(point.recorded_at),
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn ordered_points(&self, ride_id: Uuid) -> Result<Vec<RidePoint>, Error> {
        let mut conn = self.pool.acquire().await?;

        let mut rows = conn.fetch(
            sqlx::query(
                "SELECT lat, lng, recorded_at FROM ride_points WHERE ride_id = $1 ORDER BY recorded_at ASC, id ASC",
            )
            .bind(&ride_id),
        );

        let mut points = vec![];
        while let Some(row) = rows.try_next().await? {
            points.push(point_from_row(&row)?);
        }

        Ok(points)
    }

    #[tracing::instrument(skip(self))]
    async fn active_rides(&self) -> Result<Vec<ActiveRide>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = "
            SELECT
                r.data AS ride,
                p.lat,
                p.lng,
                p.recorded_at
            FROM
                rides r
                LEFT JOIN LATERAL (
                    SELECT lat, lng, recorded_at
                    FROM ride_points
                    WHERE ride_id = r.id
                    ORDER BY recorded_at DESC, id DESC
                    LIMIT 1
                ) p ON true
            WHERE
                r.status = 'in_progress'
        ";

        let results = conn.fetch_all(sqlx::query(query)).await?;

        let mut active = Vec::with_capacity(results.len());
        for result in results.iter() {
            let Json(ride): Json<Ride> = result.try_get("ride")?;
            let recorded_at: Option<DateTime<Utc>> = result.try_get("recorded_at")?;

            let last_point = match recorded_at {
                Some(_) => Some(point_from_row(result)?),
                None => None,
            };

            active.push(ActiveRide { ride, last_point });
        }

        active.sort_by_key(|a| a.ride.started_at);

        Ok(active)
    }

    #[tracing::instrument(skip(self))]
    async fn finalize_ride(
        &self,
        ride_id: Uuid,
        seen_points: usize,
        end_point: Option<Coordinates>,
        total_distance_km: f64,
    ) -> Result<Ride, Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &ride_id).await?;
        if ride.is_finalized() {
            return Err(already_finalized_error());
        }

        // appends wait on the same row lock, so the count is stable from here
        let stored_points: i64 = tx
            .fetch_one(
                sqlx::query("SELECT COUNT(*) AS count FROM ride_points WHERE ride_id = $1")
                    .bind(&ride_id),
            )
            .await?
            .try_get("count")?;
        if stored_points != seen_points as i64 {
            tracing::info!(stored_points, seen_points, "ride received points meanwhile");
            return Err(points_changed_error());
        }

        ride.finalize(end_point, total_distance_km)?;

        update_ride(&mut tx, &ride).await?;

        tx.commit().await?;

        tracing::info!(total_distance_km, "ride finalized");

        Ok(ride)
    }
}

#[cfg(test)]
fn test_store() -> Option<PgStore> {
    use tokio_test::block_on;

    // runs against a live database only when one is configured
    let db_uri = std::env::var("DATABASE_URL").ok()?;

    Some(block_on(PgStore::new(&db_uri, 4)).unwrap())
}

#[cfg(test)]
fn insert_test_ride(store: &PgStore) -> Ride {
    use crate::entities::NewRide;
    use tokio_test::block_on;

    let ride = Ride::new(NewRide {
        staff_id: 21,
        mission_id: 4,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(48.85, 2.35),
    })
    .unwrap();

    block_on(store.insert_ride(&ride)).unwrap();
    ride
}

#[test]
fn pg_ordered_points_ties_test() {
    use chrono::{Duration, TimeZone};
    use tokio_test::block_on;

    let store = match test_store() {
        Some(store) => store,
        None => return,
    };
    let ride = insert_test_ride(&store);
    // whole seconds survive the round trip through TIMESTAMPTZ unchanged
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let late = RidePoint::new(Coordinates::new(1.0, 1.0), t0 + Duration::seconds(10));
    let first = RidePoint::new(Coordinates::new(2.0, 2.0), t0);
    let second = RidePoint::new(Coordinates::new(3.0, 3.0), t0);

    for p in [&late, &first, &second] {
        block_on(store.append_point(ride.id, p)).unwrap();
    }

    let points = block_on(store.ordered_points(ride.id)).unwrap();
    assert_eq!(points, vec![first, second, late.clone()]);

    let active = block_on(store.active_rides()).unwrap();
    let entry = active.iter().find(|a| a.ride.id == ride.id).unwrap();
    assert_eq!(entry.last_point, Some(late));
}

#[test]
fn pg_finalize_twice_test() {
    use tokio_test::block_on;

    let store = match test_store() {
        Some(store) => store,
        None => return,
    };
    let ride = insert_test_ride(&store);

    let (a, b) = block_on(async {
        futures::join!(
            store.finalize_ride(ride.id, 0, None, 3.5),
            store.finalize_ride(ride.id, 0, None, 8.0),
        )
    });

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        other => panic!("expected exactly one finalization, got {:?}", other),
    };
    assert_eq!(lost.code, crate::error::ALREADY_FINALIZED);

    let stored = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(stored.total_distance_km(), won.total_distance_km());

    let active = block_on(store.active_rides()).unwrap();
    assert!(active.iter().all(|a| a.ride.id != ride.id));

    let point = RidePoint::new(Coordinates::new(1.0, 1.0), Utc::now());
    let err = block_on(store.append_point(ride.id, &point)).unwrap_err();
    assert_eq!(err.code, crate::error::ALREADY_FINALIZED);
}

#[test]
fn pg_finalize_with_stale_points_test() {
    use tokio_test::block_on;

    let store = match test_store() {
        Some(store) => store,
        None => return,
    };
    let ride = insert_test_ride(&store);

    let point = RidePoint::new(Coordinates::new(48.86, 2.35), Utc::now());
    block_on(store.append_point(ride.id, &point)).unwrap();

    let err = block_on(store.finalize_ride(ride.id, 0, None, 0.0)).unwrap_err();
    assert_eq!(err.code, crate::error::POINTS_CHANGED);
    assert!(!block_on(store.find_ride(ride.id)).unwrap().unwrap().is_finalized());

    block_on(store.finalize_ride(ride.id, 1, Some(point.coordinates), 1.11)).unwrap();
}

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::RideStore;

use crate::{
    entities::{ActiveRide, Coordinates, Ride, RidePoint},
    error::{
        already_finalized_error, not_found_error, points_changed_error, validation_error, Error,
    },
};

#[derive(Default)]
struct Tables {
    rides: HashMap<Uuid, Ride>,
    // kept in insertion order
    points: HashMap<Uuid, Vec<RidePoint>>,
}

/// Process-local store. Everything lives behind one lock, so each operation
/// sees and leaves a consistent state.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(points: &[RidePoint]) -> Vec<RidePoint> {
    let mut points = points.to_vec();
    // stable, so equal timestamps keep insertion order
    points.sort_by_key(|p| p.recorded_at);
    points
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;

        if tables.rides.contains_key(&ride.id) {
            return Err(validation_error("ride already exists"));
        }

        tables.rides.insert(ride.id, ride.clone());
        tables.points.insert(ride.id, vec![]);

        Ok(())
    }

    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables.rides.get(&id).cloned())
    }

    async fn append_point(&self, ride_id: Uuid, point: &RidePoint) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;

        let ride = tables.rides.get(&ride_id).ok_or_else(not_found_error)?;
        if ride.is_finalized() {
            return Err(already_finalized_error());
        }

        tables
            .points
            .entry(ride_id)
            .or_default()
            .push(point.clone());

        Ok(())
    }

    async fn ordered_points(&self, ride_id: Uuid) -> Result<Vec<RidePoint>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables
            .points
            .get(&ride_id)
            .map(|points| sorted(points))
            .unwrap_or_default())
    }

    async fn active_rides(&self) -> Result<Vec<ActiveRide>, Error> {
        let tables = self.tables.lock().await;

        let mut active: Vec<ActiveRide> = tables
            .rides
            .values()
            .filter(|ride| !ride.is_finalized())
            .map(|ride| ActiveRide {
                ride: ride.clone(),
                last_point: tables
                    .points
                    .get(&ride.id)
                    .and_then(|points| sorted(points).pop()),
            })
            .collect();

        active.sort_by_key(|a| a.ride.started_at);

        Ok(active)
    }

    async fn finalize_ride(
        &self,
        ride_id: Uuid,
        seen_points: usize,
        end_point: Option<Coordinates>,
        total_distance_km: f64,
    ) -> Result<Ride, Error> {
        let mut tables = self.tables.lock().await;

        let stored_points = tables.points.get(&ride_id).map_or(0, |points| points.len());

        let ride = tables.rides.get_mut(&ride_id).ok_or_else(not_found_error)?;
        if ride.is_finalized() {
            return Err(already_finalized_error());
        }
        if stored_points != seen_points {
            return Err(points_changed_error());
        }

        ride.finalize(end_point, total_distance_km)?;

        Ok(ride.clone())
    }
}

#[cfg(test)]
fn stored_ride(store: &MemoryStore) -> Ride {
    use crate::entities::NewRide;
    use tokio_test::block_on;

    let ride = Ride::new(NewRide {
        staff_id: 3,
        mission_id: 9,
        vehicle_type: "scooter".into(),
        start_point: Coordinates::new(10.0, 10.0),
    })
    .unwrap();

    block_on(store.insert_ride(&ride)).unwrap();
    ride
}

#[test]
fn ordered_points_ties_test() {
    use chrono::{Duration, Utc};
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let ride = stored_ride(&store);
    let t0 = Utc::now();

    let late = RidePoint::new(Coordinates::new(1.0, 1.0), t0 + Duration::seconds(10));
    let first = RidePoint::new(Coordinates::new(2.0, 2.0), t0);
    let second = RidePoint::new(Coordinates::new(3.0, 3.0), t0);

    for p in [&late, &first, &second] {
        block_on(store.append_point(ride.id, p)).unwrap();
    }

    let points = block_on(store.ordered_points(ride.id)).unwrap();
    assert_eq!(points, vec![first, second, late]);
}

#[test]
fn finalize_twice_test() {
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let ride = stored_ride(&store);

    let finalized = block_on(store.finalize_ride(ride.id, 0, None, 3.5)).unwrap();
    assert_eq!(finalized.total_distance_km(), Some(3.5));

    let err = block_on(store.finalize_ride(ride.id, 0, None, 8.0)).unwrap_err();
    assert_eq!(err.code, crate::error::ALREADY_FINALIZED);

    let stored = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(stored.total_distance_km(), Some(3.5));
}

#[test]
fn append_rules_test() {
    use chrono::Utc;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let point = RidePoint::new(Coordinates::new(1.0, 1.0), Utc::now());

    let err = block_on(store.append_point(Uuid::new_v4(), &point)).unwrap_err();
    assert_eq!(err.code, crate::error::NOT_FOUND);

    let ride = stored_ride(&store);
    block_on(store.finalize_ride(ride.id, 0, None, 0.0)).unwrap();

    let err = block_on(store.append_point(ride.id, &point)).unwrap_err();
    assert_eq!(err.code, crate::error::ALREADY_FINALIZED);
}

#[test]
fn active_rides_test() {
    use chrono::{Duration, Utc};
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let open = stored_ride(&store);
    let closed = stored_ride(&store);
    let t0 = Utc::now();

    let newest = RidePoint::new(Coordinates::new(5.0, 5.0), t0 + Duration::seconds(60));
    block_on(store.append_point(open.id, &newest)).unwrap();
    block_on(store.append_point(open.id, &RidePoint::new(Coordinates::new(4.0, 4.0), t0)))
        .unwrap();
    block_on(store.finalize_ride(closed.id, 0, None, 1.0)).unwrap();

    let active = block_on(store.active_rides()).unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!(active[0].ride.id, open.id);
    assert_eq!(active[0].last_point, Some(newest));
}

#[test]
fn finalize_with_stale_points_test() {
    use chrono::Utc;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let ride = stored_ride(&store);

    for lng in [0.0, 0.1] {
        let point = RidePoint::new(Coordinates::new(0.0, lng), Utc::now());
        block_on(store.append_point(ride.id, &point)).unwrap();
    }

    // estimated over one point, but two are stored by now
    let err = block_on(store.finalize_ride(ride.id, 1, None, 0.0)).unwrap_err();
    assert_eq!(err.code, crate::error::POINTS_CHANGED);
    assert!(!block_on(store.find_ride(ride.id)).unwrap().unwrap().is_finalized());

    let finalized = block_on(store.finalize_ride(ride.id, 2, None, 11.12)).unwrap();
    assert_eq!(finalized.total_distance_km(), Some(11.12));
}

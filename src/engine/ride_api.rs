use super::Engine;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::RideAPI,
    entities::{ActiveRide, Coordinates, NewRide, Ride, RidePoint},
    error::{already_finalized_error, not_found_error, Error, POINTS_CHANGED},
};

/// Estimates attempted per `end_ride` call while points keep arriving.
const FINALIZE_ATTEMPTS: usize = 3;

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn start_ride(&self, params: NewRide) -> Result<Ride, Error> {
        let ride = Ride::new(params)?;

        self.store.insert_ride(&ride).await?;

        tracing::info!(ride_id = %ride.id, staff_id = ride.staff_id, "ride started");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn record_point(
        &self,
        ride_id: Uuid,
        coordinates: Coordinates,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<RidePoint, Error> {
        coordinates.validate()?;

        let point = RidePoint::new(coordinates, recorded_at.unwrap_or_else(Utc::now));

        self.store.append_point(ride_id, &point).await?;

        Ok(point)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, ride_id: Uuid) -> Result<Ride, Error> {
        self.store
            .find_ride(ride_id)
            .await?
            .ok_or_else(not_found_error)
    }

    #[tracing::instrument(skip(self))]
    async fn ride_points(&self, ride_id: Uuid) -> Result<Vec<RidePoint>, Error> {
        // distinguishes an unknown ride from one without points
        self.find_ride(ride_id).await?;

        self.store.ordered_points(ride_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn active_rides(&self) -> Result<Vec<ActiveRide>, Error> {
        self.store.active_rides().await
    }

    #[tracing::instrument(skip(self))]
    async fn end_ride(&self, ride_id: Uuid, end: Option<Coordinates>) -> Result<Ride, Error> {
        if let Some(end) = &end {
            end.validate()?;
        }

        let ride = self.find_ride(ride_id).await?;
        if ride.is_finalized() {
            tracing::info!("ride is already finalized, returning early...");
            return Err(already_finalized_error());
        }

        let mut attempt = 1;
        loop {
            let points = self.store.ordered_points(ride_id).await?;

            let total_distance_km = self.estimate(self.strategy, &ride, &points, end).await?;
            let end_point = end.or_else(|| points.last().map(|p| p.coordinates));

            // the store commits only if no point arrived since the read above,
            // and of concurrent attempts only one lands
            match self
                .store
                .finalize_ride(ride_id, points.len(), end_point, total_distance_km)
                .await
            {
                Ok(ride) => {
                    tracing::info!(
                        strategy = %self.strategy,
                        total_distance_km,
                        points = points.len(),
                        "ride ended"
                    );

                    return Ok(ride);
                }
                Err(err) if err.code == POINTS_CHANGED && attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(attempt, "points arrived while ending the ride, estimating again");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
fn start(engine: &Engine) -> Ride {
    use tokio_test::block_on;

    block_on(engine.start_ride(NewRide {
        staff_id: 11,
        mission_id: 5,
        vehicle_type: "bike".into(),
        start_point: Coordinates::new(0.0, 0.0),
    }))
    .unwrap()
}

#[cfg(test)]
fn record_all(engine: &Engine, ride_id: Uuid, coordinates: &[(f64, f64)]) {
    use chrono::Duration;
    use tokio_test::block_on;

    let t0 = Utc::now();
    for (i, (lat, lng)) in coordinates.iter().enumerate() {
        block_on(engine.record_point(
            ride_id,
            Coordinates::new(*lat, *lng),
            Some(t0 + Duration::seconds(i as i64)),
        ))
        .unwrap();
    }
}

#[test]
fn end_ride_local_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);
    let ride = start(&engine);
    record_all(&engine, ride.id, &[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);

    let ended = block_on(engine.end_ride(ride.id, None)).unwrap();

    assert!(ended.is_finalized());
    assert_eq!(ended.total_distance_km(), Some(222.39));
    assert_eq!(ended.end_point(), Some(Coordinates::new(1.0, 1.0)));
}

#[test]
fn end_ride_twice_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, store) = super::memory_engine(Strategy::Local);
    let ride = start(&engine);
    record_all(&engine, ride.id, &[(0.0, 0.0), (0.0, 1.0)]);

    let first = block_on(engine.end_ride(ride.id, None)).unwrap();
    let err = block_on(engine.end_ride(ride.id, Some(Coordinates::new(5.0, 5.0)))).unwrap_err();

    assert_eq!(err.code, crate::error::ALREADY_FINALIZED);

    let stored = block_on(crate::db::RideStore::find_ride(&*store, ride.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_distance_km(), first.total_distance_km());
    assert_eq!(stored.end_point(), first.end_point());
}

#[test]
fn end_ride_with_too_few_points_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);

    let empty = start(&engine);
    let err = block_on(engine.end_ride(empty.id, None)).unwrap_err();
    assert_eq!(err.code, crate::error::INSUFFICIENT_DATA);

    let single = start(&engine);
    record_all(&engine, single.id, &[(0.5, 0.5)]);
    let err = block_on(engine.end_ride(single.id, Some(Coordinates::new(1.0, 1.0)))).unwrap_err();
    assert_eq!(err.code, crate::error::INSUFFICIENT_DATA);

    // nothing was frozen, the ride stays open
    let ride = block_on(engine.find_ride(single.id)).unwrap();
    assert!(!ride.is_finalized());
}

#[test]
fn end_unknown_ride_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);

    let err = block_on(engine.end_ride(Uuid::new_v4(), None)).unwrap_err();
    assert_eq!(err.code, crate::error::NOT_FOUND);
}

#[test]
fn end_ride_invalid_end_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);
    let ride = start(&engine);

    let err = block_on(engine.end_ride(ride.id, Some(Coordinates::new(0.0, 181.0)))).unwrap_err();
    assert_eq!(err.code, crate::error::VALIDATION);
}

#[test]
fn end_ride_routing_test() {
    use std::sync::Arc;

    use crate::distance::{
        fakes::{FakeRouter, Reply},
        Strategy,
    };
    use tokio_test::block_on;

    let router = Arc::new(FakeRouter::new(Reply::Meters(12345)));
    let (engine, _) = super::memory_engine(Strategy::RoutingService);
    let engine = engine.with_router(router.clone());

    let ride = start(&engine);
    record_all(&engine, ride.id, &[(0.1, 0.1), (0.2, 0.2), (0.3, 0.3)]);
    let end = Coordinates::new(0.4, 0.4);

    let ended = block_on(engine.end_ride(ride.id, Some(end))).unwrap();

    assert_eq!(ended.total_distance_km(), Some(12.35));
    assert_eq!(ended.end_point(), Some(end));
    assert_eq!(
        *router.calls.lock().unwrap(),
        vec![(Coordinates::new(0.1, 0.1), end)]
    );
}

#[test]
fn end_ride_routing_failures_leave_ride_open_test() {
    use std::sync::Arc;

    use crate::distance::{
        fakes::{FakeRouter, Reply},
        Strategy,
    };
    use tokio_test::block_on;

    for (reply, code) in [
        (Reply::NoRoute, crate::error::NO_ROUTE_FOUND),
        (Reply::Unavailable, crate::error::UPSTREAM_UNAVAILABLE),
        (Reply::Rejected("REQUEST_DENIED"), crate::error::UPSTREAM_REJECTED),
    ] {
        let (engine, _) = super::memory_engine(Strategy::RoutingService);
        let engine = engine.with_router(Arc::new(FakeRouter::new(reply)));

        let ride = start(&engine);
        record_all(&engine, ride.id, &[(0.1, 0.1), (0.2, 0.2)]);

        let err = block_on(engine.end_ride(ride.id, None)).unwrap_err();
        assert_eq!(err.code, code);

        let ride = block_on(engine.find_ride(ride.id)).unwrap();
        assert!(!ride.is_finalized());
    }
}

#[test]
fn end_ride_routing_without_locations_test() {
    use std::sync::Arc;

    use crate::distance::{
        fakes::{FakeRouter, Reply},
        Strategy,
    };
    use tokio_test::block_on;

    let router = Arc::new(FakeRouter::new(Reply::Meters(800)));
    let (engine, _) = super::memory_engine(Strategy::RoutingService);
    let engine = engine.with_router(router.clone());

    let ride = start(&engine);
    let err = block_on(engine.end_ride(ride.id, None)).unwrap_err();
    assert_eq!(err.code, crate::error::INSUFFICIENT_DATA);
    assert!(router.calls.lock().unwrap().is_empty());

    // an explicit end location is enough: the ride's start point is the origin
    let end = Coordinates::new(0.01, 0.01);
    let ended = block_on(engine.end_ride(ride.id, Some(end))).unwrap();
    assert_eq!(ended.total_distance_km(), Some(0.8));
    assert_eq!(
        *router.calls.lock().unwrap(),
        vec![(Coordinates::new(0.0, 0.0), end)]
    );
}

#[test]
fn record_point_rules_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);
    let ride = start(&engine);

    let err = block_on(engine.record_point(ride.id, Coordinates::new(-91.0, 0.0), None))
        .unwrap_err();
    assert_eq!(err.code, crate::error::VALIDATION);

    let err = block_on(engine.record_point(Uuid::new_v4(), Coordinates::new(1.0, 1.0), None))
        .unwrap_err();
    assert_eq!(err.code, crate::error::NOT_FOUND);

    record_all(&engine, ride.id, &[(0.0, 0.0), (0.0, 0.5)]);
    block_on(engine.end_ride(ride.id, None)).unwrap();

    let err = block_on(engine.record_point(ride.id, Coordinates::new(1.0, 1.0), None))
        .unwrap_err();
    assert_eq!(err.code, crate::error::ALREADY_FINALIZED);
}

#[test]
fn ride_points_and_active_rides_test() {
    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);

    let err = block_on(engine.ride_points(Uuid::new_v4())).unwrap_err();
    assert_eq!(err.code, crate::error::NOT_FOUND);

    let moving = start(&engine);
    let idle = start(&engine);
    let done = start(&engine);

    assert!(block_on(engine.ride_points(idle.id)).unwrap().is_empty());

    record_all(&engine, moving.id, &[(0.0, 0.0), (0.0, 0.1), (0.0, 0.2)]);
    record_all(&engine, done.id, &[(1.0, 1.0), (1.0, 1.1)]);
    block_on(engine.end_ride(done.id, None)).unwrap();

    let points = block_on(engine.ride_points(moving.id)).unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[2].coordinates, Coordinates::new(0.0, 0.2));

    let active = block_on(engine.active_rides()).unwrap();
    let ids: Vec<Uuid> = active.iter().map(|a| a.ride.id).collect();
    assert!(ids.contains(&moving.id));
    assert!(ids.contains(&idle.id));
    assert!(!ids.contains(&done.id));

    let moving_entry = active.iter().find(|a| a.ride.id == moving.id).unwrap();
    assert_eq!(
        moving_entry.last_point.as_ref().map(|p| p.coordinates),
        Some(Coordinates::new(0.0, 0.2))
    );
    let idle_entry = active.iter().find(|a| a.ride.id == idle.id).unwrap();
    assert_eq!(idle_entry.last_point, None);
}

#[cfg(test)]
struct AppendingRouter {
    store: std::sync::Arc<crate::db::MemoryStore>,
    ride_id: Uuid,
    // how many more lookups append a point before answering
    appends_left: std::sync::Mutex<usize>,
    calls: std::sync::Mutex<Vec<(Coordinates, Coordinates)>>,
}

#[cfg(test)]
#[async_trait]
impl crate::distance::RoutingService for AppendingRouter {
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<crate::distance::Route, Error> {
        use crate::db::RideStore;

        self.calls.lock().unwrap().push((origin, destination));

        let append = {
            let mut left = self.appends_left.lock().unwrap();
            let append = *left > 0;
            *left = left.saturating_sub(1);
            append
        };
        if append {
            let n = self.calls.lock().unwrap().len() as f64;
            let point = RidePoint::new(
                Coordinates::new(50.0, n),
                Utc::now() + chrono::Duration::hours(1),
            );
            self.store.append_point(self.ride_id, &point).await?;
        }

        Ok(crate::distance::Route {
            distance_meters: 1000,
        })
    }
}

#[test]
fn end_ride_sees_points_recorded_during_estimate_test() {
    use std::sync::{Arc, Mutex};

    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, store) = super::memory_engine(Strategy::RoutingService);
    let ride = start(&engine);
    record_all(&engine, ride.id, &[(0.0, 0.0), (0.0, 1.0)]);

    let router = Arc::new(AppendingRouter {
        store: store.clone(),
        ride_id: ride.id,
        appends_left: Mutex::new(1),
        calls: Mutex::new(vec![]),
    });
    let engine = engine.with_router(router.clone());

    let ended = block_on(engine.end_ride(ride.id, None)).unwrap();

    let points = block_on(engine.ride_points(ride.id)).unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(ended.end_point(), Some(Coordinates::new(50.0, 1.0)));

    // the second lookup ran over the point that arrived during the first
    let calls = router.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], (Coordinates::new(0.0, 0.0), Coordinates::new(50.0, 1.0)));
}

#[test]
fn end_ride_gives_up_while_points_keep_arriving_test() {
    use std::sync::{Arc, Mutex};

    use crate::distance::Strategy;
    use tokio_test::block_on;

    let (engine, store) = super::memory_engine(Strategy::RoutingService);
    let ride = start(&engine);
    record_all(&engine, ride.id, &[(0.0, 0.0), (0.0, 1.0)]);

    let router = Arc::new(AppendingRouter {
        store: store.clone(),
        ride_id: ride.id,
        appends_left: Mutex::new(usize::MAX),
        calls: Mutex::new(vec![]),
    });
    let engine = engine.with_router(router.clone());

    let err = block_on(engine.end_ride(ride.id, None)).unwrap_err();
    assert_eq!(err.code, crate::error::POINTS_CHANGED);
    assert_eq!(router.calls.lock().unwrap().len(), FINALIZE_ATTEMPTS);

    let ride = block_on(engine.find_ride(ride.id)).unwrap();
    assert!(!ride.is_finalized());
}

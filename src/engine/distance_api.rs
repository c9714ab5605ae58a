use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{DistanceAPI, RideAPI},
    distance::Strategy,
    error::Error,
};

#[async_trait]
impl DistanceAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn compute_ride_distance(
        &self,
        ride_id: Uuid,
        strategy: Strategy,
    ) -> Result<f64, Error> {
        let ride = self.find_ride(ride_id).await?;
        if let Some(total_distance_km) = ride.total_distance_km() {
            tracing::info!("ride is finalized, returning its frozen distance...");
            return Ok(total_distance_km);
        }

        let points = self.store.ordered_points(ride_id).await?;

        self.estimate(strategy, &ride, &points, None).await
    }
}

#[test]
fn compute_does_not_finalize_test() {
    use crate::entities::{Coordinates, NewRide};
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);

    let ride = block_on(engine.start_ride(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(0.0, 0.0),
    }))
    .unwrap();

    for (lat, lng) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        block_on(engine.record_point(ride.id, Coordinates::new(lat, lng), None)).unwrap();
    }

    let km = block_on(engine.compute_ride_distance(ride.id, Strategy::Local)).unwrap();
    assert_eq!(km, 222.39);

    let ride = block_on(engine.find_ride(ride.id)).unwrap();
    assert!(!ride.is_finalized());
    assert_eq!(ride.total_distance_km(), None);
}

#[test]
fn compute_grows_with_points_test() {
    use crate::entities::{Coordinates, NewRide};
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);

    let ride = block_on(engine.start_ride(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(12.97, 77.59),
    }))
    .unwrap();

    let track = [
        (12.9716, 77.5946),
        (12.9730, 77.5990),
        (12.9730, 77.5990),
        (12.9801, 77.6050),
        (12.9700, 77.6100),
    ];

    let mut previous = 0.0;
    for (i, (lat, lng)) in track.iter().enumerate() {
        let at = chrono::Utc::now() + chrono::Duration::seconds(i as i64);
        block_on(engine.record_point(ride.id, Coordinates::new(*lat, *lng), Some(at))).unwrap();

        if i == 0 {
            continue;
        }

        let km = block_on(engine.compute_ride_distance(ride.id, Strategy::Local)).unwrap();
        assert!(km >= previous);
        previous = km;
    }

    assert!(previous > 0.0);
}

#[test]
fn compute_with_requested_strategy_test() {
    use std::sync::Arc;

    use crate::distance::fakes::{FakeRouter, Reply};
    use crate::entities::{Coordinates, NewRide};
    use tokio_test::block_on;

    // deployment default is local, the caller asks for the routing estimate
    let (engine, _) = super::memory_engine(Strategy::Local);
    let engine = engine.with_router(Arc::new(FakeRouter::new(Reply::Meters(2500))));

    let ride = block_on(engine.start_ride(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(0.0, 0.0),
    }))
    .unwrap();
    block_on(engine.record_point(ride.id, Coordinates::new(0.01, 0.01), None)).unwrap();

    let km = block_on(engine.compute_ride_distance(ride.id, Strategy::RoutingService)).unwrap();
    assert_eq!(km, 2.5);
}

#[test]
fn compute_without_router_test() {
    use crate::entities::{Coordinates, NewRide};
    use tokio_test::block_on;

    let (engine, _) = super::memory_engine(Strategy::Local);

    let ride = block_on(engine.start_ride(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(0.0, 0.0),
    }))
    .unwrap();
    block_on(engine.record_point(ride.id, Coordinates::new(0.01, 0.01), None)).unwrap();

    let err = block_on(engine.compute_ride_distance(ride.id, Strategy::RoutingService))
        .unwrap_err();
    assert_eq!(err.code, crate::error::CONFIGURATION);

    let err = block_on(engine.compute_ride_distance(uuid::Uuid::new_v4(), Strategy::Local))
        .unwrap_err();
    assert_eq!(err.code, crate::error::NOT_FOUND);
}

#[test]
fn compute_finalized_ride_returns_frozen_distance_test() {
    use std::sync::Arc;

    use crate::distance::fakes::{FakeRouter, Reply};
    use crate::entities::{Coordinates, NewRide};
    use tokio_test::block_on;

    let router = Arc::new(FakeRouter::new(Reply::Meters(100_000)));
    let (engine, _) = super::memory_engine(Strategy::Local);
    let engine = engine.with_router(router.clone());

    let ride = block_on(engine.start_ride(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(0.0, 0.0),
    }))
    .unwrap();
    for (i, (lat, lng)) in [(0.0, 0.0), (0.0, 1.0)].iter().enumerate() {
        let at = chrono::Utc::now() + chrono::Duration::seconds(i as i64);
        block_on(engine.record_point(ride.id, Coordinates::new(*lat, *lng), Some(at))).unwrap();
    }

    let ended = block_on(engine.end_ride(ride.id, None)).unwrap();
    assert_eq!(ended.total_distance_km(), Some(111.19));

    for strategy in [Strategy::Local, Strategy::RoutingService] {
        let km = block_on(engine.compute_ride_distance(ride.id, strategy)).unwrap();
        assert_eq!(km, 111.19);
    }
    assert!(router.calls.lock().unwrap().is_empty());
}

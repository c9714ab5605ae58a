use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::{Coordinates, Ride, RidePoint};
use crate::error::{insufficient_data_error, Error};

/// A route returned by a routing service.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub distance_meters: u64,
}

/// External lookup of the travel distance along a real route.
///
/// Implementations own their credential. Lookups are read-only and are never
/// retried here.
#[async_trait]
pub trait RoutingService {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<Route, Error>;
}

pub type DynRouter = Arc<dyn RoutingService + Send + Sync>;

/// Picks the origin and destination used for a routing lookup.
///
/// The origin is the first recorded point, falling back to where the ride
/// started. The destination is the explicit end location, then the ride's
/// stored end point, then the last recorded point.
pub fn route_endpoints(
    ride: &Ride,
    points: &[RidePoint],
    end: Option<Coordinates>,
) -> Result<(Coordinates, Coordinates), Error> {
    let origin = points
        .first()
        .map(|p| p.coordinates)
        .unwrap_or(ride.start_point);

    let destination = end
        .or_else(|| ride.end_point())
        .or_else(|| points.last().map(|p| p.coordinates))
        .ok_or_else(insufficient_data_error)?;

    origin.validate()?;
    destination.validate()?;

    Ok((origin, destination))
}

/// Whole meters to kilometers, rounded to 2 decimals.
pub fn meters_to_km(meters: u64) -> f64 {
    (meters as f64 / 10.0).round() / 100.0
}

#[tracing::instrument(skip(router))]
pub async fn routing_estimate(
    router: &(dyn RoutingService + Send + Sync),
    origin: Coordinates,
    destination: Coordinates,
) -> Result<f64, Error> {
    let route = router.route(origin, destination).await?;

    tracing::info!(distance_meters = route.distance_meters, "route found");

    Ok(meters_to_km(route.distance_meters))
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{no_route_found_error, upstream_rejected_error, upstream_unavailable_error};

    pub enum Reply {
        Meters(u64),
        NoRoute,
        Unavailable,
        Rejected(&'static str),
    }

    /// Canned routing service that records the lookups it receives.
    pub struct FakeRouter {
        reply: Reply,
        pub calls: Mutex<Vec<(Coordinates, Coordinates)>>,
    }

    impl FakeRouter {
        pub fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl RoutingService for FakeRouter {
        async fn route(
            &self,
            origin: Coordinates,
            destination: Coordinates,
        ) -> Result<Route, Error> {
            self.calls.lock().unwrap().push((origin, destination));

            match self.reply {
                Reply::Meters(distance_meters) => Ok(Route { distance_meters }),
                Reply::NoRoute => Err(no_route_found_error()),
                Reply::Unavailable => Err(upstream_unavailable_error()),
                Reply::Rejected(status) => Err(upstream_rejected_error(status)),
            }
        }
    }
}

#[cfg(test)]
fn ride_from(start: Coordinates) -> Ride {
    use crate::entities::NewRide;

    Ride::new(NewRide {
        staff_id: 1,
        mission_id: 2,
        vehicle_type: "car".into(),
        start_point: start,
    })
    .unwrap()
}

#[test]
fn meters_to_km_test() {
    assert_eq!(meters_to_km(12345), 12.35);
    assert_eq!(meters_to_km(12344), 12.34);
    assert_eq!(meters_to_km(0), 0.0);
    assert_eq!(meters_to_km(1000), 1.0);
    assert_eq!(meters_to_km(5), 0.01);
}

#[test]
fn endpoints_from_points_test() {
    use chrono::Utc;

    let ride = ride_from(Coordinates::new(1.0, 1.0));
    let points = vec![
        RidePoint::new(Coordinates::new(2.0, 2.0), Utc::now()),
        RidePoint::new(Coordinates::new(3.0, 3.0), Utc::now()),
        RidePoint::new(Coordinates::new(4.0, 4.0), Utc::now()),
    ];

    let (origin, destination) = route_endpoints(&ride, &points, None).unwrap();
    assert_eq!(origin, Coordinates::new(2.0, 2.0));
    assert_eq!(destination, Coordinates::new(4.0, 4.0));

    let end = Coordinates::new(5.0, 5.0);
    let (_, destination) = route_endpoints(&ride, &points, Some(end)).unwrap();
    assert_eq!(destination, end);
}

#[test]
fn endpoints_without_points_test() {
    let start = Coordinates::new(1.0, 1.0);
    let ride = ride_from(start);

    let err = route_endpoints(&ride, &[], None).unwrap_err();
    assert_eq!(err.code, crate::error::INSUFFICIENT_DATA);

    let end = Coordinates::new(1.5, 1.5);
    let (origin, destination) = route_endpoints(&ride, &[], Some(end)).unwrap();
    assert_eq!(origin, start);
    assert_eq!(destination, end);
}

#[test]
fn routing_estimate_test() {
    use fakes::{FakeRouter, Reply};
    use tokio_test::block_on;

    let router = FakeRouter::new(Reply::Meters(12345));
    let origin = Coordinates::new(12.9716, 77.5946);
    let destination = Coordinates::new(12.9352, 77.6245);

    let km = block_on(routing_estimate(&router, origin, destination)).unwrap();

    assert_eq!(km, 12.35);
    assert_eq!(*router.calls.lock().unwrap(), vec![(origin, destination)]);
}

#[test]
fn routing_estimate_failures_test() {
    use fakes::{FakeRouter, Reply};
    use tokio_test::block_on;

    let origin = Coordinates::new(0.0, 0.0);
    let destination = Coordinates::new(0.0, 1.0);

    let err = block_on(routing_estimate(
        &FakeRouter::new(Reply::NoRoute),
        origin,
        destination,
    ))
    .unwrap_err();
    assert_eq!(err.code, crate::error::NO_ROUTE_FOUND);

    let err = block_on(routing_estimate(
        &FakeRouter::new(Reply::Unavailable),
        origin,
        destination,
    ))
    .unwrap_err();
    assert_eq!(err.code, crate::error::UPSTREAM_UNAVAILABLE);

    let err = block_on(routing_estimate(
        &FakeRouter::new(Reply::Rejected("REQUEST_DENIED")),
        origin,
        destination,
    ))
    .unwrap_err();
    assert_eq!(err.code, crate::error::UPSTREAM_REJECTED);
    assert_eq!(err.message, "REQUEST_DENIED");
}

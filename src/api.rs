use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::distance::Strategy;
use crate::entities::{ActiveRide, Coordinates, NewRide, Ride, RidePoint};
use crate::error::Error;

#[async_trait]
pub trait RideAPI {
    async fn start_ride(&self, params: NewRide) -> Result<Ride, Error>;

    async fn record_point(
        &self,
        ride_id: Uuid,
        coordinates: Coordinates,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<RidePoint, Error>;

    async fn find_ride(&self, ride_id: Uuid) -> Result<Ride, Error>;

    async fn ride_points(&self, ride_id: Uuid) -> Result<Vec<RidePoint>, Error>;

    async fn active_rides(&self) -> Result<Vec<ActiveRide>, Error>;

    /// Ends the ride, freezing its total distance with the deployment's
    /// strategy.
    async fn end_ride(&self, ride_id: Uuid, end: Option<Coordinates>) -> Result<Ride, Error>;
}

#[async_trait]
pub trait DistanceAPI {
    /// Distance in kilometers for the ride's points so far. Read only.
    async fn compute_ride_distance(&self, ride_id: Uuid, strategy: Strategy)
        -> Result<f64, Error>;
}

pub trait API: RideAPI + DistanceAPI {}

impl<T: RideAPI + DistanceAPI> API for T {}

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    entities::{ActiveRide, Coordinates, Ride, RidePoint},
    error::Error,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for rides and their GPS points.
///
/// `ordered_points` returns points by `recorded_at` ascending, ties in
/// insertion order. `finalize_ride` is a single transition per ride: of two
/// concurrent attempts exactly one succeeds and the other gets
/// `AlreadyFinalized`. It only commits while the ride still holds exactly
/// `seen_points` points, otherwise it fails with `PointsChanged` and the ride
/// stays open.
#[async_trait]
pub trait RideStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;

    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;

    async fn append_point(&self, ride_id: Uuid, point: &RidePoint) -> Result<(), Error>;

    async fn ordered_points(&self, ride_id: Uuid) -> Result<Vec<RidePoint>, Error>;

    async fn active_rides(&self) -> Result<Vec<ActiveRide>, Error>;

    async fn finalize_ride(
        &self,
        ride_id: Uuid,
        seen_points: usize,
        end_point: Option<Coordinates>,
        total_distance_km: f64,
    ) -> Result<Ride, Error>;
}

pub type DynStore = Arc<dyn RideStore + Send + Sync>;

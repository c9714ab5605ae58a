use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;

/// One GPS sample of a ride. Never modified once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RidePoint {
    pub coordinates: Coordinates,
    pub recorded_at: DateTime<Utc>,
}

impl RidePoint {
    pub fn new(coordinates: Coordinates, recorded_at: DateTime<Utc>) -> Self {
        Self {
            coordinates,
            recorded_at,
        }
    }
}

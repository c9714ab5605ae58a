use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Coordinates, RidePoint};
use crate::error::{already_finalized_error, validation_error, Error};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub staff_id: i64,
    pub mission_id: i64,
    pub vehicle_type: String,
    pub start_point: Coordinates,
    pub started_at: DateTime<Utc>,
    pub status: Status,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    InProgress,
    Finalized {
        end_point: Option<Coordinates>,
        ended_at: DateTime<Utc>,
        total_distance_km: f64,
    },
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::InProgress => "in_progress".into(),
            Self::Finalized { .. } => "finalized".into(),
        }
    }
}

/// Parameters for starting a ride.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRide {
    pub staff_id: i64,
    pub mission_id: i64,
    pub vehicle_type: String,
    pub start_point: Coordinates,
}

impl Ride {
    pub fn new(params: NewRide) -> Result<Self, Error> {
        params.start_point.validate()?;

        if params.vehicle_type.trim().is_empty() {
            return Err(validation_error("vehicle type is required"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            staff_id: params.staff_id,
            mission_id: params.mission_id,
            vehicle_type: params.vehicle_type,
            start_point: params.start_point,
            started_at: Utc::now(),
            status: Status::InProgress,
        })
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.status, Status::Finalized { .. })
    }

    pub fn end_point(&self) -> Option<Coordinates> {
        match self.status {
            Status::Finalized { end_point, .. } => end_point,
            Status::InProgress => None,
        }
    }

    pub fn total_distance_km(&self) -> Option<f64> {
        match self.status {
            Status::Finalized {
                total_distance_km, ..
            } => Some(total_distance_km),
            Status::InProgress => None,
        }
    }

    /// Freezes the ride's distance. Only valid once.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn finalize(
        &mut self,
        end_point: Option<Coordinates>,
        total_distance_km: f64,
    ) -> Result<(), Error> {
        match self.status {
            Status::InProgress => {
                self.status = Status::Finalized {
                    end_point,
                    ended_at: Utc::now(),
                    total_distance_km,
                };
                Ok(())
            }
            Status::Finalized { .. } => Err(already_finalized_error()),
        }
    }
}

/// An in-progress ride together with the most recent point recorded for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveRide {
    pub ride: Ride,
    pub last_point: Option<RidePoint>,
}

#[cfg(test)]
fn new_ride() -> Ride {
    Ride::new(NewRide {
        staff_id: 7,
        mission_id: 42,
        vehicle_type: "bike".into(),
        start_point: Coordinates::new(12.97, 77.59),
    })
    .unwrap()
}

#[test]
fn new_ride_is_in_progress_test() {
    let ride = new_ride();

    assert!(!ride.is_finalized());
    assert_eq!(ride.status.name(), "in_progress");
    assert_eq!(ride.end_point(), None);
    assert_eq!(ride.total_distance_km(), None);
}

#[test]
fn new_ride_validation_test() {
    let bad_start = Ride::new(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "car".into(),
        start_point: Coordinates::new(95.0, 0.0),
    });
    assert_eq!(bad_start.unwrap_err().code, crate::error::VALIDATION);

    let no_vehicle = Ride::new(NewRide {
        staff_id: 1,
        mission_id: 1,
        vehicle_type: "  ".into(),
        start_point: Coordinates::new(0.0, 0.0),
    });
    assert_eq!(no_vehicle.unwrap_err().code, crate::error::VALIDATION);
}

#[test]
fn finalize_once_test() {
    let mut ride = new_ride();
    let end = Coordinates::new(13.0, 77.6);

    ride.finalize(Some(end), 4.2).unwrap();

    assert!(ride.is_finalized());
    assert_eq!(ride.status.name(), "finalized");
    assert_eq!(ride.end_point(), Some(end));
    assert_eq!(ride.total_distance_km(), Some(4.2));

    let err = ride.finalize(None, 99.0).unwrap_err();
    assert_eq!(err.code, crate::error::ALREADY_FINALIZED);
    assert_eq!(ride.end_point(), Some(end));
    assert_eq!(ride.total_distance_km(), Some(4.2));
}

#[test]
fn status_serialization_test() {
    let mut ride = new_ride();
    ride.finalize(None, 1.5).unwrap();

    let value = serde_json::to_value(&ride).unwrap();
    assert_eq!(value["status"]["name"], "finalized");
    assert_eq!(value["status"]["total_distance_km"], 1.5);

    let decoded: Ride = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, ride);
}

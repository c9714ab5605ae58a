use serde::{Deserialize, Serialize};

use crate::error::{validation_error, Error};

/// A WGS84 position in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(validation_error(format!("latitude out of range: {}", self.lat)));
        }

        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(validation_error(format!(
                "longitude out of range: {}",
                self.lng
            )));
        }

        Ok(())
    }
}

impl From<Coordinates> for String {
    fn from(coordinates: Coordinates) -> Self {
        format!("{},{}", coordinates.lat, coordinates.lng)
    }
}

#[test]
fn coordinates_validation_test() {
    assert!(Coordinates::new(0.0, 0.0).validate().is_ok());
    assert!(Coordinates::new(-90.0, 180.0).validate().is_ok());
    assert!(Coordinates::new(90.0, -180.0).validate().is_ok());

    assert!(Coordinates::new(90.5, 0.0).validate().is_err());
    assert!(Coordinates::new(0.0, -180.01).validate().is_err());
    assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
    assert!(Coordinates::new(0.0, f64::INFINITY).validate().is_err());
}

#[test]
fn coordinates_query_format_test() {
    let location: String = Coordinates::new(12.9716, 77.5946).into();

    assert_eq!(location, "12.9716,77.5946");
}

mod haversine;
mod local;
mod routing;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{configuration_error, Error};

pub use haversine::{great_circle_km, EARTH_RADIUS_KM};
pub use local::{local_estimate, path_length_km};
pub use routing::{meters_to_km, route_endpoints, routing_estimate, DynRouter, Route, RoutingService};

#[cfg(test)]
pub(crate) use routing::fakes;

/// How a ride's total distance is derived. Chosen per deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Sum of great-circle distances between recorded points.
    Local,
    /// Route distance between first and last location from a routing service.
    RoutingService,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Local
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::RoutingService => write!(f, "routing-service"),
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "routing-service" | "routing_service" => Ok(Self::RoutingService),
            other => Err(configuration_error(format!(
                "unknown distance strategy: {}",
                other
            ))),
        }
    }
}

pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

#[test]
fn strategy_parse_test() {
    assert_eq!("local".parse::<Strategy>().unwrap(), Strategy::Local);
    assert_eq!(
        "routing-service".parse::<Strategy>().unwrap(),
        Strategy::RoutingService
    );
    assert_eq!(
        " Routing_Service ".parse::<Strategy>().unwrap(),
        Strategy::RoutingService
    );

    let err = "osrm".parse::<Strategy>().unwrap_err();
    assert_eq!(err.code, crate::error::CONFIGURATION);
}

#[test]
fn strategy_serde_test() {
    let json = serde_json::to_string(&Strategy::RoutingService).unwrap();
    assert_eq!(json, "\"routing-service\"");

    let strategy: Strategy = serde_json::from_str("\"local\"").unwrap();
    assert_eq!(strategy, Strategy::Local);
    assert_eq!(Strategy::default(), Strategy::Local);
}

#[test]
fn round_km_test() {
    assert_eq!(round_km(222.389853), 222.39);
    assert_eq!(round_km(0.004), 0.0);
    assert_eq!(round_km(1.0), 1.0);
}

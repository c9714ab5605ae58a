use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    distance::{Route, RoutingService},
    entities::Coordinates,
    error::{
        no_route_found_error, upstream_rejected_error, upstream_unavailable_error, Error,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
    error_message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Leg {
    distance: TextValue,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TextValue {
    value: u64,
    text: Option<String>,
}

/// Google Maps Directions API client.
#[derive(Clone)]
pub struct GoogleMaps {
    client: reqwest::Client,
    api_base: String,
    key: String,
}

impl GoogleMaps {
    pub fn new(api_base: String, key: String, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base,
            key,
        })
    }

    fn directions_url(&self) -> String {
        if self.api_base.starts_with("http://") || self.api_base.starts_with("https://") {
            format!("{}/maps/api/directions/json", self.api_base)
        } else {
            format!("https://{}/maps/api/directions/json", self.api_base)
        }
    }
}

impl std::fmt::Debug for GoogleMaps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleMaps")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutingService for GoogleMaps {
    #[tracing::instrument(skip(self))]
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<Route, Error> {
        let origin: String = origin.into();
        let destination: String = destination.into();

        let res = self
            .client
            .get(self.directions_url())
            .query(&[("origin", origin)])
            .query(&[("destination", destination)])
            .query(&[("key", &self.key)])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 500 {
            return Err(upstream_unavailable_error());
        } else if status_code != 200 {
            return Err(upstream_rejected_error(format!("HTTP {}", status_code)));
        }

        let data: Response = res.json().await?;

        first_route(data)
    }
}

fn first_route(data: Response) -> Result<Route, Error> {
    if data.status == "ZERO_RESULTS" {
        return Err(no_route_found_error());
    }

    if data.status != "OK" {
        tracing::warn!(
            status = %data.status,
            error_message = ?data.error_message,
            "directions request rejected"
        );
        return Err(upstream_rejected_error(data.status));
    }

    let leg = data
        .routes
        .first()
        .and_then(|route| route.legs.first())
        .ok_or_else(no_route_found_error)?;

    Ok(Route {
        distance_meters: leg.distance.value,
    })
}

#[cfg(test)]
fn parse(body: &str) -> Result<Route, Error> {
    first_route(serde_json::from_str(body).unwrap())
}

#[test]
fn ok_response_test() {
    let body = r#"{
        "geocoded_waypoints": [],
        "routes": [
            {
                "summary": "Outer Ring Rd",
                "legs": [
                    {
                        "distance": { "text": "12.3 km", "value": 12345 },
                        "duration": { "text": "31 mins", "value": 1860 }
                    }
                ]
            },
            {
                "summary": "Hosur Rd",
                "legs": [
                    { "distance": { "text": "14.0 km", "value": 14020 } }
                ]
            }
        ],
        "status": "OK"
    }"#;

    assert_eq!(
        parse(body).unwrap(),
        Route {
            distance_meters: 12345
        }
    );
}

#[test]
fn zero_results_test() {
    let err = parse(r#"{ "routes": [], "status": "ZERO_RESULTS" }"#).unwrap_err();
    assert_eq!(err.code, crate::error::NO_ROUTE_FOUND);

    let err = parse(r#"{ "routes": [], "status": "OK" }"#).unwrap_err();
    assert_eq!(err.code, crate::error::NO_ROUTE_FOUND);

    let err = parse(r#"{ "routes": [ { "legs": [] } ], "status": "OK" }"#).unwrap_err();
    assert_eq!(err.code, crate::error::NO_ROUTE_FOUND);
}

#[test]
fn rejected_status_test() {
    let body = r#"{
        "error_message": "The provided API key is invalid.",
        "routes": [],
        "status": "REQUEST_DENIED"
    }"#;

    let err = parse(body).unwrap_err();
    assert_eq!(err.code, crate::error::UPSTREAM_REJECTED);
    assert_eq!(err.message, "REQUEST_DENIED");
}

#[test]
fn missing_routes_field_test() {
    let err = parse(r#"{ "status": "OVER_QUERY_LIMIT" }"#).unwrap_err();

    assert_eq!(err.code, crate::error::UPSTREAM_REJECTED);
    assert_eq!(err.message, "OVER_QUERY_LIMIT");
}

#[test]
fn directions_url_test() {
    let maps = GoogleMaps::new(
        "maps.googleapis.com".into(),
        "key".into(),
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(
        maps.directions_url(),
        "https://maps.googleapis.com/maps/api/directions/json"
    );

    let maps = GoogleMaps::new(
        "http://127.0.0.1:8080".into(),
        "key".into(),
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(
        maps.directions_url(),
        "http://127.0.0.1:8080/maps/api/directions/json"
    );
}

#[test]
fn unreachable_service_test() {
    use tokio_test::block_on;

    // nothing listens on port 1
    let maps = GoogleMaps::new(
        "http://127.0.0.1:1".into(),
        "key".into(),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = block_on(maps.route(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 1.0)))
        .unwrap_err();

    assert_eq!(err.code, crate::error::UPSTREAM_UNAVAILABLE);
}

//! staffsync - ride tracking and distance computation for field staff

use std::future::Future;

use argopt::{cmd_group, subcmd};
use serde::Serialize;
use uuid::Uuid;

use staffsync::api::{DistanceAPI, RideAPI};
use staffsync::config::Config;
use staffsync::engine::Engine;
use staffsync::entities::{Coordinates, NewRide};
use staffsync::error::{unexpected_error, validation_error, Error};

/// Ride tracking for field staff
#[cmd_group(commands = [start, record, end, points, active, distance])]
fn main() -> Result<(), String> {}

/// Start a ride and print it
#[subcmd]
fn start(
    staff_id: i64,
    mission_id: i64,
    vehicle_type: String,
    /// Start latitude, e.g. --lat=-33.86
    #[opt(long)]
    lat: f64,
    /// Start longitude
    #[opt(long)]
    lng: f64,
) -> Result<(), String> {
    run(|engine| async move {
        let ride = engine
            .start_ride(NewRide {
                staff_id,
                mission_id,
                vehicle_type,
                start_point: Coordinates::new(lat, lng),
            })
            .await?;

        print_json(&ride)
    })
}

/// Record a GPS point for an in-progress ride
#[subcmd]
fn record(
    ride_id: String,
    #[opt(long)]
    lat: f64,
    #[opt(long)]
    lng: f64,
) -> Result<(), String> {
    run(|engine| async move {
        let point = engine
            .record_point(parse_id(&ride_id)?, Coordinates::new(lat, lng), None)
            .await?;

        print_json(&point)
    })
}

/// End a ride, computing its total distance with the configured strategy
#[subcmd]
fn end(
    ride_id: String,
    /// End latitude. Defaults to the last recorded point
    #[opt(long)]
    lat: Option<f64>,
    /// End longitude
    #[opt(long)]
    lng: Option<f64>,
) -> Result<(), String> {
    run(|engine| async move {
        let end = match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            (None, None) => None,
            _ => return Err(validation_error("--lat and --lng must be given together")),
        };

        let ride = engine.end_ride(parse_id(&ride_id)?, end).await?;

        print_json(&ride)
    })
}

/// Print the recorded points of a ride in order
#[subcmd]
fn points(ride_id: String) -> Result<(), String> {
    run(|engine| async move {
        let points = engine.ride_points(parse_id(&ride_id)?).await?;

        print_json(&points)
    })
}

/// Print rides that have not ended, with their latest point
#[subcmd]
fn active() -> Result<(), String> {
    run(|engine| async move {
        let rides = engine.active_rides().await?;

        print_json(&rides)
    })
}

/// Compute a ride's distance so far without ending it
#[subcmd]
fn distance(
    ride_id: String,
    /// local or routing-service. Default: DISTANCE_STRATEGY
    #[opt(long)]
    strategy: Option<String>,
) -> Result<(), String> {
    run(|engine| async move {
        let strategy = match strategy {
            Some(strategy) => strategy.parse()?,
            None => engine.strategy(),
        };

        let km = engine
            .compute_ride_distance(parse_id(&ride_id)?, strategy)
            .await?;

        print_json(&serde_json::json!({
            "ride_id": ride_id,
            "strategy": strategy,
            "total_distance_km": km,
        }))
    })
}

fn run<F, Fut>(command: F) -> Result<(), String>
where
    F: FnOnce(Engine) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let config = Config::from_env().map_err(|e| e.to_string())?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed on start the runtime: {}", e))?;

    runtime
        .block_on(async {
            let engine = Engine::from_config(&config).await?;
            command(engine).await
        })
        .map_err(|e| e.to_string())
}

fn parse_id(id: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(id).map_err(|_| validation_error(format!("invalid ride id: {}", id)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value).map_err(unexpected_error)?;

    println!("{}", json);

    Ok(())
}

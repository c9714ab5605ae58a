use super::{haversine::great_circle_km, round_km};

use crate::entities::RidePoint;
use crate::error::{insufficient_data_error, Error};

/// Sum of the great-circle distances between consecutive points.
///
/// Points are taken in the order given. Fewer than two points measure 0.
pub fn path_length_km(points: &[RidePoint]) -> Result<f64, Error> {
    points.windows(2).try_fold(0.0, |total, pair| {
        Ok(total + great_circle_km(&pair[0].coordinates, &pair[1].coordinates)?)
    })
}

/// Distance frozen on a ride when it is finalized with the local strategy.
pub fn local_estimate(points: &[RidePoint]) -> Result<f64, Error> {
    if points.len() < 2 {
        return Err(insufficient_data_error());
    }

    Ok(round_km(path_length_km(points)?))
}

#[cfg(test)]
fn track(coordinates: &[(f64, f64)]) -> Vec<RidePoint> {
    use crate::entities::Coordinates;
    use chrono::{Duration, TimeZone, Utc};

    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    coordinates
        .iter()
        .enumerate()
        .map(|(i, (lat, lng))| {
            RidePoint::new(
                Coordinates::new(*lat, *lng),
                t0 + Duration::seconds(30 * i as i64),
            )
        })
        .collect()
}

#[test]
fn short_sequences_test() {
    assert_eq!(path_length_km(&[]).unwrap(), 0.0);
    assert_eq!(path_length_km(&track(&[(12.0, 77.0)])).unwrap(), 0.0);

    let err = local_estimate(&[]).unwrap_err();
    assert_eq!(err.code, crate::error::INSUFFICIENT_DATA);

    let err = local_estimate(&track(&[(12.0, 77.0)])).unwrap_err();
    assert_eq!(err.code, crate::error::INSUFFICIENT_DATA);
}

#[test]
fn pairwise_sum_test() {
    let points = track(&[
        (12.9716, 77.5946),
        (12.9784, 77.6408),
        (12.9352, 77.6245),
        (12.9141, 77.6101),
        (12.9716, 77.5946),
    ]);

    let mut expected = 0.0;
    for i in 1..points.len() {
        expected += great_circle_km(&points[i - 1].coordinates, &points[i].coordinates).unwrap();
    }

    assert!((path_length_km(&points).unwrap() - expected).abs() < 1e-9);
}

#[test]
fn appending_never_decreases_test() {
    let points = track(&[
        (12.9716, 77.5946),
        (12.9716, 77.5946),
        (12.9720, 77.5950),
        (12.9700, 77.5900),
        (-33.8688, 151.2093),
        (-33.8688, 151.2093),
        (51.5074, -0.1278),
    ]);

    let mut previous = 0.0;
    for n in 0..=points.len() {
        let total = path_length_km(&points[..n]).unwrap();
        assert!(total >= previous);
        previous = total;
    }
}

#[test]
fn three_point_example_test() {
    let points = track(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);

    let raw = path_length_km(&points).unwrap();
    assert!((raw - 222.38).abs() < 0.02);

    assert_eq!(local_estimate(&points).unwrap(), 222.39);
}

#[test]
fn invalid_point_test() {
    let points = track(&[(0.0, 0.0), (0.0, 190.0)]);

    let err = path_length_km(&points).unwrap_err();
    assert_eq!(err.code, crate::error::VALIDATION);
}

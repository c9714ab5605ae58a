use crate::entities::Coordinates;
use crate::error::Error;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two positions in kilometers.
pub fn great_circle_km(from: &Coordinates, to: &Coordinates) -> Result<f64, Error> {
    from.validate()?;
    to.validate()?;

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);

    // rounding can push `a` marginally past 1 for antipodal points
    let c = 2.0 * a.min(1.0).sqrt().asin();

    Ok(EARTH_RADIUS_KM * c)
}

#[test]
fn identical_points_test() {
    let p = Coordinates::new(12.9716, 77.5946);

    assert_eq!(great_circle_km(&p, &p).unwrap(), 0.0);
}

#[test]
fn symmetry_test() {
    let a = Coordinates::new(12.9716, 77.5946);
    let b = Coordinates::new(13.0827, 80.2707);

    let ab = great_circle_km(&a, &b).unwrap();
    let ba = great_circle_km(&b, &a).unwrap();

    assert!((ab - ba).abs() < 1e-9);
}

#[test]
fn one_degree_test() {
    let expected = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

    let along_equator =
        great_circle_km(&Coordinates::new(0.0, 0.0), &Coordinates::new(0.0, 1.0)).unwrap();
    let along_meridian =
        great_circle_km(&Coordinates::new(0.0, 1.0), &Coordinates::new(1.0, 1.0)).unwrap();

    assert!((along_equator - expected).abs() < 1e-9);
    assert!((along_meridian - expected).abs() < 1e-9);
    assert!((along_equator - 111.19).abs() < 0.01);
}

#[test]
fn antipodal_test() {
    let d = great_circle_km(&Coordinates::new(0.0, 0.0), &Coordinates::new(0.0, 180.0)).unwrap();

    assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);
}

#[test]
fn out_of_range_test() {
    let valid = Coordinates::new(0.0, 0.0);

    let err = great_circle_km(&valid, &Coordinates::new(91.0, 0.0)).unwrap_err();
    assert_eq!(err.code, crate::error::VALIDATION);

    let err = great_circle_km(&Coordinates::new(0.0, 200.0), &valid).unwrap_err();
    assert_eq!(err.code, crate::error::VALIDATION);
}

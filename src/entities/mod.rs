mod coordinates;
mod ride;
mod ride_point;

pub use coordinates::Coordinates;
pub use ride::{ActiveRide, NewRide, Ride, Status as RideStatus};
pub use ride_point::RidePoint;

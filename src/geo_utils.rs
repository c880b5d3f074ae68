//! Geographic utilities: great-circle distances, path length and the local
//! projection used by the spatial path index.

use geo::{Distance, Haversine, Point};

use crate::GpsPoint;

/// Mean Earth radius in meters (the radius `geo::Haversine` uses).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two GPS points in meters.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Haversine distance between two GPS points in kilometers.
pub fn haversine_distance_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_distance(p1, p2) / 1000.0
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert a distance in meters to an approximate latitude span in degrees.
pub fn meters_to_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

/// Equirectangular projection around a reference latitude.
///
/// Gives planar coordinates in meters that preserve nearest-neighbour order
/// well at city scale, which is all the path index needs.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    cos_ref_lat: f64,
}

impl LocalProjection {
    pub fn new(ref_latitude: f64) -> Self {
        Self {
            cos_ref_lat: ref_latitude.to_radians().cos(),
        }
    }

    /// Project a point to `[x, y]` meters.
    pub fn project(&self, p: &GpsPoint) -> [f64; 2] {
        [
            p.longitude.to_radians() * self.cos_ref_lat * EARTH_RADIUS_M,
            p.latitude.to_radians() * EARTH_RADIUS_M,
        ]
    }
}

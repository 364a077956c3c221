//! Globe math for positions and local-frame conversions.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Spatial tolerance for treating two positions as the same graph node.
pub const POSITION_EPSILON_M: f64 = 1e-3;

/// A geographic position on the reference globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub altitude_m: f64,
}

impl Position {
    pub fn new(lat_deg: f64, lon_deg: f64, altitude_m: f64) -> Self {
        Self {
            lat_deg,
            lon_deg,
            altitude_m,
        }
    }

    /// Quantized key for positional equality and hashing.
    pub fn precision(&self) -> PrecisionPosition {
        PrecisionPosition::from(self)
    }
}

/// Epsilon-quantized position used as a graph-node identity.
///
/// Two waypoints at the same quantized position are the same node,
/// regardless of how they were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrecisionPosition {
    lat_e7: i64,
    lon_e7: i64,
    alt_mm: i64,
}

impl From<&Position> for PrecisionPosition {
    fn from(position: &Position) -> Self {
        Self {
            lat_e7: (position.lat_deg * 1e7).round() as i64,
            lon_e7: (position.lon_deg * 1e7).round() as i64,
            alt_mm: (position.altitude_m * 1e3).round() as i64,
        }
    }
}

/// Spherical globe model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Globe {
    pub radius_m: f64,
}

impl Default for Globe {
    fn default() -> Self {
        Self {
            radius_m: EARTH_RADIUS_M,
        }
    }
}

impl Globe {
    /// Great-circle distance between two points in meters (Haversine formula).
    pub fn haversine_distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let phi1 = lat1.to_radians();
        let phi2 = lat2.to_radians();
        let dphi = (lat2 - lat1).to_radians();
        let dlambda = (lon2 - lon1).to_radians();
        let a = (dphi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * self.radius_m * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Slant distance between two positions: great-circle ground track
    /// combined with the altitude difference. Terrain is not followed.
    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        let ground = self.haversine_distance(a.lat_deg, a.lon_deg, b.lat_deg, b.lon_deg);
        let dalt = b.altitude_m - a.altitude_m;
        (ground * ground + dalt * dalt).sqrt()
    }

    /// Calculate bearing from point 1 to point 2 in radians.
    /// Returns bearing in radians, 0 = north, pi/2 = east.
    pub fn bearing(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let phi1 = lat1.to_radians();
        let phi2 = lat2.to_radians();
        let delta_lambda = (lon2 - lon1).to_radians();

        let x = delta_lambda.sin() * phi2.cos();
        let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

        x.atan2(y)
    }

    /// Offset a position by distance and bearing.
    pub fn offset_by_bearing(
        &self,
        lat: f64,
        lon: f64,
        distance_m: f64,
        bearing_rad: f64,
    ) -> (f64, f64) {
        if distance_m.abs() <= f64::EPSILON {
            return (lat, lon);
        }

        let lat1 = lat.to_radians();
        let lon1 = lon.to_radians();
        let angular_distance = distance_m / self.radius_m;

        let sin_lat1 = lat1.sin();
        let cos_lat1 = lat1.cos();
        let sin_ad = angular_distance.sin();
        let cos_ad = angular_distance.cos();

        let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
        let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

        let y = bearing_rad.sin() * sin_ad * cos_lat1;
        let x = cos_ad - sin_lat1 * sin_lat2;
        let mut lon2 = lon1 + y.atan2(x);
        lon2 = (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI)
            - std::f64::consts::PI;

        (lat2.to_degrees(), lon2.to_degrees())
    }

    /// A position is outside the globe when it lies below the reference
    /// surface; such positions are rejected by the sampling planners.
    pub fn is_below_surface(&self, position: &Position) -> bool {
        position.altitude_m < 0.0
    }
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// East-North-Up frame anchored at a reference position.
///
/// All box, grid and segment geometry is expressed in this frame; positions
/// convert through it for Cartesian math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    pub origin: Position,
    pub globe: Globe,
}

impl LocalFrame {
    pub fn new(origin: Position, globe: Globe) -> Self {
        Self { origin, globe }
    }

    /// Convert a position to (east, north, up) meters relative to the origin.
    pub fn to_local(&self, position: &Position) -> Point3<f64> {
        let east = (position.lon_deg - self.origin.lon_deg) * meters_per_deg_lon(self.origin.lat_deg);
        let north = (position.lat_deg - self.origin.lat_deg) * meters_per_deg_lat(self.origin.lat_deg);
        let up = position.altitude_m - self.origin.altitude_m;
        Point3::new(east, north, up)
    }

    /// Convert (east, north, up) meters back to a geographic position.
    pub fn from_local(&self, point: &Point3<f64>) -> Position {
        let lon = self.origin.lon_deg + point.x / meters_per_deg_lon(self.origin.lat_deg).max(1e-9);
        let lat = self.origin.lat_deg + point.y / meters_per_deg_lat(self.origin.lat_deg).max(1e-9);
        Position::new(lat, lon, self.origin.altitude_m + point.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let globe = Globe::default();
        let dist = globe.haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn haversine_same_point() {
        let globe = Globe::default();
        let dist = globe.haversine_distance(33.6846, -117.8265, 33.6846, -117.8265);
        assert!(dist < 0.001);
    }

    #[test]
    fn slant_distance_includes_altitude() {
        let globe = Globe::default();
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(0.0, 0.0, 300.0);
        assert_relative_eq!(globe.distance(&a, &b), 300.0, epsilon = 1e-9);
    }

    #[test]
    fn local_frame_round_trip() {
        let frame = LocalFrame::new(Position::new(48.0, -123.0, 50.0), Globe::default());
        let p = Position::new(48.01, -122.99, 120.0);
        let back = frame.from_local(&frame.to_local(&p));
        assert_relative_eq!(back.lat_deg, p.lat_deg, epsilon = 1e-9);
        assert_relative_eq!(back.lon_deg, p.lon_deg, epsilon = 1e-9);
        assert_relative_eq!(back.altitude_m, p.altitude_m, epsilon = 1e-9);
    }

    #[test]
    fn precision_position_merges_nearby() {
        let a = Position::new(10.0, 20.0, 100.0);
        let b = Position::new(10.0 + 1e-9, 20.0, 100.0);
        assert_eq!(a.precision(), b.precision());
    }
}

use serde::{Deserialize, Serialize};

const R_EARTH_KM: f64 = 6371.0;

#[derive(Clone, Copy, Debug, PartialEq, Default, Deserialize, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl From<GeoPoint> for geo_types::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo_types::Point::new(p.lng, p.lat)
    }
}

impl From<GeoPoint> for geo_types::Coord<f64> {
    fn from(p: GeoPoint) -> Self {
        geo_types::coord! { x: p.lng, y: p.lat }
    }
}

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * R_EARTH_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Projects a point onto the unit sphere. Squared chord length between two
/// projected points is monotonic in their great-circle distance, so a
/// Euclidean k-d tree over these coordinates answers nearest-neighbour
/// queries in the same order as `distance_km`.
pub(crate) fn to_unit(p: GeoPoint) -> [f64; 3] {
    let (lat, lon) = (p.lat.to_radians(), p.lng.to_radians());
    let (clat, clon, slat, slon) = (lat.cos(), lon.cos(), lat.sin(), lon.sin());
    [clat * clon, clat * slon, slat]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(37.5547, 126.9706);
        let b = GeoPoint::new(37.4979, 127.0276);

        assert_eq!(distance_km(a, b), distance_km(b, a));
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = GeoPoint::new(37.5547, 126.9706);
        assert_eq!(distance_km(a, a), 0.0);
    }

    #[test]
    fn seoul_station_to_gangnam() {
        // Roughly 8 km as the crow flies
        let seoul = GeoPoint::new(37.5547, 126.9706);
        let gangnam = GeoPoint::new(37.4979, 127.0276);

        let d = distance_km(seoul, gangnam);
        assert!((d - 8.1).abs() < 0.3, "got {d}");
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert_relative_eq!(d, 111.19, epsilon = 0.01);
    }

    #[test]
    fn unit_projection_has_unit_length() {
        let [x, y, z] = to_unit(GeoPoint::new(37.5, 127.0));
        assert_relative_eq!(x * x + y * y + z * z, 1.0, epsilon = 1e-12);
    }
}

//! Contracts for the lookups the engine does not own: geocoding, the
//! authoritative nearest-station lookup, and reachable-station contours.

pub mod http;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use crate::{contour::coerce_f64, geo::GeoPoint};

pub use http::{HttpServices, LookupError};

/// Station closest to a coordinate, as reported by the upstream service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearestStation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub distance_km: Option<f64>,
}

impl NearestStation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Accepts numeric strings for the coordinates, and either `distance_km`
    /// or `distance` for the distance.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_owned(),
            lat: value.get("lat").and_then(coerce_f64)?,
            lng: value.get("lng").and_then(coerce_f64)?,
            distance_km: value
                .get("distance_km")
                .or_else(|| value.get("distance"))
                .and_then(coerce_f64),
        })
    }
}

/// Parses a geocoder answer of the form `{ "lat": .., "lng": .. }` where either
/// field may be a number or a decimal string.
pub fn coordinate_from_value(value: &Value) -> Option<GeoPoint> {
    let lat = value.get("lat").and_then(coerce_f64)?;
    let lng = value.get("lng").and_then(coerce_f64)?;
    Some(GeoPoint::new(lat, lng))
}

pub trait StationServices {
    type Error: std::fmt::Display + Send;

    fn geocode(&self, address: &str)
    -> impl Future<Output = Result<GeoPoint, Self::Error>> + Send;

    fn nearest_station(
        &self,
        point: GeoPoint,
    ) -> impl Future<Output = Result<NearestStation, Self::Error>> + Send;

    /// Raw contour payload for one spelling of a station name. The caller
    /// validates it.
    fn contour_data(
        &self,
        station_name: &str,
    ) -> impl Future<Output = Result<Value, Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nearest_station_accepts_string_coordinates() {
        let v = json!({ "name": "시청", "lat": "37.5657", "lng": "126.9769", "distance_km": 0.42 });
        let s = NearestStation::from_value(&v).unwrap();

        assert_eq!(s.name, "시청");
        assert_eq!(s.point(), GeoPoint::new(37.5657, 126.9769));
        assert_eq!(s.distance_km, Some(0.42));
    }

    #[test]
    fn nearest_station_falls_back_to_distance_field() {
        let v = json!({ "name": "시청", "lat": 37.5, "lng": 127.0, "distance": "1.5" });
        assert_eq!(NearestStation::from_value(&v).unwrap().distance_km, Some(1.5));
    }

    #[test]
    fn nearest_station_requires_name_and_coordinates() {
        assert!(NearestStation::from_value(&json!({ "lat": 37.5, "lng": 127.0 })).is_none());
        assert!(NearestStation::from_value(&json!({ "name": " ", "lat": 37.5, "lng": 127.0 })).is_none());
        assert!(NearestStation::from_value(&json!({ "name": "A", "lat": null, "lng": 127.0 })).is_none());
        assert!(NearestStation::from_value(&json!({ "error": "not found" })).is_none());
    }

    #[test]
    fn coordinate_parsing() {
        assert_eq!(
            coordinate_from_value(&json!({ "lat": "37.5", "lng": 127 })),
            Some(GeoPoint::new(37.5, 127.0))
        );
        assert_eq!(coordinate_from_value(&json!({ "lat": "", "lng": 127 })), None);
        assert_eq!(coordinate_from_value(&json!({ "error": "no match" })), None);
    }
}

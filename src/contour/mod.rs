//! Reachable-station payloads as returned by the contour-data service.
//!
//! A payload maps a time-band label (`"10"`, `"20 min"`, ...) to the stations
//! reachable within that band. Bands are kept in document order because the
//! first occurrence of a station name wins when the catalog is deduplicated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod catalog;
pub mod names;

pub use catalog::{Station, build_catalog, time_by_name, union_geometry};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("contour payload is not a JSON object")]
    NotAnObject,

    #[error("contour payload is empty")]
    Empty,

    #[error("contour payload carries an error marker: {0}")]
    ErrorMarker(String),

    #[error("no time band carries a station array")]
    NoStations,
}

/// One station entry exactly as it appeared in the payload. Coordinates and
/// time are left uncoerced; `catalog` decides which records are usable.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct StationRecord {
    pub name: String,
    #[serde(default)]
    pub lat: Value,
    #[serde(default)]
    pub lng: Value,
    #[serde(default)]
    pub time: Value,
}

impl StationRecord {
    /// Numeric names are taken as their decimal text. `None` when the entry is
    /// not an object or has no usable name.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = match value.get("name")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let field = |key: &str| value.get(key).cloned().unwrap_or_default();

        Some(Self {
            name,
            lat: field("lat"),
            lng: field("lng"),
            time: field("time"),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeBand {
    pub label: String,
    pub time_limit: Option<f64>,
    pub stations: Vec<StationRecord>,
    pub count: usize,
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
}

impl TimeBand {
    fn from_value(label: &str, value: &Value) -> Self {
        let stations: Vec<StationRecord> = value
            .get("stations")
            .and_then(Value::as_array)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| {
                        let record = StationRecord::from_value(r);
                        if record.is_none() {
                            tracing::debug!(band = label, entry = %r, "skipping station entry without a name");
                        }
                        record
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = value
            .get("count")
            .and_then(Value::as_u64)
            .map(|c| c as usize)
            .unwrap_or(stations.len());

        if count != stations.len() {
            tracing::debug!(
                band = label,
                count,
                parsed = stations.len(),
                "band count disagrees with parsed stations"
            );
        }

        Self {
            label: label.to_owned(),
            time_limit: value.get("time_limit").and_then(coerce_f64),
            count,
            center_lat: value.get("center_lat").and_then(coerce_f64),
            center_lng: value.get("center_lng").and_then(coerce_f64),
            stations,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContourDataset {
    pub bands: Vec<TimeBand>,
}

impl ContourDataset {
    /// Validates a raw payload and parses it. Individual malformed station
    /// entries are skipped rather than failing the whole payload.
    pub fn from_value(value: &Value) -> Result<Self, DatasetError> {
        let map = validate(value)?;
        let bands = map
            .iter()
            .map(|(label, band)| TimeBand::from_value(label, band))
            .collect();

        Ok(Self { bands })
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Ok(Self::from_value(&value)?)
    }

    /// All station records across every band, in document order.
    pub fn records(&self) -> impl Iterator<Item = &StationRecord> {
        self.bands.iter().flat_map(|b| b.stations.iter())
    }

    /// Whether at least one record survives numeric coercion.
    pub fn has_stations(&self) -> bool {
        self.records().any(|r| r.to_station().is_some())
    }
}

/// Shape check for a contour-data response: a non-empty object without an
/// `error` field where at least one band has a `stations` array.
pub fn is_valid_contour_data(value: &Value) -> bool {
    validate(value).is_ok()
}

fn validate(value: &Value) -> Result<&Map<String, Value>, DatasetError> {
    let map = value.as_object().ok_or(DatasetError::NotAnObject)?;

    if let Some(marker) = map.get("error") {
        let message = match marker {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(DatasetError::ErrorMarker(message));
    }

    if map.is_empty() {
        return Err(DatasetError::Empty);
    }

    let has_stations = map
        .values()
        .any(|band| band.get("stations").is_some_and(Value::is_array));

    if !has_stations {
        return Err(DatasetError::NoStations);
    }

    Ok(map)
}

/// Numeric coercion for loosely typed payload fields: numbers pass through,
/// numeric strings are parsed, anything else is rejected. Non-finite results
/// are rejected too.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_is_invalid() {
        assert!(!is_valid_contour_data(&json!({})));
    }

    #[test]
    fn error_marker_is_invalid() {
        assert!(!is_valid_contour_data(&json!({ "error": "x" })));
        assert_eq!(
            ContourDataset::from_value(&json!({ "error": "x" })),
            Err(DatasetError::ErrorMarker("x".into()))
        );
    }

    #[test]
    fn single_band_with_stations_is_valid() {
        let payload = json!({
            "10": { "stations": [{ "name": "A", "lat": 1, "lng": 1, "time": 5 }], "count": 1 }
        });
        assert!(is_valid_contour_data(&payload));
    }

    #[test]
    fn non_objects_are_invalid() {
        assert!(!is_valid_contour_data(&json!(null)));
        assert!(!is_valid_contour_data(&json!([1, 2, 3])));
        assert!(!is_valid_contour_data(&json!("10")));
    }

    #[test]
    fn bands_without_station_arrays_are_invalid() {
        let payload = json!({ "10": { "count": 0 }, "20": { "stations": null } });
        assert_eq!(
            ContourDataset::from_value(&payload),
            Err(DatasetError::NoStations)
        );
    }

    #[test]
    fn bands_keep_document_order() {
        let payload = json!({
            "30": { "time_limit": 30, "stations": [], "count": 0 },
            "10": { "time_limit": 10, "stations": [], "count": 0 },
            "20": { "time_limit": "20", "stations": [], "count": 0 },
        });
        let dataset = ContourDataset::from_value(&payload).unwrap();

        let labels: Vec<_> = dataset.bands.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["30", "10", "20"]);
        assert_eq!(dataset.bands[2].time_limit, Some(20.0));
    }

    #[test]
    fn unparseable_records_are_skipped() {
        let payload = json!({
            "10": {
                "stations": [
                    { "name": "A", "lat": 37.5, "lng": 127.0, "time": 5 },
                    { "lat": 37.5, "lng": 127.0, "time": 5 },
                    42
                ],
                "count": 3,
                "center_lat": "37.5"
            }
        });
        let dataset = ContourDataset::from_value(&payload).unwrap();

        assert_eq!(dataset.records().count(), 1);
        assert_eq!(dataset.bands[0].count, 3);
        assert_eq!(dataset.bands[0].center_lat, Some(37.5));
        assert_eq!(dataset.bands[0].center_lng, None);
    }

    #[test]
    fn numeric_names_are_kept() {
        let payload = json!({
            "10": { "stations": [
                { "name": 2, "lat": 37.5, "lng": 127.0, "time": 5 },
                { "name": null, "lat": 37.5, "lng": 127.0, "time": 5 },
                { "name": "B", "lat": "37.6" },
            ], "count": 3 }
        });
        let dataset = ContourDataset::from_value(&payload).unwrap();
        let records: Vec<_> = dataset.records().collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "2");
        assert!(records[0].to_station().is_some());
        assert_eq!(records[1].lng, Value::Null);
        assert!(records[1].to_station().is_none());
    }

    #[test]
    fn coercion() {
        assert_eq!(coerce_f64(&json!(1.5)), Some(1.5));
        assert_eq!(coerce_f64(&json!(" 37.25 ")), Some(37.25));
        assert_eq!(coerce_f64(&json!("")), None);
        assert_eq!(coerce_f64(&json!("abc")), None);
        assert_eq!(coerce_f64(&json!(null)), None);
        assert_eq!(coerce_f64(&json!(true)), None);
        assert_eq!(coerce_f64(&json!("NaN")), None);
        assert_eq!(coerce_f64(&json!("inf")), None);
    }
}

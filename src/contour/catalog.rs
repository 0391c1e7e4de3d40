use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{
    contour::{ContourDataset, StationRecord, coerce_f64, names},
    geo::GeoPoint,
};

/// A station sample with coerced, finite coordinates and travel time (minutes
/// from the dataset's implicit origin).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Station {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub time: f64,
}

impl Station {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64, time: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            time,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

impl StationRecord {
    /// `None` when any of lat, lng or time is not a finite number.
    pub fn to_station(&self) -> Option<Station> {
        let lat = coerce_f64(&self.lat)?;
        let lng = coerce_f64(&self.lng)?;
        let time = coerce_f64(&self.time)?;

        Some(Station::new(self.name.clone(), lat, lng, time))
    }
}

/// Flattens every band into a station list, dropping records whose
/// coordinates or time are not finite numbers. With `dedupe`, only the first
/// occurrence of each name (in band order) is kept.
pub fn build_catalog(dataset: &ContourDataset, dedupe: bool) -> Vec<Station> {
    let mut seen = HashSet::new();
    let mut dropped = 0usize;

    let stations: Vec<Station> = dataset
        .records()
        .filter_map(|r| {
            let station = r.to_station();
            if station.is_none() {
                dropped += 1;
            }
            station
        })
        .filter(|s| !dedupe || seen.insert(names::normalize(&s.name).to_owned()))
        .collect();

    if dropped > 0 {
        tracing::debug!(dropped, kept = stations.len(), "dropped malformed station samples");
    }

    stations
}

/// One representative travel time per station name: the minimum over every
/// band the station appears in. Only the time needs to be finite here.
pub fn time_by_name(dataset: &ContourDataset) -> HashMap<String, f64> {
    let mut times: HashMap<String, f64> = HashMap::new();

    for record in dataset.records() {
        let Some(time) = coerce_f64(&record.time) else {
            continue;
        };

        times
            .entry(names::normalize(&record.name).to_owned())
            .and_modify(|t| *t = t.min(time))
            .or_insert(time);
    }

    times
}

/// Name-deduplicated geometry across several datasets; on a name collision the
/// earlier dataset's coordinates win.
pub fn union_geometry<'a>(datasets: impl IntoIterator<Item = &'a ContourDataset>) -> Vec<Station> {
    let mut seen = HashSet::new();

    datasets
        .into_iter()
        .flat_map(|d| build_catalog(d, true))
        .filter(|s| seen.insert(names::normalize(&s.name).to_owned()))
        .collect()
}

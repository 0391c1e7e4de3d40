use serde::Serialize;

use crate::{
    accessibility::{Surface, nearest::travel_time},
    contour::ContourDataset,
    geo::GeoPoint,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub name: String,
    pub station: GeoPoint,
    pub time_minutes: f64,
    pub distance_km: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SumProbe {
    pub name: String,
    pub station: GeoPoint,
    pub t1: f64,
    pub t2: f64,
    /// `t1 + t2` rounded to whole minutes; the components are left as-is.
    pub sum: f64,
    pub distance_km: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ProbeResult {
    Single(Probe),
    Sum(SumProbe),
}

impl ProbeResult {
    pub fn name(&self) -> &str {
        match self {
            ProbeResult::Single(p) => &p.name,
            ProbeResult::Sum(p) => &p.name,
        }
    }

    pub fn station(&self) -> GeoPoint {
        match self {
            ProbeResult::Single(p) => p.station,
            ProbeResult::Sum(p) => p.station,
        }
    }

    /// Headline figure: the travel time in single mode, the rounded sum in
    /// sum mode.
    pub fn time_minutes(&self) -> f64 {
        match self {
            ProbeResult::Single(p) => p.time_minutes,
            ProbeResult::Sum(p) => p.sum,
        }
    }

    pub fn distance_km(&self) -> f64 {
        match self {
            ProbeResult::Single(p) => p.distance_km,
            ProbeResult::Sum(p) => p.distance_km,
        }
    }
}

/// A probe the user fixed in place by clicking.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedProbe {
    pub query_point: GeoPoint,
    pub nearest_station_name: String,
    pub nearest_station_point: GeoPoint,
    pub time_minutes: f64,
    pub distance_km: f64,
}

impl PinnedProbe {
    pub fn new(query_point: GeoPoint, probe: &ProbeResult) -> Self {
        Self {
            query_point,
            nearest_station_name: probe.name().to_owned(),
            nearest_station_point: probe.station(),
            time_minutes: probe.time_minutes(),
            distance_km: probe.distance_km(),
        }
    }
}

impl Surface {
    /// Point lookup with the same semantics as a raster cell centred on
    /// `point`. `None` when the surface has no stations.
    pub fn probe(&self, point: GeoPoint) -> Option<ProbeResult> {
        let nearest = self.nearest(point)?;
        let name = nearest.station.name.clone();
        let station = nearest.station.point();
        let distance_km = nearest.distance_km;

        let result = match self.sum_times(&name) {
            None => ProbeResult::Single(Probe {
                time_minutes: travel_time(Some(nearest)),
                name,
                station,
                distance_km,
            }),
            Some(times) => ProbeResult::Sum(SumProbe {
                sum: times.rounded_sum(),
                t1: times.t1,
                t2: times.t2,
                name,
                station,
                distance_km,
            }),
        };

        Some(result)
    }
}

pub fn probe(point: GeoPoint, dataset: &ContourDataset) -> Option<Probe> {
    match Surface::single(dataset).probe(point)? {
        ProbeResult::Single(p) => Some(p),
        ProbeResult::Sum(_) => None,
    }
}

pub fn probe_sum(point: GeoPoint, first: &ContourDataset, second: &ContourDataset) -> Option<SumProbe> {
    match Surface::sum(first, second).probe(point)? {
        ProbeResult::Sum(p) => Some(p),
        ProbeResult::Single(_) => None,
    }
}

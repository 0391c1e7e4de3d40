use std::collections::HashSet;

use kiddo::{SquaredEuclidean, float::kdtree};

use crate::{
    contour::Station,
    geo::{GeoPoint, distance_km, to_unit},
};

/// Query points this close to a station are treated as being at the station.
pub const SNAP_RADIUS_KM: f64 = 0.1;

/// Travel time assumed when nothing is known about a location.
pub const DEFAULT_TRAVEL_TIME: f64 = 60.0;

// Relative slack on the squared chord when collecting tie candidates.
const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Nearest<'a> {
    pub station: &'a Station,
    pub distance_km: f64,
}

/// Closest station by great-circle distance. On exact ties the station that
/// comes first in `stations` wins.
pub fn nearest(point: GeoPoint, stations: &[Station]) -> Option<Nearest<'_>> {
    let mut best: Option<Nearest> = None;

    for station in stations {
        let d = distance_km(point, station.point());
        if best.is_none_or(|b| d < b.distance_km) {
            best = Some(Nearest {
                station,
                distance_km: d,
            });
        }
    }

    best
}

/// Travel time carried by the nearest station, `0` inside the snap radius and
/// `DEFAULT_TRAVEL_TIME` when there is no station at all.
pub fn nearest_with_travel_time(point: GeoPoint, stations: &[Station]) -> f64 {
    travel_time(nearest(point, stations))
}

pub(crate) fn travel_time(nearest: Option<Nearest>) -> f64 {
    match nearest {
        None => DEFAULT_TRAVEL_TIME,
        Some(n) if n.distance_km < SNAP_RADIUS_KM => 0.0,
        Some(n) => n.station.time,
    }
}

/// k-d tree over station positions on the unit sphere. Answers the same
/// queries as [`nearest`], tie-break included, without scanning every station.
pub struct StationIndex {
    tree: kdtree::KdTree<f64, usize, 3, 32, u32>,
    stations: Vec<Station>,
}

impl Default for StationIndex {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

/// Only the first station at each position goes into the tree. Later ones
/// at the same spot lose every tie, and a leaf can hold only a bounded number
/// of coincident points.
impl From<Vec<Station>> for StationIndex {
    fn from(stations: Vec<Station>) -> Self {
        let mut tree = kdtree::KdTree::new();
        let mut occupied = HashSet::new();

        for (i, station) in stations.iter().enumerate() {
            let position = to_unit(station.point());
            if occupied.insert(position.map(f64::to_bits)) {
                tree.add(&position, i);
            }
        }

        Self { tree, stations }
    }
}

impl StationIndex {
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn nearest(&self, point: GeoPoint) -> Option<Nearest<'_>> {
        if self.stations.is_empty() {
            return None;
        }

        let query = to_unit(point);
        let closest = self.tree.nearest_one::<SquaredEuclidean>(&query);

        // Chord order and haversine order can disagree in the last few ulps,
        // so re-rank everything that is within rounding of the k-d tree's pick.
        let radius = closest.distance * (1.0 + TIE_TOLERANCE) + f64::EPSILON;

        self.tree
            .within::<SquaredEuclidean>(&query, radius)
            .into_iter()
            .map(|n| (n.item, distance_km(point, self.stations[n.item].point())))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(i, d)| Nearest {
                station: &self.stations[i],
                distance_km: d,
            })
    }

    pub fn nearest_with_travel_time(&self, point: GeoPoint) -> f64 {
        travel_time(self.nearest(point))
    }
}

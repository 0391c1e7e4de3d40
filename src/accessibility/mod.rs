use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    contour::{ContourDataset, Station, build_catalog, names, time_by_name, union_geometry},
    geo::GeoPoint,
};

pub mod classify;
pub mod nearest;
pub mod probe;
pub mod raster;

pub use classify::{Color, LegendEntry, Mode, classify, legend};
pub use nearest::{DEFAULT_TRAVEL_TIME, Nearest, SNAP_RADIUS_KM, StationIndex};
pub use probe::{PinnedProbe, Probe, ProbeResult, SumProbe, probe, probe_sum};
pub use raster::{GridCell, RasterOptions, rasterize, rasterize_sum, to_feature_collection};

/// What the overlay is computed from: one origin's reachable stations, or two
/// origins combined by summing their travel times.
#[derive(Clone, Debug, PartialEq)]
pub enum Accessibility {
    Single(Arc<ContourDataset>),
    Dual(Arc<ContourDataset>, Arc<ContourDataset>),
}

impl Accessibility {
    /// Picks the mode from whichever datasets are present. A dataset without a
    /// single usable station counts as absent.
    pub fn from_datasets(
        first: Option<Arc<ContourDataset>>,
        second: Option<Arc<ContourDataset>>,
    ) -> Option<Self> {
        let usable = |d: Option<Arc<ContourDataset>>| d.filter(|d| d.has_stations());

        match (usable(first), usable(second)) {
            (Some(a), Some(b)) => Some(Accessibility::Dual(a, b)),
            (Some(d), None) | (None, Some(d)) => Some(Accessibility::Single(d)),
            (None, None) => None,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Accessibility::Single(_) => Mode::Single,
            Accessibility::Dual(..) => Mode::Sum,
        }
    }

    pub fn surface(&self) -> Surface {
        match self {
            Accessibility::Single(d) => Surface::single(d),
            Accessibility::Dual(a, b) => Surface::sum(a, b),
        }
    }
}

/// Everything the raster and probe paths need, derived once per dataset
/// change. Immutable after construction and safe to share between threads.
pub struct Surface {
    index: StationIndex,
    times: Times,
}

enum Times {
    Single,
    Sum {
        first: HashMap<String, f64>,
        second: HashMap<String, f64>,
    },
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("mode", &self.mode())
            .field("stations", &self.index.stations().len())
            .finish()
    }
}

/// Per-origin travel times for one station in sum mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SumTimes {
    pub t1: f64,
    pub t2: f64,
}

impl SumTimes {
    pub fn rounded_sum(&self) -> f64 {
        (self.t1 + self.t2).round()
    }
}

impl Surface {
    pub fn single(dataset: &ContourDataset) -> Self {
        Self {
            index: StationIndex::from(build_catalog(dataset, true)),
            times: Times::Single,
        }
    }

    /// Union geometry of both datasets, with travel times looked up by name
    /// per origin. Empty when either dataset has no usable station.
    pub fn sum(first: &ContourDataset, second: &ContourDataset) -> Self {
        let index = if first.has_stations() && second.has_stations() {
            StationIndex::from(union_geometry([first, second]))
        } else {
            StationIndex::default()
        };

        Self {
            index,
            times: Times::Sum {
                first: time_by_name(first),
                second: time_by_name(second),
            },
        }
    }

    pub fn mode(&self) -> Mode {
        match self.times {
            Times::Single => Mode::Single,
            Times::Sum { .. } => Mode::Sum,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stations(&self) -> &[Station] {
        self.index.stations()
    }

    pub fn nearest(&self, point: GeoPoint) -> Option<Nearest<'_>> {
        self.index.nearest(point)
    }

    /// Per-origin times for `name`; stations one origin never reaches default
    /// to `DEFAULT_TRAVEL_TIME` for that origin. `None` in single mode.
    pub(crate) fn sum_times(&self, name: &str) -> Option<SumTimes> {
        let Times::Sum { first, second } = &self.times else {
            return None;
        };

        let key = names::normalize(name);
        let lookup = |m: &HashMap<String, f64>| m.get(key).copied().unwrap_or(DEFAULT_TRAVEL_TIME);

        Some(SumTimes {
            t1: lookup(first),
            t2: lookup(second),
        })
    }

    /// The value painted at `point`: single-origin travel time, or the rounded
    /// sum of both origins' times.
    pub fn value_at(&self, point: GeoPoint) -> f64 {
        match self.times {
            Times::Single => self.index.nearest_with_travel_time(point),
            Times::Sum { .. } => self
                .nearest(point)
                .and_then(|n| self.sum_times(&n.station.name))
                .map(|t| t.rounded_sum())
                .unwrap_or(2.0 * DEFAULT_TRAVEL_TIME),
        }
    }
}

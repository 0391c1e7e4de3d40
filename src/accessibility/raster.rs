use geojson::{Feature, FeatureCollection, ser::serialize_geometry};
use itertools::{Itertools, MinMaxResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    accessibility::{Color, Mode, Surface, classify},
    contour::{ContourDataset, Station},
    geo::GeoPoint,
};

pub const DEFAULT_CELL_SIZE_DEG: f64 = 0.003;
pub const DEFAULT_PADDING_DEG: f64 = 0.02;

/// Upper bound on cells produced by a single rasterization.
pub const MAX_CELLS: usize = 4_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct RasterOptions {
    /// Cell edge length in degrees (≈300 m at the default).
    pub cell_size_deg: f64,
    /// Margin added around the stations' bounding box (≈2 km at the default).
    pub padding_deg: f64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            cell_size_deg: DEFAULT_CELL_SIZE_DEG,
            padding_deg: DEFAULT_PADDING_DEG,
        }
    }
}

impl RasterOptions {
    pub fn with_cell_size(cell_size_deg: f64) -> Self {
        Self {
            cell_size_deg,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridCell {
    /// Corners as (south, west), (north, west), (north, east), (south, east).
    pub bounds: [GeoPoint; 4],
    pub value: f64,
    pub color: Color,
}

impl GridCell {
    pub fn polygon(&self) -> geo_types::Polygon<f64> {
        let ring: Vec<geo_types::Coord<f64>> = self
            .bounds
            .iter()
            .chain(self.bounds.first())
            .map(|&p| p.into())
            .collect();

        geo_types::Polygon::new(geo_types::LineString::new(ring), vec![])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Area {
    south: f64,
    north: f64,
    west: f64,
    east: f64,
}

impl Area {
    fn around(stations: &[Station], padding: f64) -> Option<Self> {
        let (south, north) = match stations.iter().map(|s| s.lat).minmax_by(f64::total_cmp) {
            MinMaxResult::NoElements => return None,
            MinMaxResult::OneElement(x) => (x, x),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };
        let (west, east) = match stations.iter().map(|s| s.lng).minmax_by(f64::total_cmp) {
            MinMaxResult::NoElements => return None,
            MinMaxResult::OneElement(x) => (x, x),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };

        Some(Self {
            south: south - padding,
            north: north + padding,
            west: west - padding,
            east: east + padding,
        })
    }
}

impl Surface {
    /// Paints the padded bounding box of the surface's stations. Cells are
    /// ordered row by row, south to north, and west to east within a row.
    /// Each cell is evaluated independently.
    pub fn rasterize(&self, options: RasterOptions) -> Vec<GridCell> {
        let step = options.cell_size_deg;
        if !step.is_finite() || step <= 0.0 {
            tracing::warn!(step, "refusing to rasterize with a non-positive cell size");
            return vec![];
        }

        let Some(area) = Area::around(self.stations(), options.padding_deg.max(0.0)) else {
            return vec![];
        };

        let rows = steps(area.north - area.south, step);
        let cols = steps(area.east - area.west, step);
        if rows.checked_mul(cols).is_none_or(|n| n > MAX_CELLS) {
            tracing::warn!(rows, cols, step, "refusing to rasterize more than {MAX_CELLS} cells");
            return vec![];
        }

        let mode = self.mode();

        tracing::debug!(rows, cols, ?mode, "rasterizing");

        (0..rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                let south = area.south + row as f64 * step;
                (0..cols).map(move |col| {
                    let west = area.west + col as f64 * step;
                    self.cell(south, west, step, mode)
                })
            })
            .collect()
    }

    fn cell(&self, south: f64, west: f64, step: f64, mode: Mode) -> GridCell {
        let (north, east) = (south + step, west + step);
        let center = GeoPoint::new(south + step / 2.0, west + step / 2.0);
        let value = self.value_at(center);

        GridCell {
            bounds: [
                GeoPoint::new(south, west),
                GeoPoint::new(north, west),
                GeoPoint::new(north, east),
                GeoPoint::new(south, east),
            ],
            value,
            color: classify(value, mode),
        }
    }
}

// Number of cells needed to cover `span`. Spans that are a whole number of
// steps up to float noise do not get an extra sliver row.
fn steps(span: f64, step: f64) -> usize {
    (span / step - 1e-9).ceil().max(0.0) as usize
}

/// Single-origin overlay: each cell takes the travel time of its nearest
/// station.
pub fn rasterize(dataset: &ContourDataset, options: RasterOptions) -> Vec<GridCell> {
    Surface::single(dataset).rasterize(options)
}

/// Dual-origin overlay: each cell takes the rounded sum of both origins' times
/// to its nearest station. Empty unless both datasets are present.
pub fn rasterize_sum(
    first: Option<&ContourDataset>,
    second: Option<&ContourDataset>,
    options: RasterOptions,
) -> Vec<GridCell> {
    match (first, second) {
        (Some(a), Some(b)) => Surface::sum(a, b).rasterize(options),
        _ => vec![],
    }
}

#[derive(Serialize)]
struct CellFeature {
    #[serde(serialize_with = "serialize_geometry")]
    geometry: geo_types::Polygon<f64>,
    value: f64,
    color: Color,
}

pub fn to_feature_collection(cells: &[GridCell]) -> anyhow::Result<FeatureCollection> {
    let features = cells
        .iter()
        .map(|c| {
            geojson::ser::to_feature(CellFeature {
                geometry: c.polygon(),
                value: c.value,
                color: c.color,
            })
        })
        .collect::<Result<Vec<Feature>, geojson::Error>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::classify::OVER_COLOR;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn dataset(value: serde_json::Value) -> ContourDataset {
        ContourDataset::from_value(&value).unwrap()
    }

    fn two_stations() -> ContourDataset {
        dataset(json!({
            "10": { "stations": [{ "name": "A", "lat": 37.50, "lng": 127.00, "time": 10 }], "count": 1 },
            "30": { "stations": [
                { "name": "A", "lat": 37.50, "lng": 127.00, "time": 10 },
                { "name": "B", "lat": 37.51, "lng": 127.01, "time": 25 },
            ], "count": 2 },
        }))
    }

    #[test]
    fn grid_covers_padded_bounding_box() {
        let cells = rasterize(&two_stations(), RasterOptions::with_cell_size(0.01));

        // (0.01 + 2 * 0.02) / 0.01 = 5 steps on each axis
        assert_eq!(cells.len(), 25);

        let first = &cells[0];
        assert_relative_eq!(first.bounds[0].lat, 37.48, epsilon = 1e-9);
        assert_relative_eq!(first.bounds[0].lng, 126.98, epsilon = 1e-9);
        assert_relative_eq!(first.bounds[2].lat, 37.49, epsilon = 1e-9);
        assert_relative_eq!(first.bounds[2].lng, 126.99, epsilon = 1e-9);

        // Second cell is the eastern neighbour
        assert_relative_eq!(cells[1].bounds[0].lng, 126.99, epsilon = 1e-9);
        assert_relative_eq!(cells[1].bounds[0].lat, 37.48, epsilon = 1e-9);
    }

    #[test]
    fn cells_are_colored_by_their_value() {
        let cells = rasterize(&two_stations(), RasterOptions::with_cell_size(0.01));

        for c in &cells {
            assert!([0.0, 10.0, 25.0].contains(&c.value), "{}", c.value);
            assert_eq!(c.color, classify(c.value, Mode::Single));
        }
        assert!(cells.iter().any(|c| c.value == 25.0));
    }

    #[test]
    fn station_inside_a_cell_center_snaps_to_zero() {
        // Cell (row 2, col 2) is centred on A
        let cells = rasterize(&two_stations(), RasterOptions::with_cell_size(0.01));
        let centred = &cells[2 * 5 + 2];

        assert_relative_eq!(centred.bounds[0].lat + 0.005, 37.505, epsilon = 1e-9);
        assert_relative_eq!(centred.bounds[0].lng + 0.005, 127.005, epsilon = 1e-9);

        let on_a = rasterize(
            &dataset(json!({ "10": { "stations": [{ "name": "A", "lat": 37.505, "lng": 127.005, "time": 40 }], "count": 1 } })),
            RasterOptions { cell_size_deg: 0.01, padding_deg: 0.005 },
        );
        assert_eq!(on_a.len(), 1);
        assert_eq!(on_a[0].value, 0.0);
    }

    #[test]
    fn empty_dataset_yields_empty_grid() {
        let d = dataset(json!({ "10": { "stations": [
            { "name": "A", "lat": "not a number", "lng": 127.0, "time": 10 }
        ], "count": 1 } }));

        assert!(rasterize(&d, RasterOptions::default()).is_empty());
    }

    #[test]
    fn bad_cell_size_yields_empty_grid() {
        assert!(rasterize(&two_stations(), RasterOptions::with_cell_size(0.0)).is_empty());
        assert!(rasterize(&two_stations(), RasterOptions::with_cell_size(f64::NAN)).is_empty());
    }

    #[test]
    fn oversized_grid_is_refused() {
        // 50 000 x 50 000 cells over the padded box
        assert!(rasterize(&two_stations(), RasterOptions::with_cell_size(1e-6)).is_empty());
        assert!(rasterize_sum(
            Some(&two_stations()),
            Some(&two_stations()),
            RasterOptions::with_cell_size(1e-6)
        )
        .is_empty());

        // 100 x 100 is well under the limit
        assert_eq!(rasterize(&two_stations(), RasterOptions::with_cell_size(0.0005)).len(), 10_000);
    }

    #[test]
    fn step_count_ignores_float_noise() {
        assert_eq!(steps(0.05000000000000426, 0.01), 5);
        assert_eq!(steps(0.04999999999999716, 0.01), 5);
        assert_eq!(steps(0.051, 0.01), 6);
        assert_eq!(steps(0.0, 0.01), 0);
    }

    #[test]
    fn rasterize_is_repeatable() {
        let d = two_stations();
        let options = RasterOptions::with_cell_size(0.004);

        assert_eq!(rasterize(&d, options), rasterize(&d, options));
    }

    fn origin(times: [f64; 3]) -> ContourDataset {
        dataset(json!({
            "60": { "stations": [
                { "name": "A", "lat": 37.50, "lng": 127.00, "time": times[0] },
                { "name": "B", "lat": 37.52, "lng": 127.02, "time": times[1] },
                { "name": "C", "lat": 37.48, "lng": 127.03, "time": times[2] },
            ], "count": 3 },
        }))
    }

    #[test]
    fn sum_is_order_independent() {
        let d1 = origin([5.0, 22.5, 41.0]);
        let d2 = origin([30.0, 12.5, 7.0]);
        let options = RasterOptions::with_cell_size(0.01);

        let forward = rasterize_sum(Some(&d1), Some(&d2), options);
        let backward = rasterize_sum(Some(&d2), Some(&d1), options);

        assert!(!forward.is_empty());
        assert_eq!(forward.len(), backward.len());
        for (f, b) in forward.iter().zip(&backward) {
            assert_eq!(f.value, b.value);
            assert_eq!(f.color, classify(f.value, Mode::Sum));
        }
        // 22.5 + 12.5
        assert!(forward.iter().any(|c| c.value == 35.0));
    }

    #[test]
    fn sum_defaults_missing_stations_to_sixty() {
        let d1 = dataset(json!({ "60": { "stations": [
            { "name": "A", "lat": 37.50, "lng": 127.00, "time": 10 },
        ], "count": 1 } }));
        let d2 = dataset(json!({ "60": { "stations": [
            { "name": "Z", "lat": 37.60, "lng": 127.10, "time": 10 },
        ], "count": 1 } }));

        let cells = rasterize_sum(Some(&d1), Some(&d2), RasterOptions::with_cell_size(0.02));
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|c| c.value == 70.0));
        assert!(cells.iter().all(|c| c.color == classify(70.0, Mode::Sum)));
    }

    #[test]
    fn sum_without_second_origin_is_empty() {
        let d1 = origin([5.0, 10.0, 15.0]);
        let empty = dataset(json!({ "10": { "stations": [], "count": 0 } }));
        let options = RasterOptions::default();

        assert!(rasterize_sum(Some(&d1), None, options).is_empty());
        assert!(rasterize_sum(None, Some(&d1), options).is_empty());
        assert!(rasterize_sum(Some(&d1), Some(&empty), options).is_empty());
    }

    #[test]
    fn sum_past_eighty_is_over() {
        let d1 = origin([50.0, 50.0, 50.0]);
        let d2 = origin([40.0, 40.0, 40.0]);

        let cells = rasterize_sum(Some(&d1), Some(&d2), RasterOptions::with_cell_size(0.02));
        assert!(cells.iter().all(|c| c.value == 90.0 && c.color == OVER_COLOR));
    }

    #[test]
    fn feature_collection_has_closed_polygons() {
        let cells = rasterize(&two_stations(), RasterOptions::with_cell_size(0.01));
        let fc = to_feature_collection(&cells).unwrap();

        assert_eq!(fc.features.len(), cells.len());

        let feature = &fc.features[0];
        assert_eq!(feature.property("color"), Some(&json!(cells[0].color)));
        assert_eq!(feature.property("value"), Some(&json!(cells[0].value)));

        match &feature.geometry.as_ref().unwrap().value {
            geojson::Value::Polygon(rings) => {
                assert_eq!(rings[0].len(), 5);
                assert_eq!(rings[0][0], rings[0][4]);
                // GeoJSON positions are [lng, lat]
                assert_relative_eq!(rings[0][0][0], 126.98, epsilon = 1e-9);
                assert_relative_eq!(rings[0][0][1], 37.48, epsilon = 1e-9);
            }
            other => panic!("expected a polygon, got {other:?}"),
        }
    }
}

//! Regular-grid cell lookup for dataset coverage
//!
//! Several upstream datasets are published in fixed lat/lon grids (1 degree
//! elevation quads, 7.5-minute topo quads, tenth-degree center-labelled
//! cells). Cell lookup is a conservative bbox-vs-bbox test: callers tolerate
//! extra cells but never missing ones, so anything exactly on a boundary is
//! assigned to both neighbors.

use geo::{BoundingRect, Coord, Geometry, Rect};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// A regular grid in WGS84 degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    /// Lower-left corner the grid is anchored to
    pub origin: Coord<f64>,
    /// Cell width and height in degrees
    pub cell_size: f64,
}

impl GridSpec {
    pub fn new(origin: Coord<f64>, cell_size: f64) -> Self {
        Self { origin, cell_size }
    }

    /// 1-degree grid used by elevation datasets
    pub fn one_degree() -> Self {
        Self::new(Coord { x: 0.0, y: 0.0 }, 1.0)
    }

    /// 0.1-degree grid whose cells are labelled by centerpoints, so the grid
    /// lines sit at x.05 offsets
    pub fn tenth_degree_centers() -> Self {
        Self::new(Coord { x: -0.05, y: -0.05 }, 0.1)
    }

    /// 7.5-minute (1/8 degree) quad grid used by forest service topo maps
    pub fn quad_7_5_minute() -> Self {
        Self::new(Coord { x: 0.0, y: 0.0 }, 0.125)
    }

    /// Bounding box of a `(row, col)` cell
    pub fn cell_bounds(&self, cell: (i64, i64)) -> Rect<f64> {
        let (row, col) = cell;
        let min = Coord {
            x: self.origin.x + col as f64 * self.cell_size,
            y: self.origin.y + row as f64 * self.cell_size,
        };
        let max = Coord {
            x: min.x + self.cell_size,
            y: min.y + self.cell_size,
        };
        Rect::new(min, max)
    }

    /// Centerpoint of a `(row, col)` cell
    pub fn cell_center(&self, cell: (i64, i64)) -> Coord<f64> {
        self.cell_bounds(cell).center()
    }
}

/// Cells whose bounding box intersects the geometry's bounding box
///
/// This is a fast, over-inclusive test, not an exact polygon intersection;
/// callers needing exactness must post-filter against [`GridSpec::cell_bounds`].
/// Returns the empty set for empty geometry.
pub fn cells_for_geometry(geometry: &Geometry<f64>, spec: &GridSpec) -> BTreeSet<(i64, i64)> {
    let Some(bbox) = geometry.bounding_rect() else {
        return BTreeSet::new();
    };
    let rows = axis_range(bbox.min().y, bbox.max().y, spec.origin.y, spec.cell_size);
    let cols = axis_range(bbox.min().x, bbox.max().x, spec.origin.x, spec.cell_size);

    let mut cells = BTreeSet::new();
    for row in rows {
        for col in cols.clone() {
            cells.insert((row, col));
        }
    }
    cells
}

/// Index range covering `[min, max]` along one axis
///
/// A value exactly on a cell boundary contributes both adjacent cells.
fn axis_range(min: f64, max: f64, origin: f64, cell_size: f64) -> RangeInclusive<i64> {
    let t_min = (min - origin) / cell_size;
    let t_max = (max - origin) / cell_size;
    let lo = if t_min.fract() == 0.0 {
        t_min as i64 - 1
    } else {
        t_min.floor() as i64
    };
    let hi = t_max.floor() as i64;
    lo..=hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, line_string, point};

    #[test]
    fn test_interior_point_single_cell_pair() {
        let spec = GridSpec::one_degree();
        let point = Geometry::Point(point!(x: -119.5, y: 37.5));
        let cells = cells_for_geometry(&point, &spec);
        assert_eq!(cells, BTreeSet::from([(37, -120)]));
    }

    #[test]
    fn test_boundary_point_assigned_to_both_cells() {
        let spec = GridSpec::one_degree();
        // Exactly on the longitude boundary between columns -120 and -119
        let point = Geometry::Point(point!(x: -119.0, y: 37.5));
        let cells = cells_for_geometry(&point, &spec);
        assert_eq!(cells, BTreeSet::from([(37, -120), (37, -119)]));
    }

    #[test]
    fn test_corner_point_assigned_to_four_cells() {
        let spec = GridSpec::one_degree();
        let point = Geometry::Point(point!(x: -119.0, y: 37.0));
        let cells = cells_for_geometry(&point, &spec);
        assert_eq!(cells.len(), 4);
    }

    #[test]
    fn test_line_spans_multiple_cells() {
        let spec = GridSpec::one_degree();
        let line: LineString<f64> = line_string![(x: -119.5, y: 36.2), (x: -117.3, y: 37.8)];
        let cells = cells_for_geometry(&Geometry::LineString(line), &spec);
        // bbox covers lon [-119.5, -117.3], lat [36.2, 37.8]: 3 cols x 2 rows
        assert_eq!(cells.len(), 6);
        assert!(cells.contains(&(36, -120)));
        assert!(cells.contains(&(37, -118)));
    }

    #[test]
    fn test_tenth_degree_centers_offset() {
        let spec = GridSpec::tenth_degree_centers();
        let point = Geometry::Point(point!(x: 40.02, y: 40.02));
        let cells = cells_for_geometry(&point, &spec);
        assert_eq!(cells.len(), 1);
        let cell = *cells.iter().next().unwrap();
        // Center-labelled grid: the cell containing 40.02 is centered at 40.0
        let center = spec.cell_center(cell);
        assert!((center.x - 40.0).abs() < 1e-9);
        assert!((center.y - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_cell_bounds_roundtrip() {
        let spec = GridSpec::quad_7_5_minute();
        let bounds = spec.cell_bounds((8 * 46, 8 * -122));
        assert!((bounds.min().y - 46.0).abs() < 1e-9);
        assert!((bounds.min().x - -122.0).abs() < 1e-9);
        assert!((bounds.width() - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_empty_geometry_yields_no_cells() {
        let spec = GridSpec::one_degree();
        let empty = Geometry::MultiPoint(geo::MultiPoint::new(vec![]));
        assert!(cells_for_geometry(&empty, &spec).is_empty());
    }
}

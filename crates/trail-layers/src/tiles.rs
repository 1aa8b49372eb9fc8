//! Slippy-map tile enumeration
//!
//! Lists the web-mercator tiles a geometry touches across a zoom range, for
//! seeding offline tile caches. Coverage is computed per zoom from the
//! bounding box, then post-filtered with an exact intersection test so
//! L-shaped or diagonal geometry does not drag in whole empty corners of its
//! bbox.

use geo::{BoundingRect, Geometry, Intersects, Polygon, Rect, polygon};

/// Y-axis numbering convention for tile indices
///
/// `Xyz` counts rows from the north pole down (OSM and friends), `Tms` from
/// the south pole up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TileScheme {
    #[default]
    Xyz,
    Tms,
}

/// A single web-mercator tile address
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl std::fmt::Display for TileId {
    /// Renders as `[x, y, z]`, the order tile seeding tools expect
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

impl TileId {
    /// WGS84 bounding box of this tile (interpreting indices as XYZ)
    pub fn bounds(&self) -> Rect<f64> {
        let n = f64::from(1u32 << self.z);
        let lon_min = f64::from(self.x) / n * 360.0 - 180.0;
        let lon_max = f64::from(self.x + 1) / n * 360.0 - 180.0;
        let lat_max = row_edge_latitude(f64::from(self.y), n);
        let lat_min = row_edge_latitude(f64::from(self.y + 1), n);
        Rect::new((lon_min, lat_min), (lon_max, lat_max))
    }

    fn polygon(&self) -> Polygon<f64> {
        let b = self.bounds();
        polygon![
            (x: b.min().x, y: b.min().y),
            (x: b.max().x, y: b.min().y),
            (x: b.max().x, y: b.max().y),
            (x: b.min().x, y: b.max().y),
        ]
    }
}

/// All tiles intersecting `geometry` for every zoom in `min_zoom..=max_zoom`
///
/// Output is sorted by zoom, then column, then row. An empty geometry yields
/// no tiles.
pub fn tiles_for_geometry(
    geometry: &Geometry<f64>,
    min_zoom: u8,
    max_zoom: u8,
    scheme: TileScheme,
) -> Vec<TileId> {
    let Some(bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };

    let mut tiles = Vec::new();
    for z in min_zoom..=max_zoom {
        let n = 1u32 << z;
        let (x_min, x_max) = column_range(bbox.min().x, bbox.max().x, n);
        let (y_min, y_max) = row_range(bbox.min().y, bbox.max().y, n);
        for x in x_min..=x_max {
            for y in y_min..=y_max {
                let tile = TileId { z, x, y };
                if tile.polygon().intersects(geometry) {
                    tiles.push(match scheme {
                        TileScheme::Xyz => tile,
                        TileScheme::Tms => TileId {
                            z,
                            x,
                            y: n - 1 - y,
                        },
                    });
                }
            }
        }
    }
    tiles.sort();
    tiles
}

fn column_range(lon_min: f64, lon_max: f64, n: u32) -> (u32, u32) {
    index_range(column_coord(lon_min, n), column_coord(lon_max, n), n)
}

fn row_range(lat_min: f64, lat_max: f64, n: u32) -> (u32, u32) {
    // Row indices grow southward, so the northern latitude gives the low row
    index_range(row_coord(lat_max, n), row_coord(lat_min, n), n)
}

/// Index range covering `[min_t, max_t]` in tile units
///
/// A bbox edge exactly on a tile boundary also includes the tile on the far
/// side; the exact post-filter keeps only those actually touched.
fn index_range(min_t: f64, max_t: f64, n: u32) -> (u32, u32) {
    let lo = if min_t.fract() == 0.0 {
        min_t - 1.0
    } else {
        min_t.floor()
    };
    let max_index = f64::from(n - 1);
    (
        lo.clamp(0.0, max_index) as u32,
        max_t.floor().clamp(0.0, max_index) as u32,
    )
}

fn column_coord(lon: f64, n: u32) -> f64 {
    (lon + 180.0) / 360.0 * f64::from(n)
}

fn row_coord(lat: f64, n: u32) -> f64 {
    let rad = lat.to_radians();
    (1.0 - rad.tan().asinh() / std::f64::consts::PI) / 2.0 * f64::from(n)
}

/// Latitude of the northern edge of tile row `y` in an `n`-row grid
fn row_edge_latitude(y: f64, n: f64) -> f64 {
    let t = std::f64::consts::PI * (1.0 - 2.0 * y / n);
    t.sinh().atan().to_degrees()
}

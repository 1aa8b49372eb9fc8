//! Coordinate reference systems and reprojection
//!
//! Only the reference systems the pipeline actually uses are supported, so
//! the CRS is a closed enum rather than a lookup against a projection
//! database. All distance and area math happens in [`Crs::CaAlbers`], an
//! equal-area projection in meters; buffering in degrees is never correct
//! and is not offered.

use crate::{Error, Result};
use geo::{Coord, MapCoords};
use std::str::FromStr;

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

// GRS80 ellipsoid, used by EPSG:3488 (NAD83 / California Albers)
const GRS80_A: f64 = 6_378_137.0;
const GRS80_F: f64 = 1.0 / 298.257_222_101;

// NAD83 / California Albers projection parameters
const ALBERS_LAT_1: f64 = 34.0;
const ALBERS_LAT_2: f64 = 40.5;
const ALBERS_LAT_0: f64 = 0.0;
const ALBERS_LON_0: f64 = -120.0;
const ALBERS_FALSE_NORTHING: f64 = -4_000_000.0;

/// A recognized coordinate reference system
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Geographic lat/lon degrees (EPSG:4326), the storage and export CRS
    Wgs84,
    /// Web Mercator meters (EPSG:3857), the tiling CRS
    WebMercator,
    /// NAD83 / California Albers meters (EPSG:3488), the measurement CRS
    CaAlbers,
}

impl Crs {
    /// EPSG code of this CRS
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::CaAlbers => 3488,
        }
    }

    /// Project a WGS84 lon/lat coordinate into this CRS
    #[inline]
    fn from_wgs84(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => wgs84_to_mercator(c),
            Crs::CaAlbers => wgs84_to_albers(c),
        }
    }

    /// Unproject a coordinate in this CRS back to WGS84 lon/lat
    #[inline]
    fn to_wgs84(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => mercator_to_wgs84(c),
            Crs::CaAlbers => albers_to_wgs84(c),
        }
    }
}

impl FromStr for Crs {
    type Err = Error;

    /// Accepts `"EPSG:4326"` (any case), bare codes like `"3488"` and the
    /// common name `"wgs84"`. Anything else is an `InvalidCrs` error.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let code = lower.strip_prefix("epsg:").unwrap_or(&lower);
        match code {
            "4326" | "wgs84" => Ok(Crs::Wgs84),
            "3857" | "web-mercator" => Ok(Crs::WebMercator),
            "3488" | "ca-albers" => Ok(Crs::CaAlbers),
            _ => Err(Error::InvalidCrs(s.to_string())),
        }
    }
}

/// Reproject any geometry between two recognized reference systems
///
/// The transform is applied per coordinate, which preserves topology: rings
/// stay rings, part ordering is unchanged.
pub fn reproject<G>(geometry: &G, from: Crs, to: Crs) -> G
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    if from == to {
        return geometry.clone();
    }
    geometry.map_coords(|c| to.from_wgs84(from.to_wgs84(c)))
}

/// Reproject with string CRS names, failing on unrecognized systems
pub fn reproject_named<G>(geometry: &G, from: &str, to: &str) -> Result<G>
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    let from = Crs::from_str(from)?;
    let to = Crs::from_str(to)?;
    Ok(reproject(geometry, from, to))
}

/// Convert WGS84 lon/lat to Web Mercator meters, clamping latitude
#[inline]
fn wgs84_to_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = c.x * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;
    Coord { x, y }
}

/// Convert Web Mercator meters to WGS84 lon/lat
#[inline]
fn mercator_to_wgs84(c: Coord<f64>) -> Coord<f64> {
    let lon = c.x / LON_TO_X_FACTOR;
    let lat = (std::f64::consts::PI / 2.0 - 2.0 * ((-c.y / Y_FACTOR).exp()).atan()).to_degrees();
    Coord { x: lon, y: lat }
}

/// Shared constants of the Albers projection, derived from the standard
/// parallels (Snyder, Map Projections: A Working Manual, eq. 14-1..14-6)
struct AlbersParams {
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

fn albers_params() -> AlbersParams {
    let e2 = GRS80_F * (2.0 - GRS80_F);
    let e = e2.sqrt();

    let phi1 = ALBERS_LAT_1.to_radians();
    let phi2 = ALBERS_LAT_2.to_radians();
    let phi0 = ALBERS_LAT_0.to_radians();

    let m1 = albers_m(phi1, e2);
    let m2 = albers_m(phi2, e2);
    let q0 = albers_q(phi0.sin(), e, e2);
    let q1 = albers_q(phi1.sin(), e, e2);
    let q2 = albers_q(phi2.sin(), e, e2);

    let n = (m1 * m1 - m2 * m2) / (q2 - q1);
    let c = m1 * m1 + n * q1;
    let rho0 = GRS80_A * (c - n * q0).sqrt() / n;

    AlbersParams { e, e2, n, c, rho0 }
}

#[inline]
fn albers_m(phi: f64, e2: f64) -> f64 {
    phi.cos() / (1.0 - e2 * phi.sin() * phi.sin()).sqrt()
}

#[inline]
fn albers_q(sin_phi: f64, e: f64, e2: f64) -> f64 {
    (1.0 - e2)
        * (sin_phi / (1.0 - e2 * sin_phi * sin_phi)
            - (1.0 / (2.0 * e)) * ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln())
}

fn wgs84_to_albers(c: Coord<f64>) -> Coord<f64> {
    let p = albers_params();
    let q = albers_q(c.y.to_radians().sin(), p.e, p.e2);
    let theta = p.n * (c.x - ALBERS_LON_0).to_radians();
    let rho = GRS80_A * (p.c - p.n * q).sqrt() / p.n;
    Coord {
        x: rho * theta.sin(),
        y: ALBERS_FALSE_NORTHING + p.rho0 - rho * theta.cos(),
    }
}

fn albers_to_wgs84(c: Coord<f64>) -> Coord<f64> {
    let p = albers_params();
    let x = c.x;
    let y = p.rho0 - (c.y - ALBERS_FALSE_NORTHING);
    let rho = x.hypot(y);
    let theta = x.atan2(y);
    let lon = ALBERS_LON_0 + (theta / p.n).to_degrees();

    let q = (p.c - (rho * p.n / GRS80_A).powi(2)) / p.n;

    // Iterative inverse for latitude (Snyder eq. 3-16); converges in a
    // handful of iterations for any point within the projection's domain.
    let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
    for _ in 0..15 {
        let sin_phi = phi.sin();
        let one_minus = 1.0 - p.e2 * sin_phi * sin_phi;
        let delta = (one_minus * one_minus / (2.0 * phi.cos()))
            * (q / (1.0 - p.e2) - sin_phi / one_minus
                + (1.0 / (2.0 * p.e))
                    * ((1.0 - p.e * sin_phi) / (1.0 + p.e * sin_phi)).ln());
        phi += delta;
        if delta.abs() < 1e-12 {
            break;
        }
    }

    Coord {
        x: lon,
        y: phi.to_degrees(),
    }
}

//! Stateless geometric transforms shared by every layer builder
//!
//! Buffering always goes through the equal-area meter CRS: reproject, buffer
//! in meters, reproject back. The output CRS of everything here is WGS84.

use crate::crs::{Crs, reproject};
use crate::{Error, Result};
use geo::{
    Area, BooleanOps, Buffer, Coord, Geometry, LineString, MultiLineString, MultiPolygon, Polygon,
};
use serde::Deserialize;
use std::str::FromStr;

/// Maximum vertex spacing in degrees for geometry headed into a projected
/// operation. A straight chord between vertices a degree apart deviates from
/// the projected image of the line by hundreds of meters, which is larger
/// than clipping and corridor tolerances.
pub(crate) const DENSIFY_STEP_DEG: f64 = 0.0005;

/// Units accepted for buffer distances, normalized to meters internally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    #[serde(alias = "mi")]
    Mile,
    #[serde(alias = "m")]
    Meter,
    #[serde(alias = "km")]
    Kilometer,
}

impl DistanceUnit {
    pub const METERS_PER_MILE: f64 = 1609.344;

    /// Convert a distance in this unit to meters
    pub fn to_meters(self, distance: f64) -> f64 {
        match self {
            DistanceUnit::Mile => distance * Self::METERS_PER_MILE,
            DistanceUnit::Meter => distance,
            DistanceUnit::Kilometer => distance * 1000.0,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mile" | "mi" => Ok(DistanceUnit::Mile),
            "meter" | "m" => Ok(DistanceUnit::Meter),
            "kilometer" | "km" => Ok(DistanceUnit::Kilometer),
            other => Err(Error::Config(format!(
                "unit must be one of mile|mi, meter|m, kilometer|km, got {other}"
            ))),
        }
    }
}

/// Buffer a WGS84 geometry by a distance, returning a WGS84 polygon
///
/// The geometry is projected to the equal-area meter CRS first; buffering
/// directly in degrees would distort with latitude and is never done.
pub fn buffer(
    geometry: &Geometry<f64>,
    distance: f64,
    unit: DistanceUnit,
) -> Result<MultiPolygon<f64>> {
    let meters = unit.to_meters(distance);
    if meters < 0.0 {
        return Err(Error::InvalidGeometry(format!(
            "buffer distance must be non-negative, got {meters}m"
        )));
    }
    let dense = densify_geometry(geometry, DENSIFY_STEP_DEG);
    let projected = reproject(&dense, Crs::Wgs84, Crs::CaAlbers);
    let buffered = buffer_projected(&projected, meters);
    Ok(reproject(&buffered, Crs::CaAlbers, Crs::Wgs84))
}

/// Nested buffer rings for a strictly increasing distance set
///
/// Ring `i` is the set-difference between the buffer at `distances[i]` and
/// the buffer at `distances[i - 1]`, so the rings are pairwise disjoint and
/// their union equals the single buffer at the largest distance.
pub fn buffer_rings(
    geometry: &Geometry<f64>,
    distances: &[f64],
    unit: DistanceUnit,
) -> Result<Vec<MultiPolygon<f64>>> {
    if distances.is_empty() {
        return Ok(Vec::new());
    }
    if distances.windows(2).any(|w| w[0] >= w[1]) || distances[0] <= 0.0 {
        return Err(Error::InvalidGeometry(format!(
            "buffer distances must be positive and strictly increasing, got {distances:?}"
        )));
    }

    let dense = densify_geometry(geometry, DENSIFY_STEP_DEG);
    let projected = reproject(&dense, Crs::Wgs84, Crs::CaAlbers);
    let mut rings = Vec::with_capacity(distances.len());
    let mut previous: Option<MultiPolygon<f64>> = None;
    for distance in distances {
        let buffered = buffer_projected(&projected, unit.to_meters(*distance));
        let ring = match &previous {
            Some(inner) => buffered.difference(inner),
            None => buffered.clone(),
        };
        rings.push(reproject(&ring, Crs::CaAlbers, Crs::Wgs84));
        previous = Some(buffered);
    }
    Ok(rings)
}

/// Buffer a geometry already expressed in projected meters
pub(crate) fn buffer_projected(geometry: &Geometry<f64>, meters: f64) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Point(p) => MultiPolygon::new(vec![circle(p.0, meters)]),
        Geometry::MultiPoint(mp) => union_all(mp.iter().map(|p| circle(p.0, meters))),
        Geometry::Line(l) => LineString::new(vec![l.start, l.end]).buffer(meters),
        Geometry::LineString(ls) => ls.buffer(meters),
        Geometry::MultiLineString(mls) => mls.buffer(meters),
        Geometry::Polygon(p) => p.buffer(meters),
        Geometry::MultiPolygon(mp) => mp.buffer(meters),
        Geometry::Rect(r) => r.to_polygon().buffer(meters),
        Geometry::Triangle(t) => t.to_polygon().buffer(meters),
        Geometry::GeometryCollection(gc) => {
            union_all(gc.iter().map(|g| buffer_projected(g, meters)).flat_map(|mp| mp.0))
        }
    }
}

fn circle(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    const SEGMENTS: usize = 64;
    let ring = (0..=SEGMENTS)
        .map(|i| {
            let angle = (i % SEGMENTS) as f64 / SEGMENTS as f64 * std::f64::consts::TAU;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect::<Vec<_>>();
    Polygon::new(LineString::new(ring), vec![])
}

fn union_all(polygons: impl Iterator<Item = Polygon<f64>>) -> MultiPolygon<f64> {
    polygons.fold(MultiPolygon::new(Vec::new()), |acc, p| {
        acc.union(&MultiPolygon::new(vec![p]))
    })
}

/// Insert vertices so no segment is longer than `max_step` (same units as the
/// coordinates). Existing vertices are always kept.
pub(crate) fn densify(line: &LineString<f64>, max_step: f64) -> LineString<f64> {
    if line.0.len() < 2 {
        return line.clone();
    }
    let mut coords = Vec::with_capacity(line.0.len());
    for segment in line.0.windows(2) {
        let (start, end) = (segment[0], segment[1]);
        let (dx, dy) = (end.x - start.x, end.y - start.y);
        let steps = (dx.hypot(dy) / max_step).ceil().max(1.0) as usize;
        for i in 0..steps {
            let t = i as f64 / steps as f64;
            coords.push(Coord {
                x: start.x + dx * t,
                y: start.y + dy * t,
            });
        }
    }
    coords.push(line.0[line.0.len() - 1]);
    LineString::new(coords)
}

/// Densify every line and ring of a geometry; points pass through unchanged
pub(crate) fn densify_geometry(geometry: &Geometry<f64>, max_step: f64) -> Geometry<f64> {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => geometry.clone(),
        Geometry::Line(l) => {
            Geometry::LineString(densify(&LineString::new(vec![l.start, l.end]), max_step))
        }
        Geometry::LineString(ls) => Geometry::LineString(densify(ls, max_step)),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(MultiLineString::new(
            mls.0.iter().map(|ls| densify(ls, max_step)).collect(),
        )),
        Geometry::Polygon(p) => Geometry::Polygon(densify_polygon(p, max_step)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(MultiPolygon::new(
            mp.0.iter().map(|p| densify_polygon(p, max_step)).collect(),
        )),
        Geometry::Rect(r) => Geometry::Polygon(densify_polygon(&r.to_polygon(), max_step)),
        Geometry::Triangle(t) => Geometry::Polygon(densify_polygon(&t.to_polygon(), max_step)),
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(
            geo::GeometryCollection::from_iter(gc.iter().map(|g| densify_geometry(g, max_step))),
        ),
    }
}

fn densify_polygon(polygon: &Polygon<f64>, max_step: f64) -> Polygon<f64> {
    Polygon::new(
        densify(polygon.exterior(), max_step),
        polygon
            .interiors()
            .iter()
            .map(|ring| densify(ring, max_step))
            .collect(),
    )
}

/// Round all coordinates to `digits` decimal places, keeping output small
///
/// If rounding would collapse a polygonal geometry to zero area the original
/// is returned untouched and a warning is logged; degenerate output would be
/// worse than a few extra bytes.
pub fn truncate_precision(geometry: &Geometry<f64>, digits: u32) -> Geometry<f64> {
    let factor = 10f64.powi(digits as i32);
    let rounded = geo::MapCoords::map_coords(geometry, |c| Coord {
        x: (c.x * factor).round() / factor,
        y: (c.y * factor).round() / factor,
    });

    let original_area = geometry.unsigned_area();
    if original_area > 0.0 && rounded.unsigned_area() == 0.0 {
        tracing::warn!(
            digits,
            "precision truncation would collapse polygon to zero area; keeping original coordinates"
        );
        return geometry.clone();
    }
    rounded
}

/// Drop the Z coordinate from every position of a GeoJSON geometry
///
/// The geometry types used internally are 2D, so elevations only ever appear
/// at the GeoJSON/GPX ingestion boundary. No-op for 2D input.
pub fn flatten_3d(geometry: &mut geojson::Geometry) {
    flatten_value(&mut geometry.value);
}

fn flatten_value(value: &mut geojson::Value) {
    use geojson::Value::*;
    match value {
        Point(position) => position.truncate(2),
        MultiPoint(positions) | LineString(positions) => {
            for position in positions {
                position.truncate(2);
            }
        }
        MultiLineString(lines) | Polygon(lines) => {
            for line in lines {
                for position in line {
                    position.truncate(2);
                }
            }
        }
        MultiPolygon(polygons) => {
            for polygon in polygons {
                for ring in polygon {
                    for position in ring {
                        position.truncate(2);
                    }
                }
            }
        }
        GeometryCollection(geometries) => {
            for geometry in geometries {
                flatten_value(&mut geometry.value);
            }
        }
    }
}

/// Repair self-intersecting polygonal geometry before export
///
/// A union with the empty set renormalizes the polygon rings. A `Polygon`
/// input that repairs to a single polygon stays a `Polygon`; only genuinely
/// multi-part repairs widen the type. Non-polygonal geometry passes through
/// unchanged.
pub fn ensure_valid(geometry: &Geometry<f64>) -> Geometry<f64> {
    let empty = MultiPolygon::new(Vec::new());
    match geometry {
        Geometry::Polygon(p) => {
            let mut fixed = p.union(&empty);
            if fixed.0.len() == 1 {
                Geometry::Polygon(fixed.0.remove(0))
            } else {
                Geometry::MultiPolygon(fixed)
            }
        }
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.union(&empty)),
        other => other.clone(),
    }
}

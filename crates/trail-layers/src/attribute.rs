//! Per-feature trail attribution
//!
//! Every exported feature carries how much trail it touches: miles of trail
//! inside a wilderness boundary, miles along a managing agency's district,
//! and so on. The length is measured by clipping the assembled centerline
//! against the feature's footprint in the equal-area meter CRS.

use crate::crs::{Crs, reproject};
use crate::enrich::Summary;
use crate::geom::{DENSIFY_STEP_DEG, buffer_projected, densify, densify_geometry};
use crate::trail::AssembledTrail;
use geo::{BooleanOps, Euclidean, Geometry, Length, MultiLineString, MultiPolygon};
use rayon::prelude::*;
use serde_json::{Map, Value};

/// Linear features (roads, boundaries drawn as lines) have no interior to
/// clip against, so they get a thin corridor instead
const LINE_CORRIDOR_HALF_WIDTH_M: f64 = 25.0;

/// A feature as parsed from an upstream dataset, before attribution
#[derive(Clone, Debug)]
pub struct RawFeature {
    pub name: Option<String>,
    /// WGS84 geometry
    pub geometry: Geometry<f64>,
    /// Upstream properties, passed through to the output untouched
    pub properties: Map<String, Value>,
}

impl RawFeature {
    pub fn new(name: Option<String>, geometry: Geometry<f64>) -> Self {
        Self {
            name,
            geometry,
            properties: Map::new(),
        }
    }
}

/// A feature with its trail attribution computed, ready for enrichment and
/// export
#[derive(Clone, Debug)]
pub struct FeatureRecord {
    pub name: Option<String>,
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
    /// Dataset the feature came from, for source attribution on output
    pub source: String,
    /// Meters of assembled trail intersecting this feature
    pub trail_length_m: f64,
    /// Encyclopedia summary, filled in by enrichment when a match exists
    pub summary: Option<Summary>,
}

/// Meters of `trail` lying within `feature`, both in WGS84
///
/// Point features have no extent and always attribute zero.
pub fn attribute_length(feature: &Geometry<f64>, trail: &MultiLineString<f64>) -> f64 {
    let trail_m = reproject(&densify_trail(trail), Crs::Wgs84, Crs::CaAlbers);
    let feature_m = reproject(
        &densify_geometry(feature, DENSIFY_STEP_DEG),
        Crs::Wgs84,
        Crs::CaAlbers,
    );
    attribute_length_projected(&feature_m, &trail_m)
}

/// Degree-space chords deviate from their projected image by more than the
/// line corridor width, so everything is densified before projection
fn densify_trail(trail: &MultiLineString<f64>) -> MultiLineString<f64> {
    MultiLineString::new(trail.0.iter().map(|l| densify(l, DENSIFY_STEP_DEG)).collect())
}

fn attribute_length_projected(feature: &Geometry<f64>, trail: &MultiLineString<f64>) -> f64 {
    let footprint: MultiPolygon<f64> = match feature {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        Geometry::Rect(r) => MultiPolygon::new(vec![r.to_polygon()]),
        Geometry::Triangle(t) => MultiPolygon::new(vec![t.to_polygon()]),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            buffer_projected(feature, LINE_CORRIDOR_HALF_WIDTH_M)
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => return 0.0,
        Geometry::GeometryCollection(gc) => {
            return gc
                .iter()
                .map(|g| attribute_length_projected(g, trail))
                .sum();
        }
    };
    Euclidean.length(&footprint.clip(trail, false))
}

/// Attribute a whole layer of features against one assembled trail
///
/// Runs per feature in parallel; input order is preserved in the output.
/// `source_name` is stamped on every record for output attribution.
pub fn attribute_layer(
    features: Vec<RawFeature>,
    trail: &AssembledTrail,
    source_name: &str,
) -> Vec<FeatureRecord> {
    let trail_m = reproject(&densify_trail(&trail.spans), Crs::Wgs84, Crs::CaAlbers);
    features
        .into_par_iter()
        .map(|feature| {
            let feature_m = reproject(
                &densify_geometry(&feature.geometry, DENSIFY_STEP_DEG),
                Crs::Wgs84,
                Crs::CaAlbers,
            );
            let trail_length_m = attribute_length_projected(&feature_m, &trail_m);
            tracing::debug!(
                name = feature.name.as_deref().unwrap_or("<unnamed>"),
                trail_length_m,
                "attributed feature"
            );
            FeatureRecord {
                name: feature.name,
                geometry: feature.geometry,
                properties: feature.properties,
                source: source_name.to_string(),
                trail_length_m,
                summary: None,
            }
        })
        .collect()
}

//! Upstream dataset ingestion
//!
//! Two input shapes cover everything the pipeline consumes: GeoJSON files for
//! attributed layers (boundaries, agencies, places) and GPX files for
//! recorded trail centerlines. Elevations are dropped at this boundary; the
//! rest of the pipeline is strictly 2D.

use crate::attribute::RawFeature;
use crate::geom::flatten_3d;
use crate::trail::Centerline;
use crate::{Error, Result};
use geo::{BoundingRect, Intersects, LineString, Rect};
use std::path::{Path, PathBuf};

/// A loadable layer of raw features, in WGS84
///
/// Every dataset loader presents the same interface so the assembler and
/// attribution stages never care where features came from.
pub trait FeatureSource {
    /// Dataset name, stamped on output features for source attribution
    fn name(&self) -> &str;

    /// Load all features, optionally restricted to a WGS84 bounding box
    fn load(&self, bbox: Option<Rect<f64>>) -> Result<Vec<RawFeature>>;
}

/// GeoJSON file-backed [`FeatureSource`]
#[derive(Clone, Debug)]
pub struct GeoJsonFileSource {
    path: PathBuf,
    name: String,
    /// Property key the feature name is read from
    name_property: String,
}

impl GeoJsonFileSource {
    /// The dataset name defaults to the file stem
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            name_property: "name".to_string(),
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Read names from a dataset-specific property key instead of `name`
    pub fn with_name_property(mut self, key: impl Into<String>) -> Self {
        self.name_property = key.into();
        self
    }
}

impl FeatureSource for GeoJsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, bbox: Option<Rect<f64>>) -> Result<Vec<RawFeature>> {
        let text = std::fs::read_to_string(&self.path)?;
        let parsed: geojson::GeoJson = text.parse()?;
        let mut features = features_from_geojson(parsed, &self.name_property)?;
        if let Some(bbox) = bbox {
            features.retain(|f| {
                f.geometry
                    .bounding_rect()
                    .is_some_and(|r| r.intersects(&bbox))
            });
        }
        tracing::info!(
            path = %self.path.display(),
            features = features.len(),
            "loaded GeoJSON layer"
        );
        Ok(features)
    }
}

/// Convert parsed GeoJSON into raw features
///
/// Accepts a `FeatureCollection`, a single `Feature` or a bare geometry.
/// Features without geometry are skipped with a warning; 3D positions are
/// flattened before conversion.
pub fn features_from_geojson(geojson: geojson::GeoJson, name_property: &str) -> Result<Vec<RawFeature>> {
    let features = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc.features,
        geojson::GeoJson::Feature(feature) => vec![feature],
        geojson::GeoJson::Geometry(geometry) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let mut raw = Vec::with_capacity(features.len());
    for feature in features {
        let Some(mut geometry) = feature.geometry else {
            tracing::warn!("skipping feature without geometry");
            continue;
        };
        flatten_3d(&mut geometry);
        let geometry = geo::Geometry::<f64>::try_from(geometry.value)?;
        let properties = feature.properties.unwrap_or_default();
        let name = properties
            .get(name_property)
            .and_then(|v| v.as_str())
            .map(String::from);
        raw.push(RawFeature {
            name,
            geometry,
            properties,
        });
    }
    Ok(raw)
}

/// GPX file-backed centerline provider
///
/// Every track segment in the file becomes one centerline section under the
/// same source name and priority.
#[derive(Clone, Debug)]
pub struct GpxCenterlineSource {
    path: PathBuf,
    source: String,
    priority: u32,
}

impl GpxCenterlineSource {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>, priority: u32) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            priority,
        }
    }

    pub fn load(&self) -> Result<Vec<Centerline>> {
        let file = std::fs::File::open(&self.path)?;
        let gpx = gpx::read(std::io::BufReader::new(file))?;
        let centerlines = centerlines_from_gpx(&gpx, &self.source, self.priority);
        if centerlines.is_empty() {
            return Err(Error::InvalidGeometry(format!(
                "no track segments with 2 or more points in {}",
                self.path.display()
            )));
        }
        tracing::info!(
            path = %self.path.display(),
            sections = centerlines.len(),
            source = %self.source,
            "loaded GPX centerlines"
        );
        Ok(centerlines)
    }
}

/// Extract centerline sections from parsed GPX data
///
/// Segments with fewer than 2 points carry no geometry and are dropped.
pub fn centerlines_from_gpx(gpx: &gpx::Gpx, source: &str, priority: u32) -> Vec<Centerline> {
    gpx.tracks
        .iter()
        .flat_map(|track| &track.segments)
        .filter(|segment| segment.points.len() >= 2)
        .map(|segment| {
            let line = LineString::from_iter(segment.points.iter().map(|w| w.point().0));
            Centerline::new(source, priority, line)
        })
        .collect()
}

/// Resolve a path relative to a base directory unless already absolute
pub(crate) fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpx::{Gpx, Track, TrackSegment, Waypoint};

    fn create_test_waypoint(lat: f64, lon: f64, elevation: Option<f64>) -> Waypoint {
        let mut waypoint = Waypoint::new(geo::Point::new(lon, lat));
        waypoint.elevation = elevation;
        waypoint
    }

    fn create_test_gpx() -> Gpx {
        let mut gpx = Gpx::default();
        let mut track = Track::default();

        let mut segment = TrackSegment::default();
        for i in 0..10 {
            segment.points.push(create_test_waypoint(
                36.0 + i as f64 * 0.01,
                -118.0 + i as f64 * 0.01,
                Some(2000.0 + i as f64),
            ));
        }
        track.segments.push(segment);

        // Degenerate single-point segment, must be dropped
        let mut stub = TrackSegment::default();
        stub.points.push(create_test_waypoint(36.5, -118.5, None));
        track.segments.push(stub);

        gpx.tracks.push(track);
        gpx
    }

    #[test]
    fn test_centerlines_from_gpx() {
        let gpx = create_test_gpx();
        let centerlines = centerlines_from_gpx(&gpx, "halfmile", 2);
        assert_eq!(centerlines.len(), 1);
        assert_eq!(centerlines[0].source, "halfmile");
        assert_eq!(centerlines[0].priority, 2);

        // x is longitude, y is latitude, elevation is gone
        let first = centerlines[0].line.0[0];
        assert!((first.x - -118.0).abs() < 1e-12);
        assert!((first.y - 36.0).abs() < 1e-12);
    }

    #[test]
    fn test_geojson_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [-118.3, 36.6, 4421.0]
                    },
                    "properties": {"UNIT_NAME": "Mount Whitney", "agency": "NPS"}
                },
                {
                    "type": "Feature",
                    "geometry": null,
                    "properties": {"UNIT_NAME": "ghost"}
                }
            ]
        }"#;
        let parsed: geojson::GeoJson = text.parse().unwrap();
        let features = features_from_geojson(parsed, "UNIT_NAME").unwrap();

        // Geometry-less feature skipped
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name.as_deref(), Some("Mount Whitney"));
        assert_eq!(features[0].properties["agency"], serde_json::json!("NPS"));

        // 3D position flattened before conversion
        let geo::Geometry::Point(p) = &features[0].geometry else {
            panic!("expected Point");
        };
        assert!((p.x() - -118.3).abs() < 1e-12);
        assert!((p.y() - 36.6).abs() < 1e-12);
    }

    #[test]
    fn test_geojson_bare_geometry() {
        let text = r#"{"type": "LineString", "coordinates": [[-118.0, 36.0], [-118.1, 36.1]]}"#;
        let parsed: geojson::GeoJson = text.parse().unwrap();
        let features = features_from_geojson(parsed, "name").unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].name.is_none());
        assert!(matches!(features[0].geometry, geo::Geometry::LineString(_)));
    }

    #[test]
    fn test_geojson_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passes.geojson");
        std::fs::write(
            &path,
            r#"{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-120.0, 39.0]},
                "properties": {"name": "Donner Pass"}
            }"#,
        )
        .unwrap();

        let source = GeoJsonFileSource::new(&path);
        assert_eq!(source.name(), "passes");

        let features = source.load(None).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name.as_deref(), Some("Donner Pass"));

        // Bounding box filter keeps only intersecting features
        let hit = geo::Rect::new((-121.0, 38.0), (-119.0, 40.0));
        assert_eq!(source.load(Some(hit)).unwrap().len(), 1);
        let miss = geo::Rect::new((-10.0, 0.0), (10.0, 10.0));
        assert!(source.load(Some(miss)).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/data/pct");
        assert_eq!(
            resolve_path(base, Path::new("layers/a.geojson")),
            PathBuf::from("/data/pct/layers/a.geojson")
        );
        assert_eq!(
            resolve_path(base, Path::new("/abs/a.geojson")),
            PathBuf::from("/abs/a.geojson")
        );
    }
}

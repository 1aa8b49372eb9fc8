//! Validated GeoJSON export
//!
//! Everything written to disk satisfies the same contract: WGS84 coordinates,
//! 2D positions, repaired polygon rings, and properties that only carry keys
//! with actual values. Files are written to a sibling temp file and renamed
//! into place so readers never observe a half-written collection.

use crate::attribute::FeatureRecord;
use crate::geom::{ensure_valid, truncate_precision};
use crate::trail::AssembledTrail;
use crate::{Error, Result};
use geo::{Geometry, HasDimensions};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Build a `FeatureCollection` from attributed records
///
/// Geometries are repaired and, when `precision` is set, coordinate-truncated;
/// records with empty geometry are dropped with a warning. Properties pass
/// through the upstream keys, then add `name`, `length_m`, `source` and
/// summary fields only where present.
pub fn feature_collection(
    records: &[FeatureRecord],
    precision: Option<u32>,
) -> FeatureCollection {
    let features = records
        .iter()
        .filter(|record| {
            if record.geometry.is_empty() {
                tracing::warn!(
                    name = record.name.as_deref().unwrap_or("<unnamed>"),
                    "dropping feature with empty geometry"
                );
                return false;
            }
            true
        })
        .map(|record| Feature {
            bbox: None,
            geometry: Some(export_geometry(&record.geometry, precision)),
            id: None,
            properties: Some(export_properties(record)),
            foreign_members: None,
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn export_geometry(geometry: &Geometry<f64>, precision: Option<u32>) -> geojson::Geometry {
    let valid = ensure_valid(geometry);
    let prepared = match precision {
        Some(digits) => truncate_precision(&valid, digits),
        None => valid,
    };
    geojson::Geometry::new(geojson::Value::from(&prepared))
}

fn export_properties(record: &FeatureRecord) -> JsonObject {
    let mut properties: Map<String, Value> = record.properties.clone();
    if let Some(name) = &record.name {
        properties.insert("name".to_string(), json!(name));
    }
    if record.trail_length_m > 0.0 {
        properties.insert("length_m".to_string(), json!(record.trail_length_m));
    }
    if !record.source.is_empty() {
        properties.insert("source".to_string(), json!(record.source));
    }
    if let Some(summary) = &record.summary {
        properties.insert("summary".to_string(), json!(summary.extract));
        properties.insert("summary_title".to_string(), json!(summary.title));
        if let Some(url) = &summary.url {
            properties.insert("summary_url".to_string(), json!(url));
        }
        if let Some(image) = &summary.image {
            properties.insert("image".to_string(), json!(image));
        }
    }
    properties
}

/// Write an attributed layer to `path` as a GeoJSON `FeatureCollection`
pub fn write_layer(path: &Path, records: &[FeatureRecord], precision: Option<u32>) -> Result<()> {
    let collection = feature_collection(records, precision);
    write_atomic(path, &serde_json::to_vec(&collection)?)?;
    tracing::info!(path = %path.display(), features = records.len(), "wrote layer");
    Ok(())
}

/// Write an assembled trail as a single-feature `FeatureCollection`
///
/// The feature geometry is the ordered span `MultiLineString`; properties
/// carry the trail code, covered mileage and gap count.
pub fn write_trail(path: &Path, trail: &AssembledTrail, precision: Option<u32>) -> Result<()> {
    let mut properties = JsonObject::new();
    properties.insert("code".to_string(), json!(trail.code));
    properties.insert("length_m".to_string(), json!(trail.length_m));
    properties.insert("gap_count".to_string(), json!(trail.gap_count()));

    let feature = Feature {
        bbox: None,
        geometry: Some(export_geometry(&trail.geometry(), precision)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };
    let collection = FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    };
    write_atomic(path, &serde_json::to_vec(&collection)?)?;
    tracing::info!(path = %path.display(), trail = %trail.code, "wrote trail");
    Ok(())
}

/// Write bytes to a sibling temp file and rename into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path)?;
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("output path has no file name: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::Summary;
    use geo::{MultiLineString, line_string, polygon};

    fn record(name: Option<&str>, trail_length_m: f64) -> FeatureRecord {
        FeatureRecord {
            name: name.map(String::from),
            geometry: Geometry::Polygon(polygon![
                (x: -118.123456789, y: 36.1),
                (x: -118.0, y: 36.1),
                (x: -118.0, y: 36.2),
            ]),
            properties: Map::new(),
            source: "usfs_wilderness".to_string(),
            trail_length_m,
            summary: None,
        }
    }

    #[test]
    fn test_properties_only_present_keys() {
        let bare = record(None, 0.0);
        let collection = feature_collection(&[bare], None);
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert!(!properties.contains_key("name"));
        assert!(!properties.contains_key("length_m"));
        assert!(!properties.contains_key("summary"));
        assert_eq!(properties["source"], json!("usfs_wilderness"));

        let mut full = record(Some("Golden Trout Wilderness"), 1609.344);
        full.summary = Some(Summary {
            title: "Golden Trout Wilderness".to_string(),
            extract: "A wilderness area.".to_string(),
            url: Some("https://en.wikipedia.org/wiki/Golden_Trout_Wilderness".to_string()),
            image: None,
        });
        let collection = feature_collection(&[full], None);
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["name"], json!("Golden Trout Wilderness"));
        assert!((properties["length_m"].as_f64().unwrap() - 1609.344).abs() < 1e-9);
        assert_eq!(properties["summary"], json!("A wilderness area."));
        assert!(properties.contains_key("summary_url"));
        assert!(!properties.contains_key("image"));
    }

    #[test]
    fn test_empty_geometry_dropped() {
        let mut empty = record(Some("ghost"), 0.0);
        empty.geometry = Geometry::MultiPolygon(geo::MultiPolygon::new(Vec::new()));
        let collection = feature_collection(&[empty, record(None, 0.0)], None);
        assert_eq!(collection.features.len(), 1);
    }

    #[test]
    fn test_upstream_properties_pass_through() {
        let mut r = record(Some("x"), 0.0);
        r.properties.insert("agency".to_string(), json!("USFS"));
        let collection = feature_collection(&[r], None);
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["agency"], json!("USFS"));
    }

    #[test]
    fn test_precision_truncation_applied() {
        let collection = feature_collection(&[record(None, 0.0)], Some(5));
        let geometry = collection.features[0].geometry.as_ref().unwrap();
        if let geojson::Value::Polygon(rings) = &geometry.value {
            assert!((rings[0][0][0] - -118.12346).abs() < 1e-9);
        } else {
            panic!("expected Polygon");
        }
    }

    #[test]
    fn test_write_layer_roundtrip_and_no_temp_leftover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wilderness.geojson");
        write_layer(&path, &[record(Some("a"), 0.0)], Some(6)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let parsed: geojson::GeoJson = text.parse().unwrap();
        assert!(matches!(parsed, geojson::GeoJson::FeatureCollection(fc) if fc.features.len() == 1));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_trail_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.geojson");
        let trail = AssembledTrail {
            code: "pct".to_string(),
            spans: MultiLineString::new(vec![
                line_string![(x: -118.0, y: 36.0), (x: -118.1, y: 36.1)],
                line_string![(x: -118.2, y: 36.2), (x: -118.3, y: 36.3)],
            ]),
            length_m: 32186.88,
        };
        write_trail(&path, &trail, None).unwrap();

        let parsed: geojson::GeoJson = fs::read_to_string(&path).unwrap().parse().unwrap();
        let geojson::GeoJson::FeatureCollection(fc) = parsed else {
            panic!("expected FeatureCollection");
        };
        let properties = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["code"], json!("pct"));
        assert_eq!(properties["gap_count"], json!(1));
        assert!((properties["length_m"].as_f64().unwrap() - 32186.88).abs() < 1e-6);
    }
}

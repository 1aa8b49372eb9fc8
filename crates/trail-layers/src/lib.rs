//! Trail Layers - Geometry assembly for trail-relative map data
//!
//! This library turns raw geospatial datasets into GeoJSON layers organized
//! around a named trail. The core pieces are:
//!
//! - **[`crs`]**: coordinate reference systems and reprojection
//! - **[`geom`]**: buffering, precision truncation and geometry cleanup
//! - **[`grid`]**: regular-grid cell lookup for dataset coverage
//! - **[`trail`]**: merging multiple centerline sources into one reference line
//! - **[`attribute`]**: per-feature intersecting-length computation
//! - **[`enrich`]**: best-effort encyclopedia summary matching
//! - **[`source`]**: GeoJSON and GPX dataset ingestion
//! - **[`output`]**: validated GeoJSON `FeatureCollection` export
//! - **[`tiles`]**: slippy-map tile enumeration for cache seeding
//! - **[`pipeline`]**: one-shot batch orchestration of the above
//!
//! All metric work (buffer distances, intersection lengths) happens in an
//! equal-area projected CRS; everything written to disk is WGS84 and 2D.

pub mod attribute;
pub mod crs;
pub mod enrich;
pub mod geom;
pub mod grid;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod tiles;
pub mod trail;

// Public API exports
pub use attribute::{FeatureRecord, RawFeature, attribute_layer, attribute_length};
pub use crs::{Crs, reproject, reproject_named};
pub use enrich::{StaticSummarySource, Summary, SummarySource, enrich_features};
pub use geom::{DistanceUnit, buffer, buffer_rings, truncate_precision};
pub use grid::{GridSpec, cells_for_geometry};
pub use output::{write_layer, write_trail};
pub use pipeline::{LayerReport, PipelineConfig, RunReport, run};
pub use source::{FeatureSource, GeoJsonFileSource, GpxCenterlineSource};
pub use tiles::{TileId, TileScheme, tiles_for_geometry};
pub use trail::{AssembledTrail, AssemblerConfig, Centerline, CenterlineSet};

/// Error types for the trail-layers pipeline
///
/// CRS and trail-identity errors are fatal to a run; enrichment failures are
/// recovered per feature and never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unrecognized coordinate reference system: {0}")]
    InvalidCrs(String),

    #[error("no centerline sources registered for trail code: {0}")]
    UnknownTrail(String),

    #[error("cannot resolve direction for span from source {origin} near ({x}, {y})")]
    AmbiguousOrdering { origin: String, x: f64, y: f64 },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("enrichment lookup failed: {0}")]
    Enrichment(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("GPX parsing error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_format() {
        let err = Error::UnknownTrail("pct".to_string());
        assert!(err.to_string().contains("pct"));

        let err = Error::InvalidCrs("epsg:99999".to_string());
        assert!(err.to_string().contains("epsg:99999"));

        let err = Error::AmbiguousOrdering {
            origin: "gps".to_string(),
            x: -118.0,
            y: 36.0,
        };
        assert!(err.to_string().contains("gps"));
        assert!(std::error::Error::source(&err).is_none());
    }
}

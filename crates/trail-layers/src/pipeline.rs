//! One-shot batch orchestration
//!
//! A JSON manifest names the trail, its centerline providers, the layers to
//! attribute and where the output goes. [`run`] executes the whole batch:
//! assemble the trail, attribute every layer against it, enrich named
//! features and write validated GeoJSON. Relative paths in the manifest
//! resolve against the manifest's own directory.

use crate::attribute::attribute_layer;
use crate::enrich::{StaticSummarySource, enrich_features};
use crate::geom::{DistanceUnit, buffer};
use crate::output::{write_layer, write_trail};
use crate::source::{
    FeatureSource, GeoJsonFileSource, GpxCenterlineSource, features_from_geojson, resolve_path,
};
use crate::trail::{AssembledTrail, AssemblerConfig, Centerline, CenterlineSet};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Batch manifest, deserialized from JSON
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Short identifier for the trail, e.g. `"pct"`; also the trail output
    /// file stem
    pub trail_code: String,
    pub centerlines: Vec<CenterlineSourceConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    pub output_dir: PathBuf,
    /// Optional snapshot of encyclopedia summaries for enrichment
    #[serde(default)]
    pub summaries: Option<PathBuf>,
    /// Output coordinate decimal places; `null` disables truncation
    #[serde(default = "default_precision")]
    pub precision: Option<u32>,
    #[serde(default)]
    pub assembler: AssemblerConfig,
    /// Directory relative paths resolve against, set at load time
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_precision() -> Option<u32> {
    Some(6)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CenterlineFormat {
    #[default]
    Gpx,
    Geojson,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CenterlineSourceConfig {
    pub path: PathBuf,
    /// Provider name recorded on each section
    pub source: String,
    /// Lower is more authoritative
    pub priority: u32,
    #[serde(default)]
    pub format: CenterlineFormat,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    /// Layer name, also the output file stem
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    /// Source attribution recorded on output features; defaults to the
    /// layer name
    #[serde(default)]
    pub source: Option<String>,
    /// Attach encyclopedia summaries to named features in this layer
    #[serde(default)]
    pub enrich: bool,
    /// Buffer each feature's geometry by this distance before attribution
    #[serde(default)]
    pub buffer: Option<f64>,
    #[serde(default)]
    pub buffer_unit: DistanceUnit,
}

fn default_name_property() -> String {
    "name".to_string()
}

impl PipelineConfig {
    /// Load and validate a manifest from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.trail_code.is_empty() {
            return Err(Error::Config("trail_code must not be empty".to_string()));
        }
        if self.centerlines.is_empty() {
            return Err(Error::Config(
                "at least one centerline source is required".to_string(),
            ));
        }
        let mut names: Vec<&str> = self.layers.iter().map(|l| l.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Config("layer names must be unique".to_string()));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.base_dir, path)
    }
}

/// Per-layer outcome of a batch run
#[derive(Debug)]
pub struct LayerReport {
    pub name: String,
    pub features: usize,
    pub enriched: usize,
}

/// Outcome of a batch run
#[derive(Debug)]
pub struct RunReport {
    pub trail_code: String,
    pub trail_length_m: f64,
    pub span_count: usize,
    pub layers: Vec<LayerReport>,
}

/// Execute a whole batch described by `config`
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    let output_dir = config.resolve(&config.output_dir);
    std::fs::create_dir_all(&output_dir)?;

    let trail = assemble_trail(config)?;
    tracing::info!(
        trail = %trail.code,
        length_m = trail.length_m,
        spans = trail.spans.0.len(),
        "assembled trail centerline"
    );
    write_trail(
        &output_dir.join(format!("{}.geojson", trail.code)),
        &trail,
        config.precision,
    )?;

    let summaries = match &config.summaries {
        Some(path) => Some(StaticSummarySource::from_path(&config.resolve(path))?),
        None => None,
    };

    let mut layer_reports = Vec::with_capacity(config.layers.len());
    for layer in &config.layers {
        let source_name = layer.source.clone().unwrap_or_else(|| layer.name.clone());
        let source = GeoJsonFileSource::new(config.resolve(&layer.path))
            .with_source_name(&source_name)
            .with_name_property(&layer.name_property);
        let mut features = source.load(None)?;
        if let Some(distance) = layer.buffer {
            for feature in &mut features {
                feature.geometry = geo::Geometry::MultiPolygon(buffer(
                    &feature.geometry,
                    distance,
                    layer.buffer_unit,
                )?);
            }
        }
        let mut records = attribute_layer(features, &trail, source.name());

        let enriched = match (&summaries, layer.enrich) {
            (Some(source), true) => enrich_features(&mut records, source),
            _ => 0,
        };

        write_layer(
            &output_dir.join(format!("{}.geojson", layer.name)),
            &records,
            config.precision,
        )?;
        layer_reports.push(LayerReport {
            name: layer.name.clone(),
            features: records.len(),
            enriched,
        });
    }

    Ok(RunReport {
        trail_code: trail.code.clone(),
        trail_length_m: trail.length_m,
        span_count: trail.spans.0.len(),
        layers: layer_reports,
    })
}

fn assemble_trail(config: &PipelineConfig) -> Result<AssembledTrail> {
    let mut set = CenterlineSet::new();
    for source in &config.centerlines {
        for section in load_centerlines(config, source)? {
            set.register(&config.trail_code, section);
        }
    }
    set.assemble(&config.trail_code, &config.assembler)
}

fn load_centerlines(
    config: &PipelineConfig,
    source: &CenterlineSourceConfig,
) -> Result<Vec<Centerline>> {
    let path = config.resolve(&source.path);
    match source.format {
        CenterlineFormat::Gpx => {
            GpxCenterlineSource::new(path, &source.source, source.priority).load()
        }
        CenterlineFormat::Geojson => {
            let text = std::fs::read_to_string(&path)?;
            let features = features_from_geojson(text.parse()?, "name")?;
            let mut sections = Vec::new();
            for feature in features {
                match feature.geometry {
                    geo::Geometry::LineString(line) => {
                        sections.push(Centerline::new(&source.source, source.priority, line));
                    }
                    geo::Geometry::MultiLineString(mls) => {
                        sections.extend(mls.0.into_iter().map(|line| {
                            Centerline::new(&source.source, source.priority, line)
                        }));
                    }
                    other => {
                        tracing::warn!(
                            path = %path.display(),
                            geometry = %geometry_kind(&other),
                            "ignoring non-line geometry in centerline file"
                        );
                    }
                }
            }
            if sections.is_empty() {
                return Err(Error::InvalidGeometry(format!(
                    "no line geometry in centerline file {}",
                    path.display()
                )));
            }
            Ok(sections)
        }
    }
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

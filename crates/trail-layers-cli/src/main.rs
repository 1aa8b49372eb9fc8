use clap::{Parser, Subcommand};
use geo::{Geometry, GeometryCollection};
use std::path::PathBuf;
use trail_layers::{
    DistanceUnit, Error, FeatureSource, GeoJsonFileSource, PipelineConfig, TileScheme, buffer,
    run, tiles_for_geometry,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Trail Layers - build trail-relative GeoJSON map layers
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch build described by a JSON manifest
    Build {
        /// Path to the manifest
        manifest: PathBuf,
    },
    /// List the map tiles covering a geometry, one `[x, y, z]` per line
    Tiles {
        /// GeoJSON file with the geometry to cover
        geometry: PathBuf,
        #[clap(long, default_value_t = 8)]
        min_zoom: u8,
        #[clap(long, default_value_t = 14)]
        max_zoom: u8,
        /// Buffer distance in miles applied to the geometry first
        #[clap(long, default_value_t = 0.0)]
        buffer: f64,
        /// Number tile rows bottom-up (TMS) instead of top-down (XYZ)
        #[clap(long)]
        tms: bool,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(err) = execute(cli) {
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> trail_layers::Result<()> {
    match cli.command {
        Command::Build { manifest } => {
            let config = PipelineConfig::from_path(&manifest)?;
            let report = run(&config)?;
            println!(
                "{}: {:.1} mi across {} span(s)",
                report.trail_code,
                report.trail_length_m / DistanceUnit::METERS_PER_MILE,
                report.span_count
            );
            for layer in &report.layers {
                println!(
                    "  {}: {} feature(s), {} enriched",
                    layer.name, layer.features, layer.enriched
                );
            }
        }
        Command::Tiles {
            geometry,
            min_zoom,
            max_zoom,
            buffer: buffer_miles,
            tms,
        } => {
            if min_zoom > max_zoom {
                return Err(Error::Config(format!(
                    "min zoom {min_zoom} exceeds max zoom {max_zoom}"
                )));
            }
            let geometry = load_geometry(&geometry)?;
            let geometry = if buffer_miles > 0.0 {
                Geometry::MultiPolygon(buffer(&geometry, buffer_miles, DistanceUnit::Mile)?)
            } else {
                geometry
            };
            let scheme = if tms { TileScheme::Tms } else { TileScheme::Xyz };
            for tile in tiles_for_geometry(&geometry, min_zoom, max_zoom, scheme) {
                println!("{tile}");
            }
        }
    }
    Ok(())
}

/// Load a GeoJSON file as one geometry, collecting multiple features
fn load_geometry(path: &PathBuf) -> trail_layers::Result<Geometry<f64>> {
    let mut features = GeoJsonFileSource::new(path).load(None)?;
    match features.len() {
        0 => Err(Error::InvalidGeometry(format!(
            "no features in {}",
            path.display()
        ))),
        1 => Ok(features.remove(0).geometry),
        _ => Ok(Geometry::GeometryCollection(GeometryCollection::from_iter(
            features.into_iter().map(|f| f.geometry),
        ))),
    }
}

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fieldscope::{
    config::Config,
    geometry::{Bounds, GeoPoint},
    heat::{HeatLayer, Sample, Viewport},
    telemetry, web, ValiditySignal,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Field territory editor and heat overlay service")]
struct Cli {
    /// Path to the configuration YAML file
    #[arg(long, global = true, default_value = "fieldscope.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Directory holding the territory file
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate a ring of `[lat, lng]` pairs and report its area
    Area { points: PathBuf },
    /// Render a sample batch to a PNG overlay
    Render {
        samples: PathBuf,
        #[arg(long, default_value = "heat.png")]
        out: PathBuf,
        #[arg(long, default_value_t = 720)]
        width: u32,
        #[arg(long, default_value_t = 360)]
        height: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)?;
    telemetry::init(&config.logging.level);

    match cli.command {
        Command::Serve {
            host,
            port,
            data_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = data_dir {
                config.store.dir = dir;
            }
            web::run(config).await
        }
        Command::Area { points } => {
            let text = fs::read_to_string(&points)
                .with_context(|| format!("Failed to read {}", points.display()))?;
            let ring: Vec<GeoPoint> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", points.display()))?;
            let signal = ValiditySignal::evaluate(&ring);
            println!("{}", serde_json::to_string_pretty(&signal)?);
            Ok(())
        }
        Command::Render {
            samples,
            out,
            width,
            height,
        } => {
            let text = fs::read_to_string(&samples)
                .with_context(|| format!("Failed to read {}", samples.display()))?;
            let batch: Vec<Sample> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", samples.display()))?;

            let mut layer = HeatLayer::new(config.heat.interpolation(), config.heat.renderer());
            layer.replace_samples(batch);
            let viewport = Viewport::new(Bounds::world(), width, height)?;
            let raster = layer.render(&viewport);
            fs::write(&out, raster.to_png()?)
                .with_context(|| format!("Failed to write {}", out.display()))?;

            if let Some(stats) = layer.stats() {
                println!(
                    "Rendered {} samples (min {:.1}, max {:.1}, mean {:.1}) to {}",
                    stats.count,
                    stats.min,
                    stats.max,
                    stats.mean,
                    out.display()
                );
            } else {
                println!("No samples; wrote empty overlay to {}", out.display());
            }
            Ok(())
        }
    }
}

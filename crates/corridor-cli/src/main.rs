//! Corridor planner CLI: cost surfaces and least-cost routes.

mod backoff;
mod config;
mod input;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use corridor_core::{CancelToken, CorridorEngine, PresetRef, SolverOptions, SurfaceRequest};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::input::Loader;

#[derive(Parser, Debug)]
#[command(author, version, about = "Utility corridor cost surfaces and least-cost routing")]
struct Cli {
    /// Directory of named presets (`*.json`)
    #[arg(long, global = true)]
    preset_dir: Option<PathBuf>,

    /// Directory for mosaics and routes
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Attempts per input file after the first failure
    #[arg(long, global = true)]
    retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the cost surface and write it as a tiled mosaic
    Surface(SurfaceArgs),
    /// Route over a previously written mosaic
    Route(RouteArgs),
    /// Build the cost surface, then route over it
    Run {
        #[command(flatten)]
        surface: SurfaceArgs,
        #[command(flatten)]
        route: SketchArgs,
    },
    /// List presets in the preset directory
    Presets,
}

#[derive(Args, Debug)]
struct SurfaceArgs {
    /// Preset name, or path to an inline preset `.json`
    #[arg(long)]
    preset: String,

    /// Project area GeoJSON; defaults to the preset's `project_area_geometry`
    #[arg(long)]
    project_area: Option<PathBuf>,

    /// Directory of `<layer>.geojson` files; defaults to the preset's `input_source`
    #[arg(long)]
    layers: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SketchArgs {
    /// Route sketch GeoJSON (LineString, start to end through stops)
    #[arg(long)]
    sketch: PathBuf,

    /// Wall-clock budget per route segment, in seconds
    #[arg(long)]
    budget_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Mosaic descriptor written by `surface`
    #[arg(long)]
    mosaic: PathBuf,

    #[command(flatten)]
    sketch: SketchArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("corridor=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.preset_dir {
        config.preset_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(retries) = cli.retries {
        config.load_retries = retries;
    }

    let loader = Loader::new(config.load_retries);
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Presets => {
            let registry = loader.load_registry(&config.preset_dir).await?;
            for name in registry.names() {
                println!("{name}");
            }
        }
        Command::Surface(args) => {
            let engine = CorridorEngine::new(loader.load_registry(&config.preset_dir).await?);
            let (request, name) = surface_request(&engine, &loader, &args).await?;
            let task_cancel = cancel.clone();
            let surface = tokio::task::spawn_blocking(move || engine.build_cost_surface(&request, &task_cancel))
                .await??;
            output::write_mosaic(&config.output_dir, &surface, &name).await?;
        }
        Command::Route(args) => {
            let sketch = input::sketch(&loader.read(&args.sketch.sketch).await?)?;
            let options = solver_options(&config, &args.sketch);
            let (descriptor, route) =
                output::route_mosaic(&args.mosaic, &loader, sketch, options, cancel.clone()).await?;
            output::write_route(&config.output_dir, &descriptor.name, &route).await?;
        }
        Command::Run { surface, route } => {
            let engine = CorridorEngine::new(loader.load_registry(&config.preset_dir).await?);
            let (request, name) = surface_request(&engine, &loader, &surface).await?;
            let sketch = input::sketch(&loader.read(&route.sketch).await?)?;
            let options = solver_options(&config, &route);
            let task_cancel = cancel.clone();
            let (composite, result) = tokio::task::spawn_blocking(move || {
                engine.run(&request, &sketch, &options, &task_cancel)
            })
            .await??;
            output::write_mosaic(&config.output_dir, &composite, &name).await?;
            output::write_route(&config.output_dir, &name, &result).await?;
        }
    }

    Ok(())
}

fn solver_options(config: &Config, args: &SketchArgs) -> SolverOptions {
    let budget = args
        .budget_secs
        .map(Duration::from_secs)
        .unwrap_or(config.segment_budget);
    SolverOptions {
        segment_budget: Some(budget),
    }
}

/// Resolve the preset and gather its inputs. Returns the request and the
/// output base name.
async fn surface_request(
    engine: &CorridorEngine,
    loader: &Loader,
    args: &SurfaceArgs,
) -> Result<(SurfaceRequest, String)> {
    let preset_ref = loader.preset_ref(&args.preset).await?;
    let preset = engine
        .resolve(&preset_ref)
        .with_context(|| format!("Unknown preset {}", args.preset))?
        .clone();

    let Some(area_path) = args
        .project_area
        .clone()
        .or_else(|| preset.general.project_area_geometry.as_ref().map(PathBuf::from))
    else {
        bail!("no project area: pass --project-area or set general.project_area_geometry");
    };
    let project_area = input::project_area(&loader.read(&area_path).await?)
        .with_context(|| format!("Invalid project area {}", area_path.display()))?;

    let Some(source) = args
        .layers
        .clone()
        .or_else(|| preset.general.input_source.as_ref().map(PathBuf::from))
    else {
        bail!("no vector source: pass --layers or set general.input_source");
    };
    let layers = loader.layers(&source, &preset).await?;

    let name = preset.general.output_name();
    Ok((
        SurfaceRequest {
            preset: PresetRef::Inline(Box::new(preset)),
            project_area,
            layers,
        },
        name,
    ))
}

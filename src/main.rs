use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use subway_isochrones::{
    accessibility::{Accessibility, RasterOptions, raster::DEFAULT_CELL_SIZE_DEG, to_feature_collection},
    contour::{ContourDataset, names},
    geo::GeoPoint,
    server::{self, AppState},
    services::HttpServices,
};

#[derive(Parser)]
#[command(version, about = "Subway travel-time surfaces for one or two origins")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Rasterize contour datasets into a GeoJSON overlay
    Grid(GridArgs),
    /// Look up the travel time at one point
    Probe(ProbeArgs),
    /// Print the spellings tried when fetching contour data for a station
    Candidates { name: String },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "ISOCHRONE_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Base URL of the geocode / nearest-station / contour-data service
    #[arg(long, env = "ISOCHRONE_UPSTREAM", default_value = "http://localhost:5000")]
    upstream: String,

    #[arg(long, env = "ISOCHRONE_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long, env = "ISOCHRONE_CELL_SIZE", default_value_t = DEFAULT_CELL_SIZE_DEG)]
    cell_size: f64,

    /// CORS origin to allow; any origin when unset
    #[arg(long, env = "ISOCHRONE_ALLOW_ORIGIN")]
    allow_origin: Option<String>,
}

#[derive(Args)]
struct DatasetArgs {
    /// Contour dataset for the first origin
    dataset: PathBuf,

    /// Contour dataset for a second origin; switches to summed times
    #[arg(long)]
    second: Option<PathBuf>,
}

#[derive(Args)]
struct GridArgs {
    #[command(flatten)]
    datasets: DatasetArgs,

    #[arg(long, default_value_t = DEFAULT_CELL_SIZE_DEG)]
    cell_size: f64,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ProbeArgs {
    #[command(flatten)]
    datasets: DatasetArgs,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lng: f64,
}

fn read_dataset(path: &Path) -> anyhow::Result<Arc<ContourDataset>> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let dataset = ContourDataset::from_json(&s)
        .with_context(|| format!("failed to parse contour data in {}", path.display()))?;
    Ok(Arc::new(dataset))
}

impl DatasetArgs {
    fn load(&self) -> anyhow::Result<Accessibility> {
        let first = read_dataset(&self.dataset)?;
        let second = self.second.as_deref().map(read_dataset).transpose()?;

        Accessibility::from_datasets(Some(first), second)
            .context("no usable stations in the given datasets")
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let services = HttpServices::new(&args.upstream, Duration::from_secs(args.timeout_secs))?;
    let state = Arc::new(AppState::new(
        services,
        RasterOptions::with_cell_size(args.cell_size),
    ));
    let cors = server::cors_layer(args.allow_origin.as_deref())?;

    info!(upstream = %args.upstream, "using upstream services");

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    server::serve(listener, server::create_router(state, cors)).await
}

fn grid(args: GridArgs) -> anyhow::Result<()> {
    let accessibility = args.datasets.load()?;

    let now = std::time::Instant::now();
    let cells = accessibility
        .surface()
        .rasterize(RasterOptions::with_cell_size(args.cell_size));
    info!(cells = cells.len(), mode = ?accessibility.mode(), elapsed = ?now.elapsed(), "rasterized");
    anyhow::ensure!(!cells.is_empty(), "no cells produced for cell size {}", args.cell_size);

    let collection = to_feature_collection(&cells)?;
    let json = serde_json::to_string(&collection)?;

    match args.output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}

fn probe(args: ProbeArgs) -> anyhow::Result<()> {
    let point = GeoPoint::new(args.lat, args.lng);
    anyhow::ensure!(point.is_finite(), "coordinates must be finite");

    let result = args
        .datasets
        .load()?
        .surface()
        .probe(point)
        .context("no stations to probe against")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Grid(args) => grid(args),
        Command::Probe(args) => probe(args),
        Command::Candidates { name } => {
            for candidate in names::candidates(&name) {
                println!("{candidate}");
            }
            Ok(())
        }
    }
}

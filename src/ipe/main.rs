// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use anyhow::{Context, Result};
use clap::Parser;
use rodovia::chainage::ChainageIndex;
use rodovia::config::RenderConfig;
use rodovia::loader::{read_network, read_records, write_feature_collection};
use rodovia::render::{RenderPass, Renderer, RequestFilter, RoadSegmentRequest};
use rodovia::resolver::CoordinateResolver;
use rodovia::segments::SegmentIndex;
use rodovia::vector_network::VectorNetwork;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
struct Sources {
    /// Official chainage sheet (road, km, "lat, lng")
    #[arg(long)]
    chainage: PathBuf,
    /// Linear segment sheet (meta.csv)
    #[arg(long)]
    segments: PathBuf,
    /// Highway network as a GeoJSON FeatureCollection
    #[arg(long)]
    network: Option<PathBuf>,
    /// RON file overriding sampler and extractor settings
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resolve every request row into a GeoJSON line
    Render {
        #[command(flatten)]
        sources: Sources,
        #[arg(long)]
        requests: PathBuf,
        #[arg(long, default_value = "segments.geojson")]
        output: PathBuf,
        /// Only rows whose road equals this value
        #[arg(long)]
        road: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        period: Option<String>,
    },
    /// Print the position of one kilometre of a road
    Resolve {
        #[command(flatten)]
        sources: Sources,
        #[arg(long)]
        road: String,
        #[arg(long)]
        km: f64,
    },
}

struct Indices {
    chainage: ChainageIndex,
    segments: SegmentIndex,
    network: VectorNetwork,
    config: RenderConfig,
}

fn load_config(path: Option<&Path>) -> Result<RenderConfig> {
    match path {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RenderConfig::default()),
    }
}

async fn load_indices(sources: Sources) -> Result<Indices> {
    let config = load_config(sources.config.as_deref())?;

    let chainage_path = sources.chainage.clone();
    let segments_path = sources.segments.clone();
    let network_path = sources.network.clone();

    // the three sources are independent; rendering waits for all of them
    let (chainage, segments, network) = tokio::try_join!(
        tokio::task::spawn_blocking(move || -> Result<ChainageIndex> {
            let rows = read_records(&chainage_path)
                .with_context(|| format!("Failed to read {}", chainage_path.display()))?;
            Ok(ChainageIndex::build(&rows))
        }),
        tokio::task::spawn_blocking(move || -> Result<SegmentIndex> {
            let rows = read_records(&segments_path)
                .with_context(|| format!("Failed to read {}", segments_path.display()))?;
            Ok(SegmentIndex::build(&rows))
        }),
        tokio::task::spawn_blocking(move || -> Result<VectorNetwork> {
            match network_path {
                Some(path) => {
                    let collection = read_network(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Ok(VectorNetwork::from_feature_collection(&collection))
                }
                None => Ok(VectorNetwork::default()),
            }
        }),
    )
    .context("Loader task panicked")?;

    Ok(Indices {
        chainage: chainage?,
        segments: segments?,
        network: network?,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Render {
            sources,
            requests,
            output,
            road,
            company,
            period,
        }) => {
            let indices = load_indices(sources).await?;
            let rows = read_records(&requests)
                .with_context(|| format!("Failed to read {}", requests.display()))?;

            let filter = RequestFilter {
                road,
                company,
                period,
            };
            let selected: Vec<RoadSegmentRequest> = filter
                .apply(&rows)
                .into_iter()
                .enumerate()
                .map(|(i, row)| RoadSegmentRequest::from_record(row, i))
                .collect();
            info!("{} of {} request rows selected", selected.len(), rows.len());

            let renderer = Renderer::new(
                &indices.chainage,
                &indices.segments,
                &indices.network,
                &indices.config,
            );
            let pass: RenderPass = renderer.render(&selected);

            let collection = pass.to_feature_collection(indices.config.path_opacity);
            write_feature_collection(&output, &collection)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} paths to {}", pass.segments.len(), output.display());
        }
        Some(Commands::Resolve { sources, road, km }) => {
            let indices = load_indices(sources).await?;
            let resolver = CoordinateResolver::new(&indices.chainage, &indices.segments);

            match resolver.resolve_with_source(&road, km) {
                Some((coord, from)) => {
                    println!("{}, {} ({:?})", coord.lat, coord.lng, from);
                }
                None => anyhow::bail!("{} km {} could not be resolved", road, km),
            }
        }
        None => {
            anyhow::bail!("No command specified. Use --help for available commands.");
        }
    }

    Ok(())
}

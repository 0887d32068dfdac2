use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use catalog::ViewerConfig;
use clap::{Parser, Subcommand};
use foundation::DatasetId;
use streaming::{ControlState, StreamingProgress, aggregate};
use tools::{SimulatedControl, SimulatedControlConfig, Step, simulate};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Point-cloud viewer tooling")]
struct Args {
    /// Viewer config JSON (default: built-in Cologne catalog)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog datasets and which start active
    Catalog,

    /// Show the loading overlay state for a streamed point count
    Progress {
        #[arg(long)]
        points: u64,

        /// Heuristic total to scale against (default: from config)
        #[arg(long)]
        total: Option<u64>,
    },

    /// Run a session against a simulated control and print the outcome
    Simulate {
        /// Dataset id to toggle, in order (repeatable)
        #[arg(long = "toggle")]
        toggles: Vec<String>,

        /// Dataset id whose loads fail (repeatable)
        #[arg(long = "fail")]
        failing: Vec<String>,

        /// Simulated load latency
        #[arg(long, default_value_t = 50)]
        latency_ms: u64,

        /// Pause between toggles
        #[arg(long, default_value_t = 0)]
        gap_ms: u64,

        /// Give up waiting for loads after this long
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ViewerConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(p) => {
            let raw = fs::read_to_string(p).map_err(|e| format!("read {p:?}: {e}"))?;
            ViewerConfig::from_json(&raw)?
        }
        None => ViewerConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Catalog => {
            let active = config.default_selection()?;
            for d in config.catalog.iter() {
                let mark = if active.contains(&d.source_location) { "x" } else { " " };
                println!("[{mark}] {:<12} {:<28} {}", d.id, d.display_name, d.source_location);
            }
        }
        Command::Progress { points, total } => {
            let state = ControlState {
                loading: false,
                streaming_active: true,
                streaming_progress: Some(StreamingProgress {
                    loaded_points: points,
                    is_loading: true,
                }),
            };
            let view = aggregate(&state, total.unwrap_or(config.assumed_total_points));
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Simulate {
            toggles,
            failing,
            latency_ms,
            gap_ms,
            timeout_ms,
        } => {
            let mut failing_locations = std::collections::BTreeSet::new();
            for id in failing {
                let id = DatasetId::from(id);
                let dataset = config
                    .catalog
                    .get(&id)
                    .ok_or_else(|| format!("unknown dataset id: {id}"))?;
                failing_locations.insert(dataset.source_location.clone());
            }

            let mut steps = Vec::new();
            for (i, id) in toggles.into_iter().enumerate() {
                if i > 0 && gap_ms > 0 {
                    steps.push(Step::Wait(Duration::from_millis(gap_ms)));
                }
                steps.push(Step::Toggle(DatasetId::from(id)));
            }

            let control = SimulatedControl::new(SimulatedControlConfig {
                latency: Duration::from_millis(latency_ms),
                failing: failing_locations,
                ..SimulatedControlConfig::default()
            });

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let local = tokio::task::LocalSet::new();
            let report = local.block_on(
                &rt,
                simulate(&config, &steps, control, Duration::from_millis(timeout_ms)),
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

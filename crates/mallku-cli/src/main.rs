//! mallku — the CLI wrapper, grounded on `agenticlaw-gateway/src/main.rs`
//! (clap `Parser`/`Subcommand`, `#[tokio::main]`, tracing init at the
//! binary entrypoint) and `agenticlaw-kg/src/main.rs` (a focused
//! single-purpose CLI driving one engine object). Subcommands match §6.

mod pipeline;
mod server;

use clap::{Parser, Subcommand};
use mallku_core::config::EngineConfig;
use mallku_core::Error;
use mallku_correlation::engine::{CorrelationEngine, NullAnchorSink, StoreAnchorSink};
use mallku_correlation::CorrelationFeedback;
use mallku_dialogue::DialogueOrchestrator;
use mallku_patterns::{PatternEvolution, PatternLibrary};
use mallku_wisdom::WisdomPreservation;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mallku", about = "Temporal correlation and pattern-evolution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the correlation engine, the two-lane scheduler, and the
    /// optional thin HTTP surface.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 7878)]
        port: u16,
    },
    /// Submit a JSON array of `CorrelationFeedback` from a file.
    Feedback {
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print Adaptive Thresholds state and a Pattern Library summary as JSON.
    ExportState {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Reset Scorer weights and Adaptive Thresholds to their defaults.
    ResetLearning {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

struct Runtime {
    engine: Arc<CorrelationEngine>,
    library: Arc<PatternLibrary>,
    evolution: Arc<PatternEvolution>,
    #[allow(dead_code)]
    dialogue: Arc<DialogueOrchestrator>,
    #[allow(dead_code)]
    wisdom: Arc<WisdomPreservation>,
}

fn data_dir() -> PathBuf {
    std::env::var("MALLKU_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./mallku-data"))
}

fn thresholds_path(dir: &std::path::Path) -> PathBuf {
    dir.join("thresholds.json")
}

fn build_runtime(config_path: Option<&std::path::Path>) -> mallku_core::Result<Runtime> {
    let config = EngineConfig::load(config_path)?;
    let dir = data_dir();
    let store = mallku_store::build_store(config.skip_database, &dir);

    let anchor_sink: Arc<dyn mallku_correlation::engine::MemoryAnchorSink> = if config.skip_database {
        Arc::new(NullAnchorSink)
    } else {
        Arc::new(StoreAnchorSink::new(store.clone()))
    };
    let engine = Arc::new(CorrelationEngine::new(config, Some(&thresholds_path(&dir)), anchor_sink));

    let library = Arc::new(PatternLibrary::new(store.clone()));
    let evolution = Arc::new(PatternEvolution::new(library.clone()));
    let dialogue = Arc::new(DialogueOrchestrator::new(library.clone()));
    let wisdom = Arc::new(WisdomPreservation::new(store));

    Ok(Runtime { engine, library, evolution, dialogue, wisdom })
}

#[tokio::main]
async fn main() {
    mallku_core::logging::init();
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        tracing::error!(error = %e, "mallku exited with an error");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> mallku_core::Result<()> {
    match cli.command {
        Commands::Serve { config, port } => serve(config.as_deref(), port).await,
        Commands::Feedback { file, config } => feedback(&file, config.as_deref()).await,
        Commands::ExportState { config } => export_state(config.as_deref()).await,
        Commands::ResetLearning { config } => reset_learning(config.as_deref()).await,
    }
}

async fn serve(config: Option<&std::path::Path>, port: u16) -> mallku_core::Result<()> {
    let runtime = build_runtime(config)?;

    let (_tx, rx) = mpsc::channel::<mallku_core::event::Event>(pipeline::EVENT_CHANNEL_CAPACITY);
    let tick = pipeline::spawn_tick_lane(runtime.engine.clone(), rx);
    let maintenance = pipeline::spawn_maintenance_lane(runtime.library.clone(), runtime.evolution.clone());

    info!("mallku serve starting");
    server::serve(server::ServerState { engine: runtime.engine.clone() }, port)
        .await
        .map_err(|e| Error::Configuration(e.to_string()))?;

    tick.abort();
    maintenance.abort();
    Ok(())
}

async fn feedback(file: &std::path::Path, config: Option<&std::path::Path>) -> mallku_core::Result<()> {
    let runtime = build_runtime(config)?;
    let text = std::fs::read_to_string(file)?;
    let items: Vec<CorrelationFeedback> = serde_json::from_str(&text)?;
    let count = items.len();
    for item in items {
        runtime.engine.add_feedback(item).await;
    }
    println!("submitted {count} feedback items");
    Ok(())
}

async fn export_state(config: Option<&std::path::Path>) -> mallku_core::Result<()> {
    let runtime = build_runtime(config)?;
    let thresholds = runtime.engine.thresholds_state().await;
    let weights = runtime.engine.scorer_weights().await;
    let patterns = runtime.library.summary();
    let out = serde_json::json!({
        "thresholds": thresholds,
        "scorer_weights": weights,
        "patterns": patterns,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn reset_learning(config: Option<&std::path::Path>) -> mallku_core::Result<()> {
    let runtime = build_runtime(config)?;
    runtime.engine.reset_learning().await?;
    println!("scorer weights and adaptive thresholds reset to defaults");
    Ok(())
}

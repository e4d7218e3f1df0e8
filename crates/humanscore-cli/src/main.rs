use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use humanscore_core::{build_registry, load_config, open_store, AnalysisPipeline};
use humanscore_schema::{AnalyzeRequest, StepEvent};
use humanscore_server::state::AppState;
use humanscore_store::SessionStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "humanscore", version, about = "humanscore response analysis service")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Root directory (contains config/, data/ and logs/)"
    )]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP API server")]
    Serve {
        #[arg(long, help = "Bind address, overrides server.bind in main.yaml")]
        bind: Option<String>,
    },
    #[command(about = "Validate config files")]
    Validate,
    #[command(about = "Run one analysis from a JSON file of steps and print the result")]
    Analyze {
        #[arg(help = "JSON file: either an array of steps or {steps, averageResponseTime}")]
        file: PathBuf,
    },
    #[command(about = "Print a stored session record")]
    Session {
        #[arg(help = "Session id")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "humanscore.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config_dir = cli.root.join("config");
    match command {
        Commands::Validate => {
            let config = load_config(&config_dir)?;
            let registry = build_registry(&config);
            println!(
                "Config valid. {} providers ({} with credentials), {} baselines, {} analysis links.",
                config.providers.len(),
                registry.list().len(),
                config.main.baselines.len(),
                config.main.analysis.chain.len()
            );
        }
        Commands::Serve { bind } => {
            let config = load_config(&config_dir)?;
            let addr = bind.unwrap_or_else(|| config.main.server.bind.clone());
            let state = AppState::from_config(&config, &cli.root)?;
            humanscore_server::serve(state, &addr).await?;
        }
        Commands::Analyze { file } => {
            let config = load_config(&config_dir)?;
            let request = read_analyze_request(&file)?;
            let registry = build_registry(&config);
            let pipeline = AnalysisPipeline::from_config(&config.main, &registry);
            let result = pipeline.analyze_submission(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Session { id } => {
            let config = load_config(&config_dir)?;
            let store = open_store(&config.main.store, &cli.root)?;
            match store.get(&id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("session not found: {id}"),
            }
        }
    }

    Ok(())
}

/// Accepts a bare array of steps as well as the HTTP request body shape.
fn read_analyze_request(path: &Path) -> Result<AnalyzeRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read steps file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse json: {}", path.display()))?;
    if value.is_array() {
        let steps: Vec<StepEvent> =
            serde_json::from_value(value).context("steps array has an invalid entry")?;
        return Ok(AnalyzeRequest {
            steps,
            average_response_time: None,
        });
    }
    serde_json::from_value(value).context("file is not an analyze request")
}

use clap::{command, Parser};
use scesim::{
    config::RunnerConfig,
    model::SimulationDocument,
    service::ScenarioRunnerService,
    session::InMemorySessionProvider,
    Error,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Simulation document to run
    #[arg(short, long, default_value = "data/sample_simulation.json")]
    model: PathBuf,

    /// Path to config file
    #[arg(short, long, default_value = "scesim.json")]
    config: PathBuf,

    /// Write the model with updated cell statuses here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

/// Returns whether every scenario passed.
async fn run(cli: &Cli) -> Result<bool, Error> {
    let config = if cli.config.exists() {
        RunnerConfig::from_file(&cli.config)?
    } else {
        RunnerConfig::default()
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let content = std::fs::read_to_string(&cli.model)?;
    let document: SimulationDocument = serde_json::from_str(&content)?;
    debug!(
        "{} fact type(s), {} scenario(s)",
        document.fact_types.fact_types().count(),
        document.model.simulation.scenarios.len()
    );

    // No rules: expectations are checked against the facts as inserted.
    let provider = InMemorySessionProvider::new(document.fact_types, Vec::new());
    let service = ScenarioRunnerService::new(Arc::new(provider), config);

    let identifier = cli
        .model
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let (model, report) = service
        .run_test_with_report(&identifier, &cli.model, document.model)
        .await?;

    println!("{}", report);

    if let Some(output) = &cli.output {
        std::fs::write(output, serde_json::to_string_pretty(&model)?)?;
        info!("model written to {}", output.display());
    }
    Ok(report.passed())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

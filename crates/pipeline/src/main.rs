//! Melt Outcome Pipeline - Main Entry Point

use clap::{Parser, Subcommand};
use feature_engine::FeatureAssembler;
use pipeline::{connect, evaluate, extract, init_logging, submit, write_schema, PipelineConfig};
use std::path::PathBuf;
use tabular::QueryService;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a feature table and write it as CSV
    Extract {
        /// `train` or `test`
        #[arg(short, long, default_value = "train")]
        mode: String,
    },
    /// Cross-validate the configured model on the train melts
    Evaluate,
    /// Fit on train melts and write predictions for the test melts
    Submit,
}

async fn run<S: QueryService>(
    command: Command,
    assembler: &FeatureAssembler<S>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    match command {
        Command::Extract { mode } => {
            let path = extract(assembler, &mode, &config.output.dir).await?;
            info!("Features: {}", path.display());
        }
        Command::Evaluate => {
            let report = evaluate(assembler, &config.evaluation).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Submit => {
            let path = submit(assembler, &config.evaluation, &config.output.dir).await?;
            info!("Submission: {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("=== Melt Outcome Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::load(args.config.as_deref())?;
    let service = connect(&config.database).await?;

    let mut assembler = FeatureAssembler::from_config(service, config.features.clone());
    let schema = assembler.fit().await?;
    write_schema(schema, &config.output.dir)?;

    let outcome = run(args.command, &assembler, &config).await;

    assembler.service().close().await;
    outcome
}

//! Command-line front end for the quorum engine.

#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use quorum_core::{AnalysisRequest, ModelConfig, PricingEngine};
use quorum_engine::{EngineConfig, GovernanceEngine, StreamEvent};

/// Multi-model governance analysis from the terminal.
#[derive(Parser, Debug)]
#[command(name = "quorum")]
#[command(about = "Fan a governance query out to multiple models and judge the answers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a query against every model in a manifest
    Analyze {
        /// The governance question to ask
        #[arg(long)]
        query: String,

        /// YAML manifest listing the models to invoke
        #[arg(long, default_value = "models.yaml")]
        manifest: PathBuf,

        /// Emit results incrementally as SSE frames instead of one JSON array
        #[arg(long)]
        stream: bool,

        /// Judge model for the accuracy pass
        #[arg(long)]
        evaluator: Option<String>,

        /// Governance context tag recorded with each result
        #[arg(long)]
        context: Option<String>,

        /// Directory of pricing rate tables
        #[arg(long, default_value = "rates")]
        rates_dir: PathBuf,
    },
    /// Price a hypothetical call against the rate tables
    Rates {
        /// Host platform of the model (e.g. aws_bedrock, openai)
        #[arg(long)]
        provider: String,

        /// Model identifier to price
        #[arg(long)]
        model: String,

        #[arg(long)]
        input_tokens: u32,

        #[arg(long)]
        output_tokens: u32,

        /// Directory of pricing rate tables
        #[arg(long, default_value = "rates")]
        rates_dir: PathBuf,
    },
}

/// On-disk model manifest.
#[derive(Debug, Deserialize)]
struct Manifest {
    models: Vec<ModelConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quorum=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            query,
            manifest,
            stream,
            evaluator,
            context,
            rates_dir,
        } => {
            let manifest_text = std::fs::read_to_string(&manifest)
                .with_context(|| format!("reading manifest {}", manifest.display()))?;
            let parsed: Manifest =
                serde_yaml::from_str(&manifest_text).context("parsing model manifest")?;

            let mut request = AnalysisRequest::new(query, parsed.models);
            if let Some(evaluator) = evaluator {
                request.evaluator_model = evaluator;
            }
            if let Some(context) = context {
                request.governance_context = context;
            }

            let config = EngineConfig {
                rates_dir: Some(rates_dir),
                ..EngineConfig::default()
            };
            let engine = GovernanceEngine::builder().config(config).build();

            if stream {
                run_stream(&engine, request).await
            } else {
                run_batch(&engine, &request).await
            }
        }
        Commands::Rates {
            provider,
            model,
            input_tokens,
            output_tokens,
            rates_dir,
        } => {
            let pricing = PricingEngine::load(&rates_dir);
            let cost = pricing.calculate_cost(&provider, &model, input_tokens, output_tokens);
            println!("{}", serde_json::to_string_pretty(&cost)?);
            Ok(())
        }
    }
}

async fn run_batch(engine: &GovernanceEngine, request: &AnalysisRequest) -> Result<()> {
    let logs = engine.analyze_batch(request).await?;
    println!("{}", serde_json::to_string_pretty(&logs)?);
    Ok(())
}

async fn run_stream(engine: &GovernanceEngine, request: AnalysisRequest) -> Result<()> {
    let mut rx = engine.analyze_stream(request);
    let mut stdout = std::io::stdout().lock();
    while let Some(event) = rx.recv().await {
        stdout.write_all(event.encode_frame().as_bytes())?;
        stdout.flush()?;
        if matches!(event, StreamEvent::Complete | StreamEvent::Error { .. }) {
            break;
        }
    }
    Ok(())
}

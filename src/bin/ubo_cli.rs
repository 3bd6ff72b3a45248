//! UBO CLI
//!
//! Loads an engine configuration and a YAML fact bundle, resolves every CBU in
//! the bundle and prints the results as JSON.
//!
//! Usage:
//!   cargo run --features cli --bin ubo_cli -- --bundle demos/sample_bundle.yaml
//!
//! Examples:
//!   # Resolve with the shipped configuration, pretty-printed
//!   cargo run --features cli --bin ubo_cli -- -b demos/sample_bundle.yaml --pretty
//!
//!   # Override config and framework threshold, one CBU only
//!   UBO_CONFIG=config/ubo.yaml cargo run --features cli --bin ubo_cli -- \
//!     -b demos/sample_bundle.yaml --cbu CBU-ACME --threshold 10

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;

use ubo_engine::{ConfigLoader, FactBundle, GraphStore, UboResolutionService};
use ubo_types::CbuId;

/// Resolve ultimate beneficial owners for a fact bundle
#[derive(Parser, Debug)]
#[command(name = "ubo_cli")]
#[command(about = "Resolve ultimate beneficial owners from a YAML fact bundle")]
struct Args {
    /// Fact bundle (entities, edges, control roles, parties, CBUs)
    #[arg(long, short = 'b')]
    bundle: PathBuf,

    /// Engine configuration (default: UBO_CONFIG or config/ubo.yaml)
    #[arg(long, short = 'c', env = "UBO_CONFIG")]
    config: Option<PathBuf>,

    /// Resolve a single CBU instead of all
    #[arg(long)]
    cbu: Option<String>,

    /// Override the ownership threshold percentage
    #[arg(long)]
    threshold: Option<Decimal>,

    /// Override the recursive depth
    #[arg(long)]
    depth: Option<u8>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Abort if any fact in the bundle is rejected
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // ------------------------------------------------------------------
    // 1. Configuration
    // ------------------------------------------------------------------
    let loader = match &args.config {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::from_env(),
    };
    let mut config = loader.load_or_default()?;
    if let Some(threshold) = args.threshold {
        config = config.with_threshold(threshold);
    }
    if let Some(depth) = args.depth {
        config = config.with_depth(depth);
    }
    config.validate().context("Invalid configuration after overrides")?;

    // ------------------------------------------------------------------
    // 2. Ingest
    // ------------------------------------------------------------------
    let store = Arc::new(GraphStore::new());
    let report = FactBundle::load(&args.bundle)?.apply(&store);
    for rejected in report.rejected() {
        if let Err(e) = &rejected.result {
            eprintln!("rejected {}: {}", rejected.locator, e);
        }
    }
    if args.strict && !report.rejected().is_empty() {
        bail!(
            "{} fact(s) rejected from {}",
            report.rejected().len(),
            args.bundle.display()
        );
    }

    // ------------------------------------------------------------------
    // 3. Resolve
    // ------------------------------------------------------------------
    let service = UboResolutionService::new(store, config);
    let results = match &args.cbu {
        Some(id) => vec![service.resolve_cbu(&CbuId::new(id.as_str()))?],
        None => service.resolve_all().await,
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&results)
    } else {
        serde_json::to_string(&results)
    }
    .context("Failed to serialise results")?;
    println!("{}", json);
    Ok(())
}

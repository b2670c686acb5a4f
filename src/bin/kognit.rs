//! kognit command-line runner.
//!
//! Reads an evidence JSON document (a record list or a GitHub GraphQL profile
//! payload), runs the profile pipeline and prints the validated persona as
//! JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! kognit evidence.json [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `KOGNIT_CONFIG` - config file used when none is given on the command line
//! - `KOGNIT_MODEL`, `KOGNIT_MAX_CONCURRENCY`, `KOGNIT_MAX_RETRIES`,
//!   `KOGNIT_MAX_REPOSITORIES`, `KOGNIT_ROAST`, `KOGNIT_HUMOR` - overrides
//! - `RUST_LOG` - tracing filter (default: "info,kognit=debug")
//!
//! Ctrl-C cancels the job; whatever was analyzed so far is still reported.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use kognit::{
    create_llm, EvidenceStore, JobCancellation, JobContext, KognitConfig, ProfilePipeline, RunStatus,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kognit=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(evidence_path) = args.next().map(PathBuf::from) else {
        bail!("usage: kognit <evidence.json> [config.yaml]");
    };
    let config_path = args
        .next()
        .or_else(|| std::env::var("KOGNIT_CONFIG").ok())
        .map(PathBuf::from);

    let config = KognitConfig::load(config_path.as_deref()).context("loading configuration")?;

    let raw = std::fs::read_to_string(&evidence_path)
        .with_context(|| format!("reading {}", evidence_path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing evidence JSON")?;
    let store = EvidenceStore::from_json(&value).context("loading evidence")?;
    tracing::info!("Loaded {} evidence record(s)", store.len());

    let llm = create_llm(&config.model, &config.provider).context("creating model client")?;
    let pipeline = ProfilePipeline::from_config(&config, llm)?;

    let cancellation = JobCancellation::new();
    let handle = cancellation.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted; cancelling job");
        handle.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let ctx = JobContext::new(Arc::new(store)).with_cancellation(cancellation);
    let report = pipeline.run(&ctx).await?;

    let coverage = &report.coverage;
    tracing::info!(
        "Analyzed {}/{} unit(s), {} failed, {} skipped",
        coverage.analyzed_units,
        coverage.total_evidence_units,
        coverage.failed_units.len(),
        coverage.skipped_units.len()
    );
    if report.status == RunStatus::Degraded {
        tracing::warn!("Result is degraded: too many units failed or the job was cancelled");
    }
    tracing::info!(
        "Token usage: {} prompt, {} completion",
        report.usage.prompt_tokens,
        report.usage.completion_tokens
    );

    println!("{}", serde_json::to_string_pretty(&report.persona)?);
    Ok(())
}

//! fleet director
//!
//! Renders job templates for a batch of instance plans and prints the apply
//! view each instance agent would receive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_director::{batch::RenderBatch, config::Config, renderer::SubstitutionRenderer};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// fleet director - per-instance spec construction and template rendering.
#[derive(Debug, Parser)]
#[command(name = "director")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a batch and print each instance's apply view.
    Render {
        /// Batch document (JSON).
        #[arg(long)]
        batch: PathBuf,

        /// Print apply views with the job assignment removed.
        #[arg(long)]
        jobless: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEET_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Render { batch, jobless } => render(&config, batch, jobless).await,
    }
}

async fn render(config: &Config, path: PathBuf, jobless: bool) -> Result<()> {
    let batch = RenderBatch::from_path(&path)?;
    info!(batch = %path.display(), instances = batch.instance_plans.len(), "Loaded render batch");

    let settings = config.render_settings(batch.mode);
    let (mut plans, renderer) = batch.into_renderer(Arc::new(SubstitutionRenderer::new()), settings);

    renderer
        .render_job_instances(&mut plans)
        .await
        .context("rendering failed")?;

    let views: Vec<_> = plans
        .iter()
        .map(|plan| {
            let spec = plan.spec(&config.dns_domain_name);
            let apply = if jobless {
                spec.as_jobless_apply_spec(&plan.instance.render_state)
            } else {
                spec.as_apply_spec(&plan.instance.render_state)
            };
            json!({
                "instance": plan.instance.to_string(),
                "apply_spec": apply,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

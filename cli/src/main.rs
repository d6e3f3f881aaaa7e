//! Quill CLI - headless driver for the session engine.
//!
//! # Architecture
//!
//! The binary bridges [`quill_engine`] (session state machine) and
//! [`quill_gateway`] (backend HTTP client) without any UI: each subcommand
//! drives one engine or gateway operation against the sidecar backend
//! process and prints the outcome.
//!
//! ```text
//! main() -> EngineConfig::load() -> HttpBackend -> {health | init | build | chat}
//! ```
//!
//! Configuration comes from `quill.toml` (or `$QUILL_CONFIG`); every value
//! has a default, so the binary runs without a config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use quill_engine::{EngineConfig, ProjectDir, RenderPhase, Session};
use quill_gateway::{Backend, HttpBackend};

#[derive(Parser)]
#[command(name = "quill", version, about = "Session engine for a LaTeX document editor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe that the backend process is reachable.
    Health,
    /// Scaffold a new project in DIR.
    Init {
        dir: PathBuf,
        /// Template identifier; defaults to the configured one.
        #[arg(long)]
        template: Option<String>,
    },
    /// Open DIR, build it, and write the rendered PDF.
    Build {
        dir: PathBuf,
        /// Output path for the rendered artifact.
        #[arg(long, short, default_value = "main.pdf")]
        out: PathBuf,
    },
    /// Ask the project assistant a question about DIR.
    Chat { dir: PathBuf, query: String },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("error"));

    // Logs go to stderr so command output on stdout stays scriptable.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::load()
        .with_context(|| format!("loading {}", EngineConfig::path().display()))?
        .unwrap_or_default();
    tracing::debug!(base_url = %config.base_url, "configuration resolved");

    let backend =
        HttpBackend::new(config.base_url.as_str()).context("building backend HTTP client")?;

    match cli.command {
        Command::Health => {
            let info = backend.health(CancellationToken::new()).await?;
            println!("backend {} ({})", info.status, info.version);
        }
        Command::Init { dir, template } => {
            let dir = ProjectDir::new(dir);
            let template = template.as_deref().unwrap_or(&config.template);
            backend
                .init_project(&dir, template, CancellationToken::new())
                .await?;
            println!("Initialized project in {dir}");
        }
        Command::Build { dir, out } => {
            let session = Session::new(Arc::new(backend), config);
            session.open_project(ProjectDir::new(dir)).await;

            let snapshot = session.snapshot();
            if snapshot.phase != RenderPhase::Rendered {
                bail!(
                    snapshot
                        .failure
                        .unwrap_or_else(|| "build did not complete".to_owned())
                );
            }
            let artifact = snapshot.artifact.context("rendered without an artifact")?;
            std::fs::write(&out, artifact.bytes())
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), artifact.len());
        }
        Command::Chat { dir, query } => {
            let dir = ProjectDir::new(dir);
            let reply = backend
                .chat(&dir, &query, CancellationToken::new())
                .await?;
            println!("{reply}");
        }
    }

    Ok(())
}

//! `certif`: runs one certification reconciliation.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `CERTIF_*` environment variables, opens the SQLite store, and reconciles
//! the imported diploma, qualification and mapping registries into
//! certifications.
//!
//! ```
//! cargo run -p certif-cli --bin certif -- --config config.toml --force
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use certif_core::store::CertificationStore as _;
use certif_import::{Orchestrator, ReconcileConfig, RunOutcome};
use certif_store_sqlite::SqliteStore;
use chrono::Utc;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Certification registry reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Reconcile even when no source changed since the last successful run.
  #[arg(long)]
  force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CERTIF"))
    .build()
    .context("failed to read config file")?;

  let mut cfg: ReconcileConfig = settings
    .try_deserialize()
    .context("failed to deserialise ReconcileConfig")?;
  cfg.force |= cli.force;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let orchestrator = Orchestrator::new(store, cfg);
  match orchestrator.run(Utc::now()).await.context("reconciliation failed")? {
    RunOutcome::NoOp => tracing::info!("sources unchanged; store left as is"),
    RunOutcome::Completed(summary) => {
      let last = orchestrator
        .store()
        .last_successful_run()
        .await
        .context("failed to read the run record")?;
      tracing::info!(
        run_id = %summary.run_id,
        written = summary.written,
        fillers = summary.fillers,
        chained = summary.chained,
        swept = summary.swept,
        completed_at = ?last.map(|run| run.completed_at),
        "certifications reconciled"
      );
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

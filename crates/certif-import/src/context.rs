//! Per-run values threaded explicitly through every stage.

use certif_core::{builder::BuildContext, certification::RunStamp, source::SourceSnapshot};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identity and inputs of one reconciliation run.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub run_id:   Uuid,
  pub run_at:   DateTime<Utc>,
  /// Source import timestamps read during `sourcing`.
  pub snapshot: SourceSnapshot,
  pub build:    BuildContext,
}

impl RunContext {
  pub fn new(run_id: Uuid, run_at: DateTime<Utc>, snapshot: SourceSnapshot) -> Self {
    let build = BuildContext {
      oldest_qualification_snapshot: snapshot.qualification_oldest_snapshot,
    };
    Self { run_id, run_at, snapshot, build }
  }

  /// The stamp every row written by this run carries.
  pub fn stamp(&self) -> RunStamp { RunStamp { run_id: self.run_id, run_at: self.run_at } }
}

//! Run configuration, deserialised from `config.toml` and `CERTIF_*`
//! environment variables.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  /// SQLite file holding sources and certifications.
  pub store_path:       PathBuf,
  /// Records per streamed read page and per bulk write.
  pub batch_size:       usize,
  /// Batches queued between the aggregating producer and the writer.
  pub channel_capacity: usize,
  pub lease_ttl_secs:   u64,
  /// Run even when no source changed since the last successful run.
  pub force:            bool,
}

impl Default for ReconcileConfig {
  fn default() -> Self {
    Self {
      store_path:       PathBuf::from("certif.sqlite"),
      batch_size:       500,
      channel_capacity: 4,
      lease_ttl_secs:   3600,
      force:            false,
    }
  }
}

impl ReconcileConfig {
  pub fn lease_ttl(&self) -> Duration { Duration::from_secs(self.lease_ttl_secs) }

  /// Page size, never zero.
  pub(crate) fn page(&self) -> usize { self.batch_size.max(1) }
}

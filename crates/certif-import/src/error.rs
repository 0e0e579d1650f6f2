//! Error type for `certif-import`.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] certif_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// Another run holds a live reconciliation lease.
  #[error("reconciliation lease held by {holder} until {expires_at}")]
  LeaseHeld { holder: String, expires_at: DateTime<Utc> },

  /// The run's lease expired and was taken over before it could be renewed.
  #[error("reconciliation lease of {holder} was lost mid-run")]
  LeaseLost { holder: String },
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for `certif-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid date {0:?}")]
  InvalidDate(String),

  /// A free-text source value missing from its closed translation table.
  #[error("unrecognised {field} value: {value:?}")]
  UnknownValue { field: &'static str, value: String },

  #[error("certification failed validation: {0}")]
  Schema(String),

  #[error("source registries are inconsistent: {0}")]
  SourceConsistency(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn unknown(field: &'static str, value: &str) -> Self {
    Self::UnknownValue { field, value: value.to_owned() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

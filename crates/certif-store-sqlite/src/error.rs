//! Error type for `certif-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] certif_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown source in import log: {0:?}")]
  UnknownSource(String),

  #[error("lease ttl out of range: {0:?}")]
  LeaseTtl(std::time::Duration),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

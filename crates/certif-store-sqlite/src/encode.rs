//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2024-01-01T00:00:00.000000Z`) so that text comparison orders them.
//! Records and certification bodies are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use certif_core::{
  certification::{RunStamp, Side, StoredCertification},
  source::SourceSnapshot,
  store::RunRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Side ────────────────────────────────────────────────────────────────────

/// The `certifications` column holding the code of `side`.
pub fn side_column(side: Side) -> &'static str {
  match side {
    Side::Diploma => "diploma_code",
    Side::Qualification => "qualification_code",
  }
}

// ─── Source names ────────────────────────────────────────────────────────────

pub const SOURCE_DIPLOMAS: &str = "diplomas";
pub const SOURCE_QUALIFICATIONS: &str = "qualifications";
pub const SOURCE_MAPPINGS: &str = "mappings";

/// Raw strings read from a `source_imports` row.
pub struct RawSourceImport {
  pub source:          String,
  pub imported_at:     String,
  pub oldest_snapshot: Option<String>,
}

pub fn decode_snapshot(rows: Vec<RawSourceImport>) -> Result<SourceSnapshot> {
  let mut snapshot = SourceSnapshot::default();
  for row in rows {
    let at = Some(decode_dt(&row.imported_at)?);
    match row.source.as_str() {
      SOURCE_DIPLOMAS => snapshot.diplomas_imported_at = at,
      SOURCE_QUALIFICATIONS => {
        snapshot.qualifications_imported_at = at;
        snapshot.qualification_oldest_snapshot =
          row.oldest_snapshot.as_deref().map(decode_date).transpose()?;
      }
      SOURCE_MAPPINGS => snapshot.mappings_imported_at = at,
      other => return Err(Error::UnknownSource(other.to_owned())),
    }
  }
  Ok(snapshot)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `certifications` row.
pub struct RawCertification {
  pub body_json:  String,
  pub run_id:     String,
  pub run_at:     String,
  pub created_at: String,
}

impl RawCertification {
  pub fn into_stored(self) -> Result<StoredCertification> {
    Ok(StoredCertification {
      certification: serde_json::from_str(&self.body_json)?,
      stamp:         RunStamp {
        run_id: decode_uuid(&self.run_id)?,
        run_at: decode_dt(&self.run_at)?,
      },
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `reconcile_runs` row.
pub struct RawRun {
  pub run_id:       String,
  pub started_at:   String,
  pub completed_at: String,
  pub sources_json: String,
}

impl RawRun {
  pub fn into_run(self) -> Result<RunRecord> {
    Ok(RunRecord {
      run_id:       decode_uuid(&self.run_id)?,
      started_at:   decode_dt(&self.started_at)?,
      completed_at: decode_dt(&self.completed_at)?,
      sources:      serde_json::from_str(&self.sources_json)?,
    })
  }
}

/// Decode a column of JSON documents.
pub fn decode_json_rows<T: serde::de::DeserializeOwned>(rows: Vec<String>) -> Result<Vec<T>> {
  rows
    .iter()
    .map(|raw| serde_json::from_str(raw).map_err(Error::from))
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_compare_as_text() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(encode_dt(a), "2024-01-01T09:00:00.000000Z");
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn unknown_import_source_is_rejected() {
    let rows = vec![RawSourceImport {
      source:          "catalogue".into(),
      imported_at:     "2024-01-01T09:00:00.000000Z".into(),
      oldest_snapshot: None,
    }];
    match decode_snapshot(rows) {
      Err(Error::UnknownSource(source)) => assert_eq!(source, "catalogue"),
      other => panic!("expected UnknownSource, got {other:?}"),
    }
  }
}

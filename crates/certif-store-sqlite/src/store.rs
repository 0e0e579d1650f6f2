//! The SQLite implementation of [`SourceStore`] and
//! [`CertificationStore`].

use std::{path::Path, time::Duration};

use certif_core::{
  certification::{Certification, RunStamp, Side, StoredCertification},
  source::{DiplomaRecord, MappingRecord, QualificationRecord, SourceSnapshot},
  store::{CertificationStore, Lease, LeaseOutcome, RunRecord, SourceStore},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use crate::{
  encode::{
    RawCertification, RawRun, RawSourceImport, SOURCE_DIPLOMAS, SOURCE_MAPPINGS,
    SOURCE_QUALIFICATIONS, decode_dt, decode_json_rows, decode_snapshot, encode_date,
    encode_dt, encode_uuid, side_column,
  },
  schema::SCHEMA,
  Error, Result,
};

/// Name of the single reconciliation lease row.
const RECONCILE_LEASE: &str = "reconcile";

fn sql_limit(limit: usize) -> i64 { i64::try_from(limit).unwrap_or(i64::MAX) }

fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
  chrono::Duration::from_std(ttl)
    .ok()
    .and_then(|ttl| now.checked_add_signed(ttl))
    .ok_or(Error::LeaseTtl(ttl))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A certification registry backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, as used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Source writers (used by the per-source importers) ───────────────────

  /// Replace the whole diploma registry.
  pub async fn replace_diplomas(
    &self,
    records: Vec<DiplomaRecord>,
    imported_at: DateTime<Utc>,
  ) -> Result<()> {
    let rows = records
      .iter()
      .map(|r| Ok::<_, Error>((r.code.clone(), serde_json::to_string(r)?)))
      .collect::<Result<Vec<_>>>()?;
    self
      .replace_records("diplomas", SOURCE_DIPLOMAS, rows, imported_at, None)
      .await
  }

  /// Replace the whole qualification registry. `oldest_snapshot` is the
  /// oldest registry snapshot the importer has ever observed.
  pub async fn replace_qualifications(
    &self,
    records: Vec<QualificationRecord>,
    imported_at: DateTime<Utc>,
    oldest_snapshot: Option<NaiveDate>,
  ) -> Result<()> {
    let rows = records
      .iter()
      .map(|r| Ok::<_, Error>((r.code.clone(), serde_json::to_string(r)?)))
      .collect::<Result<Vec<_>>>()?;
    self
      .replace_records(
        "qualifications",
        SOURCE_QUALIFICATIONS,
        rows,
        imported_at,
        oldest_snapshot,
      )
      .await
  }

  async fn replace_records(
    &self,
    table: &'static str,
    source: &'static str,
    rows: Vec<(String, String)>,
    imported_at: DateTime<Utc>,
    oldest_snapshot: Option<NaiveDate>,
  ) -> Result<()> {
    let at_str = encode_dt(imported_at);
    let oldest_str = oldest_snapshot.map(encode_date);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {table}"), [])?;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} (code, record_json) VALUES (?1, ?2)"
          ))?;
          for (code, json) in &rows {
            stmt.execute(rusqlite::params![code, json])?;
          }
        }
        record_import(&tx, source, &at_str, oldest_str.as_deref())?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Replace the whole mapping table.
  pub async fn replace_mappings(
    &self,
    records: Vec<MappingRecord>,
    imported_at: DateTime<Utc>,
  ) -> Result<()> {
    let at_str = encode_dt(imported_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM mappings", [])?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO mappings (diploma_code, qualification_code) VALUES (?1, ?2)",
          )?;
          for m in &records {
            stmt.execute(rusqlite::params![m.diploma_code, m.qualification_code])?;
          }
        }
        record_import(&tx, SOURCE_MAPPINGS, &at_str, None)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Certification reads ─────────────────────────────────────────────────

  /// Every stored certification, in key order.
  pub async fn all_certifications(&self) -> Result<Vec<StoredCertification>> {
    let raws: Vec<RawCertification> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT body_json, run_id, run_at, created_at
           FROM certifications ORDER BY cert_key",
        )?;
        let rows = stmt
          .query_map([], raw_certification)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCertification::into_stored).collect()
  }

  /// Run a single-column query returning JSON documents, then decode them.
  async fn json_rows<T>(&self, sql: String, params: Vec<Value>) -> Result<Vec<T>>
  where
    T: serde::de::DeserializeOwned,
  {
    let rows: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    decode_json_rows(rows)
  }

  /// Look up JSON documents one key at a time with a single prepared
  /// statement; missing keys are skipped.
  async fn json_by_keys<T>(&self, sql: &'static str, keys: Vec<String>) -> Result<Vec<T>>
  where
    T: serde::de::DeserializeOwned,
  {
    let rows: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = Vec::with_capacity(keys.len());
        for key in &keys {
          if let Some(json) = stmt
            .query_row(rusqlite::params![key], |row| row.get::<_, String>(0))
            .optional()?
          {
            rows.push(json);
          }
        }
        Ok(rows)
      })
      .await?;

    decode_json_rows(rows)
  }
}

fn record_import(
  tx: &rusqlite::Transaction<'_>,
  source: &str,
  imported_at: &str,
  oldest_snapshot: Option<&str>,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO source_imports (source, imported_at, oldest_snapshot)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(source) DO UPDATE SET
       imported_at     = excluded.imported_at,
       oldest_snapshot = excluded.oldest_snapshot",
    rusqlite::params![source, imported_at, oldest_snapshot],
  )?;
  Ok(())
}

fn raw_certification(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCertification> {
  Ok(RawCertification {
    body_json:  row.get(0)?,
    run_id:     row.get(1)?,
    run_at:     row.get(2)?,
    created_at: row.get(3)?,
  })
}

// ─── SourceStore impl ────────────────────────────────────────────────────────

impl SourceStore for SqliteStore {
  type Error = Error;

  async fn snapshot(&self) -> Result<SourceSnapshot> {
    let rows: Vec<RawSourceImport> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare("SELECT source, imported_at, oldest_snapshot FROM source_imports")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawSourceImport {
              source:          row.get(0)?,
              imported_at:     row.get(1)?,
              oldest_snapshot: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    decode_snapshot(rows)
  }

  async fn diplomas_after(
    &self,
    after: Option<String>,
    limit: usize,
  ) -> Result<Vec<DiplomaRecord>> {
    self
      .json_rows(
        "SELECT record_json FROM diplomas WHERE code > ?1 ORDER BY code LIMIT ?2".into(),
        vec![Value::from(after.unwrap_or_default()), Value::from(sql_limit(limit))],
      )
      .await
  }

  async fn diplomas_by_code(&self, codes: Vec<String>) -> Result<Vec<DiplomaRecord>> {
    self
      .json_by_keys("SELECT record_json FROM diplomas WHERE code = ?1", codes)
      .await
  }

  async fn qualifications_after(
    &self,
    after: Option<String>,
    limit: usize,
  ) -> Result<Vec<QualificationRecord>> {
    self
      .json_rows(
        "SELECT record_json FROM qualifications WHERE code > ?1 ORDER BY code LIMIT ?2"
          .into(),
        vec![Value::from(after.unwrap_or_default()), Value::from(sql_limit(limit))],
      )
      .await
  }

  async fn qualifications_by_code(
    &self,
    codes: Vec<String>,
  ) -> Result<Vec<QualificationRecord>> {
    self
      .json_by_keys("SELECT record_json FROM qualifications WHERE code = ?1", codes)
      .await
  }

  async fn unmapped_qualifications_after(
    &self,
    after: Option<String>,
    limit: usize,
  ) -> Result<Vec<QualificationRecord>> {
    self
      .json_rows(
        "SELECT q.record_json
         FROM qualifications q
         WHERE q.code > ?1
           AND NOT EXISTS (
             SELECT 1 FROM mappings m WHERE m.qualification_code = q.code
           )
         ORDER BY q.code
         LIMIT ?2"
          .into(),
        vec![Value::from(after.unwrap_or_default()), Value::from(sql_limit(limit))],
      )
      .await
  }

  async fn mappings_for(&self, diploma_codes: Vec<String>) -> Result<Vec<MappingRecord>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT diploma_code, qualification_code FROM mappings WHERE diploma_code = ?1",
        )?;
        let mut rows = Vec::new();
        for code in &diploma_codes {
          let found = stmt
            .query_map(rusqlite::params![code], |row| {
              Ok(MappingRecord {
                diploma_code:       row.get(0)?,
                qualification_code: row.get(1)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          rows.extend(found);
        }
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn dangling_mappings(&self, limit: usize) -> Result<Vec<MappingRecord>> {
    let limit_val = sql_limit(limit);
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT m.diploma_code, m.qualification_code
           FROM mappings m
           LEFT JOIN diplomas       d ON d.code = m.diploma_code
           LEFT JOIN qualifications q ON q.code = m.qualification_code
           WHERE d.code IS NULL
              OR (m.qualification_code IS NOT NULL AND q.code IS NULL)
           ORDER BY m.diploma_code
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| {
            Ok(MappingRecord {
              diploma_code:       row.get(0)?,
              qualification_code: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}

// ─── CertificationStore impl ─────────────────────────────────────────────────

impl CertificationStore for SqliteStore {
  type Error = Error;

  // ── Lease ─────────────────────────────────────────────────────────────────

  async fn acquire_lease(
    &self,
    holder: String,
    now: DateTime<Utc>,
    ttl: Duration,
  ) -> Result<LeaseOutcome> {
    let expires_at = lease_expiry(now, ttl)?;
    let now_str = encode_dt(now);
    let expires_str = encode_dt(expires_at);
    let holder_str = holder.clone();

    let current: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO leases (name, holder, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(name) DO UPDATE SET
             holder     = excluded.holder,
             expires_at = excluded.expires_at
           WHERE leases.holder = excluded.holder OR leases.expires_at <= ?4",
          rusqlite::params![RECONCILE_LEASE, holder_str, expires_str, now_str],
        )?;
        if changed > 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              "SELECT holder, expires_at FROM leases WHERE name = ?1",
              rusqlite::params![RECONCILE_LEASE],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    match current {
      None => Ok(LeaseOutcome::Acquired(Lease { holder, expires_at })),
      Some((holder, expires_at)) => Ok(LeaseOutcome::Held(Lease {
        holder,
        expires_at: decode_dt(&expires_at)?,
      })),
    }
  }

  async fn renew_lease(
    &self,
    holder: String,
    now: DateTime<Utc>,
    ttl: Duration,
  ) -> Result<Option<Lease>> {
    let expires_at = lease_expiry(now, ttl)?;
    let expires_str = encode_dt(expires_at);
    let holder_str = holder.clone();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE leases SET expires_at = ?3 WHERE name = ?1 AND holder = ?2",
          rusqlite::params![RECONCILE_LEASE, holder_str, expires_str],
        )?)
      })
      .await?;

    Ok((changed > 0).then_some(Lease { holder, expires_at }))
  }

  async fn release_lease(&self, holder: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM leases WHERE name = ?1 AND holder = ?2",
          rusqlite::params![RECONCILE_LEASE, holder],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Runs ──────────────────────────────────────────────────────────────────

  async fn last_successful_run(&self) -> Result<Option<RunRecord>> {
    let raw: Option<RawRun> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT run_id, started_at, completed_at, sources_json
               FROM reconcile_runs
               ORDER BY completed_at DESC
               LIMIT 1",
              [],
              |row| {
                Ok(RawRun {
                  run_id:       row.get(0)?,
                  started_at:   row.get(1)?,
                  completed_at: row.get(2)?,
                  sources_json: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRun::into_run).transpose()
  }

  async fn record_run(&self, run: RunRecord) -> Result<()> {
    let run_id_str = encode_uuid(run.run_id);
    let started_str = encode_dt(run.started_at);
    let completed_str = encode_dt(run.completed_at);
    let sources_str = serde_json::to_string(&run.sources)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reconcile_runs (run_id, started_at, completed_at, sources_json)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![run_id_str, started_str, completed_str, sources_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert_certifications(
    &self,
    stamp: RunStamp,
    batch: Vec<Certification>,
  ) -> Result<usize> {
    let rows = batch
      .iter()
      .map(|c| {
        Ok::<_, Error>((
          c.key().encode(),
          c.identity.diploma_code.clone(),
          c.identity.qualification_code.clone(),
          serde_json::to_string(c)?,
        ))
      })
      .collect::<Result<Vec<_>>>()?;
    let run_id_str = encode_uuid(stamp.run_id);
    let run_at_str = encode_dt(stamp.run_at);

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO certifications (
               cert_key, diploma_code, qualification_code, body_json,
               run_id, run_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(cert_key) DO UPDATE SET
               body_json = excluded.body_json,
               run_id    = excluded.run_id,
               run_at    = excluded.run_at",
          )?;
          for (key, diploma, qualification, body) in &rows {
            stmt.execute(rusqlite::params![
              key,
              diploma,
              qualification,
              body,
              run_id_str,
              run_at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await?;
    Ok(written)
  }

  async fn sweep(&self, run_id: Uuid) -> Result<usize> {
    let run_id_str = encode_uuid(run_id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM certifications WHERE run_id != ?1",
          rusqlite::params![run_id_str],
        )?)
      })
      .await?;
    Ok(removed)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn paired_codes_after(
    &self,
    run_id: Uuid,
    side: Side,
    after: Option<String>,
    limit: usize,
  ) -> Result<Vec<String>> {
    let column = side_column(side);
    let sql = format!(
      "SELECT DISTINCT {column}
       FROM certifications
       WHERE run_id = ?1
         AND diploma_code IS NOT NULL
         AND qualification_code IS NOT NULL
         AND {column} > ?2
       ORDER BY {column}
       LIMIT ?3"
    );
    let run_id_str = encode_uuid(run_id);
    let after_str = after.unwrap_or_default();
    let limit_val = sql_limit(limit);

    let codes = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![run_id_str, after_str, limit_val], |row| {
            row.get(0)
          })?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(codes)
  }

  async fn certifications_for_code(
    &self,
    run_id: Uuid,
    side: Side,
    code: String,
  ) -> Result<Vec<Certification>> {
    let column = side_column(side);
    self
      .json_rows(
        format!(
          "SELECT body_json FROM certifications
           WHERE run_id = ?1 AND {column} = ?2
           ORDER BY cert_key"
        ),
        vec![Value::from(encode_uuid(run_id)), Value::from(code)],
      )
      .await
  }

  async fn run_certifications_after(
    &self,
    run_id: Uuid,
    after: Option<String>,
    limit: usize,
  ) -> Result<Vec<Certification>> {
    self
      .json_rows(
        "SELECT body_json FROM certifications
         WHERE run_id = ?1 AND cert_key > ?2
         ORDER BY cert_key
         LIMIT ?3"
          .into(),
        vec![
          Value::from(encode_uuid(run_id)),
          Value::from(after.unwrap_or_default()),
          Value::from(sql_limit(limit)),
        ],
      )
      .await
  }

  async fn find(
    &self,
    diploma_code: Option<String>,
    qualification_code: Option<String>,
  ) -> Result<Vec<StoredCertification>> {
    let raws: Vec<RawCertification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT body_json, run_id, run_at, created_at
           FROM certifications
           WHERE diploma_code IS ?1 AND qualification_code IS ?2
           ORDER BY cert_key",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![diploma_code, qualification_code],
            raw_certification,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCertification::into_stored).collect()
  }
}

//! Storage abstractions consumed by the reconciliation run.
//!
//! [`SourceStore`] reads the three input record sets; [`CertificationStore`]
//! holds the produced certifications, the run history and the single-writer
//! lease. Both are implemented by storage backends (e.g.
//! `certif-store-sqlite`); the orchestrator in `certif-import` depends only on
//! these traits.
//!
//! Every read that can return a whole record set is paged by key (`after`,
//! `limit`) so callers never need to hold a full set in memory.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  certification::{Certification, RunStamp, Side, StoredCertification},
  source::{DiplomaRecord, MappingRecord, QualificationRecord, SourceSnapshot},
};

// ─── Run bookkeeping ─────────────────────────────────────────────────────────

/// A completed reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_id:       Uuid,
  pub started_at:   DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
  /// Source import timestamps the run reconciled.
  pub sources:      SourceSnapshot,
}

/// A held single-writer lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
  pub holder:     String,
  pub expires_at: DateTime<Utc>,
}

/// Result of trying to take the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
  Acquired(Lease),
  /// Someone else holds a live lease.
  Held(Lease),
}

// ─── Source side ─────────────────────────────────────────────────────────────

/// Read access to the diploma, qualification and mapping record sets.
pub trait SourceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Latest import timestamp of each source set.
  fn snapshot(
    &self,
  ) -> impl Future<Output = Result<SourceSnapshot, Self::Error>> + Send + '_;

  /// Diplomas with `code > after`, ordered by code.
  fn diplomas_after(
    &self,
    after: Option<String>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<DiplomaRecord>, Self::Error>> + Send + '_;

  fn diplomas_by_code(
    &self,
    codes: Vec<String>,
  ) -> impl Future<Output = Result<Vec<DiplomaRecord>, Self::Error>> + Send + '_;

  /// Fiches with `code > after`, ordered by code.
  fn qualifications_after(
    &self,
    after: Option<String>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<QualificationRecord>, Self::Error>> + Send + '_;

  fn qualifications_by_code(
    &self,
    codes: Vec<String>,
  ) -> impl Future<Output = Result<Vec<QualificationRecord>, Self::Error>> + Send + '_;

  /// Fiches with `code > after` that no mapping row mentions, ordered by code.
  fn unmapped_qualifications_after(
    &self,
    after: Option<String>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<QualificationRecord>, Self::Error>> + Send + '_;

  /// Every mapping row of the given diplomas.
  fn mappings_for(
    &self,
    diploma_codes: Vec<String>,
  ) -> impl Future<Output = Result<Vec<MappingRecord>, Self::Error>> + Send + '_;

  /// Up to `limit` mapping rows naming a code absent from its registry.
  fn dangling_mappings(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<MappingRecord>, Self::Error>> + Send + '_;
}

// ─── Certification side ──────────────────────────────────────────────────────

/// The certification store shared across runs.
pub trait CertificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Lease ─────────────────────────────────────────────────────────────

  /// Take the reconciliation lease for `holder` until `now + ttl`, unless
  /// another holder's lease is still live at `now`.
  fn acquire_lease(
    &self,
    holder: String,
    now: DateTime<Utc>,
    ttl: Duration,
  ) -> impl Future<Output = Result<LeaseOutcome, Self::Error>> + Send + '_;

  /// Push the expiry of `holder`'s lease to `now + ttl`. Never takes a lease
  /// the holder no longer has; `None` means it was released or taken over.
  fn renew_lease(
    &self,
    holder: String,
    now: DateTime<Utc>,
    ttl: Duration,
  ) -> impl Future<Output = Result<Option<Lease>, Self::Error>> + Send + '_;

  /// Drop the lease if `holder` still holds it.
  fn release_lease(
    &self,
    holder: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Runs ──────────────────────────────────────────────────────────────

  fn last_successful_run(
    &self,
  ) -> impl Future<Output = Result<Option<RunRecord>, Self::Error>> + Send + '_;

  fn record_run(
    &self,
    run: RunRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert or replace each certification by key, stamping it with `stamp`.
  /// The batch is atomic. Returns the number of rows written.
  fn upsert_certifications(
    &self,
    stamp: RunStamp,
    batch: Vec<Certification>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Delete every certification not stamped with `run_id`. Returns the number
  /// of rows removed.
  fn sweep(
    &self,
    run_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Codes on `side` with `code > after` that appear in at least one paired
  /// certification of `run_id`, ordered by code.
  fn paired_codes_after(
    &self,
    run_id: Uuid,
    side: Side,
    after: Option<String>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Every certification of `run_id` whose `side` code is `code`.
  fn certifications_for_code(
    &self,
    run_id: Uuid,
    side: Side,
    code: String,
  ) -> impl Future<Output = Result<Vec<Certification>, Self::Error>> + Send + '_;

  /// Certifications of `run_id` with encoded key `> after`, in key order.
  fn run_certifications_after(
    &self,
    run_id: Uuid,
    after: Option<String>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Certification>, Self::Error>> + Send + '_;

  /// Certifications with exactly this identity pair; `None` matches a null
  /// half.
  fn find(
    &self,
    diploma_code: Option<String>,
    qualification_code: Option<String>,
  ) -> impl Future<Output = Result<Vec<StoredCertification>, Self::Error>> + Send + '_;
}

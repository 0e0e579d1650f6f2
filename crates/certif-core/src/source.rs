//! Input record sets, as handed over by the per-source importers.
//!
//! Each set is refreshed wholesale on every import. Dates are kept as the
//! day-only strings the registries publish; they are parsed into instants by
//! the field builders so a malformed date fails the record that carries it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Value used by the mapping table to say "this diploma has no fiche".
pub const NO_PAIRING: &str = "NR";

// ─── Diploma registry ────────────────────────────────────────────────────────

/// One entry of the diploma registry, keyed by its 8-character code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaRecord {
  pub code:            String,
  pub title_long:      Option<String>,
  pub title_short:     Option<String>,
  pub opened_on:       Option<String>,
  pub closed_on:       Option<String>,
  pub first_session:   Option<i32>,
  pub last_session:    Option<i32>,
  /// Date of the legal text creating the diploma.
  pub created_on:      Option<String>,
  /// Date of the legal text abrogating the diploma.
  pub abrogated_on:    Option<String>,
  pub nature_code:     Option<String>,
  pub nature_label:    Option<String>,
  /// Interministerial level code ("3" through "8", "0" when unclassified).
  pub level_code:      Option<String>,
  pub level_label:     Option<String>,
  pub nsf_code:        Option<String>,
  /// Codes this diploma replaced.
  pub predecessors:    Vec<String>,
  /// Codes that replaced this diploma.
  pub successors:      Vec<String>,
}

// ─── Qualification registry ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTitleRecord {
  pub code:  String,
  pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveAgreementRecord {
  pub number: String,
  pub title:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifierRecord {
  pub siret: Option<String>,
  pub name:  String,
}

/// One fiche of the national register of professional qualifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationRecord {
  /// `RNCP` followed by the fiche number.
  pub code:                  String,
  pub title:                 Option<String>,
  pub active:                bool,
  pub first_seen_on:         Option<String>,
  pub last_seen_on:          Option<String>,
  pub first_activated_on:    Option<String>,
  pub last_activated_on:     Option<String>,
  pub registration_ends_on:  Option<String>,
  pub decided_on:            Option<String>,
  pub effective_on:          Option<String>,
  /// Level label as published, e.g. "NIV5".
  pub level_label:           Option<String>,
  pub registration_kind:     Option<String>,
  pub blocks:                Vec<CodeTitleRecord>,
  pub nsf:                   Vec<CodeTitleRecord>,
  pub rome:                  Vec<CodeTitleRecord>,
  pub collective_agreements: Vec<CollectiveAgreementRecord>,
  pub certifiers:            Vec<CertifierRecord>,
  /// Access-route labels as published.
  pub access_routes:         Vec<String>,
  pub predecessors:          Vec<String>,
  pub successors:            Vec<String>,
}

// ─── Mapping table ───────────────────────────────────────────────────────────

/// A sparse pairing of one diploma code with one fiche code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
  pub diploma_code:       String,
  /// `None` when the registry explicitly records "no pairing".
  pub qualification_code: Option<String>,
}

impl MappingRecord {
  /// Build a mapping from the raw table columns, folding the
  /// [`NO_PAIRING`] sentinel and blank cells into `None`.
  pub fn from_raw(diploma_code: &str, qualification_code: &str) -> Self {
    let fiche = qualification_code.trim();
    Self {
      diploma_code:       diploma_code.trim().to_owned(),
      qualification_code: (!fiche.is_empty() && fiche != NO_PAIRING)
        .then(|| fiche.to_owned()),
    }
  }
}

// ─── Import metadata ─────────────────────────────────────────────────────────

/// Latest successful import of each source set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
  pub diplomas_imported_at:       Option<DateTime<Utc>>,
  pub qualifications_imported_at: Option<DateTime<Utc>>,
  pub mappings_imported_at:       Option<DateTime<Utc>>,
  /// Oldest snapshot of the qualification registry ever observed.
  pub qualification_oldest_snapshot: Option<NaiveDate>,
}

impl SourceSnapshot {
  /// True when any source has been imported after the matching timestamp in
  /// `previous`.
  pub fn is_newer_than(&self, previous: &SourceSnapshot) -> bool {
    self.diplomas_imported_at > previous.diplomas_imported_at
      || self.qualifications_imported_at > previous.qualifications_imported_at
      || self.mappings_imported_at > previous.mappings_imported_at
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn mapping_sentinel_is_no_pairing() {
    assert_eq!(MappingRecord::from_raw("50022135", "NR").qualification_code, None);
    assert_eq!(MappingRecord::from_raw("50022135", " ").qualification_code, None);
    assert_eq!(
      MappingRecord::from_raw(" 50022135 ", "RNCP100").qualification_code,
      Some("RNCP100".to_owned())
    );
  }

  #[test]
  fn snapshot_newer_on_any_source() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let previous = SourceSnapshot {
      diplomas_imported_at:          Some(t0),
      qualifications_imported_at:    Some(t0),
      mappings_imported_at:          Some(t0),
      qualification_oldest_snapshot: None,
    };

    assert!(!previous.is_newer_than(&previous));

    let mut current = previous.clone();
    current.mappings_imported_at = Some(t1);
    assert!(current.is_newer_than(&previous));

    // A source that has never been imported is never newer.
    let never = SourceSnapshot::default();
    assert!(!never.is_newer_than(&previous));
  }
}

//! The canonical certification record produced by a reconciliation run.
//!
//! Every descriptive field is split by side: the diploma half is `None`
//! exactly when the certification has no diploma code, and likewise for the
//! qualification half.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The `(diploma, qualification)` pair a certification stands for. At least
/// one half is always set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
  pub diploma_code:       Option<String>,
  pub qualification_code: Option<String>,
}

impl Identity {
  pub fn code(&self, side: Side) -> Option<&str> {
    match side {
      Side::Diploma => self.diploma_code.as_deref(),
      Side::Qualification => self.qualification_code.as_deref(),
    }
  }
}

/// Which registry a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
  Diploma,
  Qualification,
}

/// Storage key of a certification.
///
/// Aggregated certifications are unique by identity alone. Coverage fillers
/// for the same code share an identity and differ by the start of the gap they
/// fill, so the period start is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertificationKey {
  pub identity:     Identity,
  pub period_start: Option<DateTime<Utc>>,
}

impl CertificationKey {
  /// Flat string form; sorts by diploma code, then fiche code, then start.
  pub fn encode(&self) -> String {
    format!(
      "{}|{}|{}",
      self.identity.diploma_code.as_deref().unwrap_or(""),
      self.identity.qualification_code.as_deref().unwrap_or(""),
      self
        .period_start
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default(),
    )
  }
}

// ─── Period validity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaValidity {
  pub opening:       Option<DateTime<Utc>>,
  pub closing:       Option<DateTime<Utc>>,
  pub first_session: Option<i32>,
  pub last_session:  Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationValidity {
  pub active:           bool,
  /// `None` when activation predates the registry's first observed snapshot.
  pub activation:       Option<DateTime<Utc>>,
  pub registration_end: Option<DateTime<Utc>>,
  pub first_seen:       Option<DateTime<Utc>>,
  pub last_seen:        Option<DateTime<Utc>>,
}

/// `start`/`end` are the intersection of the two source windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodValidity {
  pub start:         Option<DateTime<Utc>>,
  pub end:           Option<DateTime<Utc>>,
  pub diploma:       Option<DiplomaValidity>,
  pub qualification: Option<QualificationValidity>,
}

// ─── Continuity ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityEntry {
  pub code:    String,
  pub start:   Option<DateTime<Utc>>,
  pub end:     Option<DateTime<Utc>>,
  /// Whether this entry is the owning certification's own code.
  pub current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuity {
  pub diploma:       Option<Vec<ContinuityEntry>>,
  pub qualification: Option<Vec<ContinuityEntry>>,
}

// ─── Descriptive fields ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaTitle {
  pub long:  Option<String>,
  pub short: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
  pub diploma:       Option<DiplomaTitle>,
  pub qualification: Option<String>,
}

/// Level on the European qualifications framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EuropeanLevel {
  Level1,
  Level2,
  Level3,
  Level4,
  Level5,
  Level6,
  Level7,
  Level8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaLevel {
  pub european: Option<EuropeanLevel>,
  pub label:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationLevel {
  pub european: Option<EuropeanLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
  pub diploma:       Option<DiplomaLevel>,
  pub qualification: Option<QualificationLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nature {
  pub code:  Option<String>,
  pub label: Option<String>,
}

/// How a fiche entered the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationKind {
  ByRight,
  OnRequest,
}

/// Routes through which a qualification can be obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRoutes {
  pub apprenticeship:              bool,
  pub professionalization_contract: bool,
  pub continuing_education:        bool,
  pub student_status:              bool,
  pub individual_application:      bool,
  pub experience:                  bool,
}

impl AccessRoutes {
  /// Open to apprenticeship or professionalization (work-study) contracts.
  pub fn is_work_study(&self) -> bool {
    self.apprenticeship || self.professionalization_contract
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certifier {
  pub siret: Option<String>,
  pub name:  String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
  pub nature:        Option<Nature>,
  pub registration:  Option<RegistrationKind>,
  pub access_routes: Option<AccessRoutes>,
  pub certifiers:    Option<Vec<Certifier>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaLegalBasis {
  pub creation:   Option<DateTime<Utc>>,
  pub abrogation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationLegalBasis {
  pub decision: Option<DateTime<Utc>>,
  pub effect:   Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalBasis {
  pub diploma:       Option<DiplomaLegalBasis>,
  pub qualification: Option<QualificationLegalBasis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTitle {
  pub code:  String,
  pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domains {
  pub nsf_diploma:       Option<String>,
  pub nsf_qualification: Option<Vec<CodeTitle>>,
  pub rome:              Option<Vec<CodeTitle>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveAgreement {
  pub number: String,
  pub title:  Option<String>,
}

// ─── Certification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
  pub identity:              Identity,
  /// Whether the fiche number predates the 2019 register reform.
  pub rncp_anterior_2019:    Option<bool>,
  pub period_validity:       PeriodValidity,
  pub continuity:            Continuity,
  pub title:                 Title,
  pub level:                 Level,
  pub kind:                  Kind,
  pub legal_basis:           LegalBasis,
  pub competency_blocks:     Option<Vec<CodeTitle>>,
  pub domains:               Domains,
  pub collective_agreements: Option<Vec<CollectiveAgreement>>,
}

impl Certification {
  pub fn key(&self) -> CertificationKey {
    CertificationKey {
      identity:     self.identity.clone(),
      period_start: self.period_validity.start,
    }
  }

  /// Check the shape invariants of a fully assembled record.
  pub fn validate(&self) -> Result<()> {
    let Identity { diploma_code, qualification_code } = &self.identity;
    let fail = |reason: String| -> Result<()> {
      Err(Error::Schema(format!("{}: {reason}", self.key().encode())))
    };

    if diploma_code.is_none() && qualification_code.is_none() {
      return fail("identity has neither a diploma nor a qualification code".into());
    }
    if let Some(code) = diploma_code
      && !is_diploma_code(code)
    {
      return fail(format!("malformed diploma code {code:?}"));
    }
    if let Some(code) = qualification_code
      && !is_qualification_code(code)
    {
      return fail(format!("malformed qualification code {code:?}"));
    }

    let has_diploma = diploma_code.is_some();
    let has_qualification = qualification_code.is_some();

    let diploma_sides = [
      ("period_validity.diploma", self.period_validity.diploma.is_some()),
      ("title.diploma", self.title.diploma.is_some()),
      ("level.diploma", self.level.diploma.is_some()),
      ("kind.nature", self.kind.nature.is_some()),
      ("legal_basis.diploma", self.legal_basis.diploma.is_some()),
    ];
    for (field, present) in diploma_sides {
      if present != has_diploma {
        return fail(format!("{field} does not match the diploma side"));
      }
    }

    let qualification_sides = [
      ("rncp_anterior_2019", self.rncp_anterior_2019.is_some()),
      ("period_validity.qualification", self.period_validity.qualification.is_some()),
      ("level.qualification", self.level.qualification.is_some()),
      ("kind.access_routes", self.kind.access_routes.is_some()),
      ("kind.certifiers", self.kind.certifiers.is_some()),
      ("legal_basis.qualification", self.legal_basis.qualification.is_some()),
      ("competency_blocks", self.competency_blocks.is_some()),
      ("domains.nsf_qualification", self.domains.nsf_qualification.is_some()),
      ("domains.rome", self.domains.rome.is_some()),
      ("collective_agreements", self.collective_agreements.is_some()),
    ];
    for (field, present) in qualification_sides {
      if present != has_qualification {
        return fail(format!("{field} does not match the qualification side"));
      }
    }

    if self.continuity.diploma.is_some() && !has_diploma {
      return fail("diploma continuity on a certification without diploma".into());
    }
    if self.continuity.qualification.is_some() && !has_qualification {
      return fail("qualification continuity on a certification without qualification".into());
    }
    for chain in [&self.continuity.diploma, &self.continuity.qualification]
      .into_iter()
      .flatten()
    {
      if chain.iter().filter(|entry| entry.current).count() != 1 {
        return fail("continuity chain must have exactly one current entry".into());
      }
    }

    if self
      .competency_blocks
      .iter()
      .flatten()
      .any(|block| block.code.trim().is_empty())
    {
      return fail("competency block without a code".into());
    }

    Ok(())
  }
}

/// Eight ASCII alphanumerics, e.g. `50022135`.
pub fn is_diploma_code(code: &str) -> bool {
  code.len() == 8 && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// `RNCP` followed by at least one digit.
pub fn is_qualification_code(code: &str) -> bool {
  code
    .strip_prefix("RNCP")
    .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Marks a stored certification with the run that last wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
  pub run_id: Uuid,
  pub run_at: DateTime<Utc>,
}

/// A certification as persisted, with its bookkeeping columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCertification {
  pub certification: Certification,
  pub stamp:         RunStamp,
  pub created_at:    DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn code_formats() {
    assert!(is_diploma_code("50022135"));
    assert!(is_diploma_code("4602150A"));
    assert!(!is_diploma_code("5002213"));
    assert!(!is_diploma_code("50022135 "));
    assert!(is_qualification_code("RNCP34862"));
    assert!(!is_qualification_code("RNCP"));
    assert!(!is_qualification_code("RS1234"));
  }

  #[test]
  fn key_encoding_distinguishes_fillers() {
    let identity = Identity {
      diploma_code:       Some("50022135".into()),
      qualification_code: None,
    };
    let a = CertificationKey { identity: identity.clone(), period_start: None };
    let b = CertificationKey {
      identity,
      period_start: Some(
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00+01:00")
          .unwrap()
          .with_timezone(&Utc),
      ),
    };
    assert_eq!(a.encode(), "50022135||");
    assert_eq!(b.encode(), "50022135||2023-12-31T23:00:00Z");
  }
}

//! Field builders: pure functions from an [`AggregatePair`] to one field of
//! the canonical [`Certification`], and the assembler that runs them all.
//!
//! Each builder returns `None` for a half whose source side is absent.
//! Free-text enumerations go through closed tables; a value missing from its
//! table fails the whole record.

use chrono::NaiveDate;

use crate::{
  aggregate::AggregatePair,
  certification::{
    AccessRoutes, Certification, Certifier, CodeTitle, CollectiveAgreement, Continuity,
    DiplomaLegalBasis, DiplomaLevel, DiplomaTitle, DiplomaValidity, Domains, EuropeanLevel,
    Identity, Kind, LegalBasis, Level, Nature, PeriodValidity, QualificationLegalBasis,
    QualificationLevel, QualificationValidity, RegistrationKind, Title,
  },
  date::{Boundary, parse_boundary},
  period::{Window, diploma_window, qualification_window},
  source::CodeTitleRecord,
  Error, Result,
};

/// Fiches numbered below this were registered before the 2019 reform.
pub const RNCP_2019_THRESHOLD: u32 = 34_000;

/// Run-wide inputs the builders need beyond the pair itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildContext {
  /// Oldest known snapshot of the qualification registry.
  pub oldest_qualification_snapshot: Option<NaiveDate>,
}

// ─── Closed tables ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessRoute {
  Apprenticeship,
  ProfessionalizationContract,
  ContinuingEducation,
  StudentStatus,
  IndividualApplication,
  Experience,
}

impl AccessRoute {
  fn from_label(label: &str) -> Result<Self> {
    let normalised = label.trim().replace('\u{2019}', "'");
    match normalised.as_str() {
      "En contrat d'apprentissage" => Ok(Self::Apprenticeship),
      "En contrat de professionnalisation" => Ok(Self::ProfessionalizationContract),
      "Après un parcours de formation continue" => Ok(Self::ContinuingEducation),
      "Après un parcours de formation sous statut d'élève ou d'étudiant" => {
        Ok(Self::StudentStatus)
      }
      "Par candidature individuelle" => Ok(Self::IndividualApplication),
      "Par expérience" => Ok(Self::Experience),
      _ => Err(Error::unknown("access route", label)),
    }
  }
}

impl EuropeanLevel {
  fn from_number(n: u8) -> Option<Self> {
    match n {
      1 => Some(Self::Level1),
      2 => Some(Self::Level2),
      3 => Some(Self::Level3),
      4 => Some(Self::Level4),
      5 => Some(Self::Level5),
      6 => Some(Self::Level6),
      7 => Some(Self::Level7),
      8 => Some(Self::Level8),
      _ => None,
    }
  }

  /// Diploma registry level code: `0` (or `00`) is unclassified.
  pub fn from_diploma_code(code: &str) -> Result<Option<Self>> {
    let n: u8 = code
      .trim()
      .parse()
      .map_err(|_| Error::unknown("diploma level", code))?;
    match n {
      0 => Ok(None),
      n => Self::from_number(n)
        .map(Some)
        .ok_or_else(|| Error::unknown("diploma level", code)),
    }
  }

  /// Qualification registry level label, e.g. `NIV5`.
  pub fn from_qualification_label(label: &str) -> Result<Option<Self>> {
    match label.trim() {
      "Sans niveau spécifique" => Ok(None),
      other => other
        .strip_prefix("NIV")
        .and_then(|n| n.parse().ok())
        .and_then(Self::from_number)
        .map(Some)
        .ok_or_else(|| Error::unknown("qualification level", label)),
    }
  }
}

impl RegistrationKind {
  pub fn from_label(label: &str) -> Result<Self> {
    match label.trim() {
      "Enregistrement de droit" => Ok(Self::ByRight),
      "Enregistrement sur demande" => Ok(Self::OnRequest),
      _ => Err(Error::unknown("registration kind", label)),
    }
  }
}

/// Translate published access-route labels into flags.
pub fn build_access_routes(labels: &[String]) -> Result<AccessRoutes> {
  let mut routes = AccessRoutes::default();
  for label in labels {
    match AccessRoute::from_label(label)? {
      AccessRoute::Apprenticeship => routes.apprenticeship = true,
      AccessRoute::ProfessionalizationContract => {
        routes.professionalization_contract = true
      }
      AccessRoute::ContinuingEducation => routes.continuing_education = true,
      AccessRoute::StudentStatus => routes.student_status = true,
      AccessRoute::IndividualApplication => routes.individual_application = true,
      AccessRoute::Experience => routes.experience = true,
    }
  }
  Ok(routes)
}

// ─── Builders ────────────────────────────────────────────────────────────────

pub fn build_identity(pair: &AggregatePair) -> Identity {
  Identity {
    diploma_code:       pair.diploma.as_ref().map(|d| d.code.clone()),
    qualification_code: pair.qualification.as_ref().map(|q| q.code.clone()),
  }
}

pub fn build_rncp_anterior_2019(pair: &AggregatePair) -> Result<Option<bool>> {
  let Some(qualification) = &pair.qualification else {
    return Ok(None);
  };
  let number: u32 = qualification
    .code
    .strip_prefix("RNCP")
    .and_then(|n| n.parse().ok())
    .ok_or_else(|| {
      Error::Schema(format!("malformed qualification code {:?}", qualification.code))
    })?;
  Ok(Some(number < RNCP_2019_THRESHOLD))
}

pub fn build_period_validity(
  pair: &AggregatePair,
  ctx: &BuildContext,
) -> Result<PeriodValidity> {
  let diploma = pair
    .diploma
    .as_ref()
    .map(|d| Ok::<_, Error>((d, diploma_window(d)?)))
    .transpose()?;
  let qualification = pair
    .qualification
    .as_ref()
    .map(|q| Ok::<_, Error>((q, qualification_window(q, ctx.oldest_qualification_snapshot)?)))
    .transpose()?;

  let global = Window::intersect(
    diploma.as_ref().map(|(_, w)| w),
    qualification.as_ref().map(|(_, w)| w),
  );

  Ok(PeriodValidity {
    start:         global.start,
    end:           global.end,
    diploma:       diploma.map(|(d, w)| DiplomaValidity {
      opening:       w.start,
      closing:       w.end,
      first_session: d.first_session,
      last_session:  d.last_session,
    }),
    qualification: qualification
      .map(|(q, w)| {
        Ok::<_, Error>(QualificationValidity {
          active:           q.active,
          activation:       w.start,
          registration_end: w.end,
          first_seen:       parse_boundary(q.first_seen_on.as_deref(), Boundary::Start)?,
          last_seen:        parse_boundary(q.last_seen_on.as_deref(), Boundary::End)?,
        })
      })
      .transpose()?,
  })
}

pub fn build_title(pair: &AggregatePair) -> Title {
  Title {
    diploma:       pair.diploma.as_ref().map(|d| DiplomaTitle {
      long:  d.title_long.clone(),
      short: d.title_short.clone(),
    }),
    qualification: pair.qualification.as_ref().and_then(|q| q.title.clone()),
  }
}

pub fn build_level(pair: &AggregatePair) -> Result<Level> {
  let diploma = pair
    .diploma
    .as_ref()
    .map(|d| {
      Ok::<_, Error>(DiplomaLevel {
        european: match d.level_code.as_deref().map(str::trim) {
          None | Some("") => None,
          Some(code) => EuropeanLevel::from_diploma_code(code)?,
        },
        label:    d.level_label.clone(),
      })
    })
    .transpose()?;
  let qualification = pair
    .qualification
    .as_ref()
    .map(|q| {
      Ok::<_, Error>(QualificationLevel {
        european: match q.level_label.as_deref().map(str::trim) {
          None | Some("") => None,
          Some(label) => EuropeanLevel::from_qualification_label(label)?,
        },
      })
    })
    .transpose()?;
  Ok(Level { diploma, qualification })
}

pub fn build_kind(pair: &AggregatePair) -> Result<Kind> {
  let qualification = pair.qualification.as_ref();
  Ok(Kind {
    nature:        pair.diploma.as_ref().map(|d| Nature {
      code:  d.nature_code.clone(),
      label: d.nature_label.clone(),
    }),
    registration:  qualification
      .and_then(|q| q.registration_kind.as_deref())
      .filter(|label| !label.trim().is_empty())
      .map(RegistrationKind::from_label)
      .transpose()?,
    access_routes: qualification
      .map(|q| build_access_routes(&q.access_routes))
      .transpose()?,
    certifiers:    qualification.map(|q| {
      q.certifiers
        .iter()
        .map(|c| Certifier { siret: c.siret.clone(), name: c.name.clone() })
        .collect()
    }),
  })
}

pub fn build_legal_basis(pair: &AggregatePair) -> Result<LegalBasis> {
  Ok(LegalBasis {
    diploma:       pair
      .diploma
      .as_ref()
      .map(|d| {
        Ok::<_, Error>(DiplomaLegalBasis {
          creation:   parse_boundary(d.created_on.as_deref(), Boundary::Start)?,
          abrogation: parse_boundary(d.abrogated_on.as_deref(), Boundary::End)?,
        })
      })
      .transpose()?,
    qualification: pair
      .qualification
      .as_ref()
      .map(|q| {
        Ok::<_, Error>(QualificationLegalBasis {
          decision: parse_boundary(q.decided_on.as_deref(), Boundary::Start)?,
          effect:   parse_boundary(q.effective_on.as_deref(), Boundary::Start)?,
        })
      })
      .transpose()?,
  })
}

fn code_titles(records: &[CodeTitleRecord]) -> Vec<CodeTitle> {
  records
    .iter()
    .map(|r| CodeTitle { code: r.code.clone(), title: r.title.clone() })
    .collect()
}

pub fn build_competency_blocks(pair: &AggregatePair) -> Option<Vec<CodeTitle>> {
  pair.qualification.as_ref().map(|q| code_titles(&q.blocks))
}

pub fn build_domains(pair: &AggregatePair) -> Domains {
  Domains {
    nsf_diploma:       pair.diploma.as_ref().and_then(|d| d.nsf_code.clone()),
    nsf_qualification: pair.qualification.as_ref().map(|q| code_titles(&q.nsf)),
    rome:              pair.qualification.as_ref().map(|q| code_titles(&q.rome)),
  }
}

pub fn build_collective_agreements(pair: &AggregatePair) -> Option<Vec<CollectiveAgreement>> {
  pair.qualification.as_ref().map(|q| {
    q.collective_agreements
      .iter()
      .map(|c| CollectiveAgreement { number: c.number.clone(), title: c.title.clone() })
      .collect()
  })
}

// ─── Assembler ───────────────────────────────────────────────────────────────

/// Build and validate the certification for `pair`.
///
/// Continuity is left empty; the continuity pass fills it once every
/// certification of the run is known.
pub fn assemble(pair: &AggregatePair, ctx: &BuildContext) -> Result<Certification> {
  let certification = Certification {
    identity:              build_identity(pair),
    rncp_anterior_2019:    build_rncp_anterior_2019(pair)?,
    period_validity:       build_period_validity(pair, ctx)?,
    continuity:            Continuity::default(),
    title:                 build_title(pair),
    level:                 build_level(pair)?,
    kind:                  build_kind(pair)?,
    legal_basis:           build_legal_basis(pair)?,
    competency_blocks:     build_competency_blocks(pair),
    domains:               build_domains(pair),
    collective_agreements: build_collective_agreements(pair),
  };
  certification.validate()?;
  Ok(certification)
}

#[cfg(test)]
mod tests {
  use crate::source::{CertifierRecord, DiplomaRecord, QualificationRecord};

  use super::*;

  fn diploma() -> DiplomaRecord {
    DiplomaRecord {
      code: "50022135".into(),
      title_long: Some("CUISINE".into()),
      title_short: Some("CUISINE".into()),
      opened_on: Some("01/09/2021".into()),
      closed_on: Some("31/08/2024".into()),
      first_session: Some(2022),
      last_session: Some(2024),
      created_on: Some("15/03/2021".into()),
      nature_code: Some("1".into()),
      nature_label: Some("CAP".into()),
      level_code: Some("3".into()),
      nsf_code: Some("221".into()),
      ..Default::default()
    }
  }

  fn fiche() -> QualificationRecord {
    QualificationRecord {
      code: "RNCP100".into(),
      title: Some("Cuisine".into()),
      active: true,
      first_activated_on: Some("01/01/2022".into()),
      registration_ends_on: Some("31/12/2023".into()),
      level_label: Some("NIV3".into()),
      registration_kind: Some("Enregistrement de droit".into()),
      blocks: vec![CodeTitleRecord { code: "RNCP100BC01".into(), title: None }],
      certifiers: vec![CertifierRecord { siret: None, name: "Ministère".into() }],
      access_routes: vec!["En contrat d’apprentissage".into(), "Par expérience".into()],
      ..Default::default()
    }
  }

  fn ctx() -> BuildContext {
    BuildContext { oldest_qualification_snapshot: NaiveDate::from_ymd_opt(2020, 1, 1) }
  }

  #[test]
  fn diploma_only_nulls_qualification_half() {
    let cert = assemble(&AggregatePair::diploma_only(diploma()), &ctx()).unwrap();

    assert_eq!(cert.identity.diploma_code.as_deref(), Some("50022135"));
    assert_eq!(cert.identity.qualification_code, None);
    assert_eq!(cert.rncp_anterior_2019, None);
    assert_eq!(cert.competency_blocks, None);
    assert_eq!(cert.kind.access_routes, None);
    assert_eq!(cert.period_validity.qualification, None);
    assert_eq!(cert.level.diploma.as_ref().unwrap().european, Some(EuropeanLevel::Level3));
    assert_eq!(cert.domains.nsf_diploma.as_deref(), Some("221"));
    assert_eq!(
      cert.period_validity.start.unwrap().to_rfc3339(),
      "2021-08-31T22:00:00+00:00"
    );
  }

  #[test]
  fn paired_period_is_the_intersection() {
    let pair = AggregatePair { diploma: Some(diploma()), qualification: Some(fiche()) };
    let cert = assemble(&pair, &ctx()).unwrap();

    assert_eq!(cert.period_validity.start.unwrap().to_rfc3339(), "2021-12-31T23:00:00+00:00");
    assert_eq!(cert.period_validity.end.unwrap().to_rfc3339(), "2023-12-31T22:59:59+00:00");
    let routes = cert.kind.access_routes.unwrap();
    assert!(routes.apprenticeship && routes.experience && !routes.student_status);
    assert_eq!(cert.kind.registration, Some(RegistrationKind::ByRight));
    assert_eq!(cert.rncp_anterior_2019, Some(true));
  }

  #[test]
  fn rncp_threshold() {
    let mut q = fiche();
    q.code = "RNCP34000".into();
    let pair = AggregatePair::qualification_only(q);
    assert_eq!(build_rncp_anterior_2019(&pair).unwrap(), Some(false));
  }

  #[test]
  fn unknown_level_label_fails_the_record() {
    let mut q = fiche();
    q.level_label = Some("Niveau 5".into());
    let err = assemble(&AggregatePair::qualification_only(q), &ctx()).unwrap_err();
    assert!(matches!(err, Error::UnknownValue { field: "qualification level", .. }));
  }

  #[test]
  fn unknown_registration_kind_fails_the_record() {
    let mut q = fiche();
    q.registration_kind = Some("Enregistrement provisoire".into());
    assert!(assemble(&AggregatePair::qualification_only(q), &ctx()).is_err());
  }

  #[test]
  fn diploma_level_table() {
    assert_eq!(EuropeanLevel::from_diploma_code("00").unwrap(), None);
    assert_eq!(EuropeanLevel::from_diploma_code("7").unwrap(), Some(EuropeanLevel::Level7));
    assert!(EuropeanLevel::from_diploma_code("9").is_err());
    assert!(EuropeanLevel::from_diploma_code("V").is_err());
    assert_eq!(
      EuropeanLevel::from_qualification_label("Sans niveau spécifique").unwrap(),
      None
    );
  }

  #[test]
  fn malformed_diploma_code_fails_validation() {
    let mut d = diploma();
    d.code = "123".into();
    assert!(matches!(
      assemble(&AggregatePair::diploma_only(d), &ctx()),
      Err(Error::Schema(_))
    ));
  }

  #[test]
  fn invalid_date_fails_the_record() {
    let mut d = diploma();
    d.closed_on = Some("2024-13-01".into());
    assert!(matches!(
      assemble(&AggregatePair::diploma_only(d), &ctx()),
      Err(Error::InvalidDate(_))
    ));
  }
}

//! Pairing of diploma and qualification records into aggregate pairs.
//!
//! Two traversals cover every certification exactly once:
//!
//! - diploma-anchored: every diploma, joined through the mapping table to the
//!   fiches it is paired with (or to nothing);
//! - qualification-anchored: every work-study fiche that no mapping row
//!   mentions at all.
//!
//! The functions here work on one page of records; the cursor that streams
//! pages out of a [`SourceStore`](crate::store::SourceStore) lives in
//! `certif-import`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
  builder::build_access_routes,
  source::{DiplomaRecord, MappingRecord, QualificationRecord},
  Error, Result,
};

/// The unit of input to the field builders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePair {
  pub diploma:       Option<DiplomaRecord>,
  pub qualification: Option<QualificationRecord>,
}

impl AggregatePair {
  pub fn diploma_only(diploma: DiplomaRecord) -> Self {
    Self { diploma: Some(diploma), qualification: None }
  }

  pub fn qualification_only(qualification: QualificationRecord) -> Self {
    Self { diploma: None, qualification: Some(qualification) }
  }
}

/// Diploma-anchored pairing of one page of diplomas.
///
/// `mappings` must hold every mapping row of the page's diplomas and
/// `qualifications` every fiche those rows point at. A diploma yields one pair
/// per distinct fiche it maps to; a "no pairing" row only counts when the
/// diploma has no real pairing.
pub fn pair_diplomas(
  diplomas: Vec<DiplomaRecord>,
  mappings: &[MappingRecord],
  qualifications: &HashMap<String, QualificationRecord>,
) -> Result<Vec<AggregatePair>> {
  let mut fiches_by_diploma: HashMap<&str, BTreeSet<&str>> = HashMap::new();
  for mapping in mappings {
    if let Some(fiche) = mapping.qualification_code.as_deref() {
      fiches_by_diploma
        .entry(mapping.diploma_code.as_str())
        .or_default()
        .insert(fiche);
    }
  }

  let mut pairs = Vec::with_capacity(diplomas.len());
  for diploma in diplomas {
    let Some(fiches) = fiches_by_diploma.get(diploma.code.as_str()) else {
      pairs.push(AggregatePair::diploma_only(diploma));
      continue;
    };
    for fiche in fiches {
      let qualification = qualifications.get(*fiche).cloned().ok_or_else(|| {
        Error::SourceConsistency(format!(
          "mapping {} -> {fiche} points at an unknown fiche",
          diploma.code
        ))
      })?;
      pairs.push(AggregatePair {
        diploma:       Some(diploma.clone()),
        qualification: Some(qualification),
      });
    }
  }
  Ok(pairs)
}

/// Qualification-anchored pairing of one page of unmapped fiches.
///
/// `mapped` reports whether any mapping row mentions a fiche; such fiches are
/// reached by the diploma-anchored traversal and skipped here.
pub fn pair_unmapped_qualifications(
  qualifications: Vec<QualificationRecord>,
  mapped: impl Fn(&str) -> bool,
) -> Result<Vec<AggregatePair>> {
  let mut pairs = Vec::new();
  for qualification in qualifications {
    if mapped(&qualification.code) {
      continue;
    }
    if build_access_routes(&qualification.access_routes)?.is_work_study() {
      pairs.push(AggregatePair::qualification_only(qualification));
    }
  }
  Ok(pairs)
}

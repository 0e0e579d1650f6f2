//! Streaming cursor over the two aggregation traversals.

use std::collections::{BTreeSet, HashMap};

use certif_core::{
  aggregate::{AggregatePair, pair_diplomas, pair_unmapped_qualifications},
  store::SourceStore,
};

use crate::{Error, Result};

enum Phase {
  Diplomas { after: Option<String> },
  Qualifications { after: Option<String> },
  Done,
}

/// Yields aggregate pairs one source page at a time: every diploma first,
/// then every unmapped work-study fiche.
pub struct AggregatorCursor<'a, S> {
  store: &'a S,
  page:  usize,
  phase: Phase,
}

impl<'a, S: SourceStore> AggregatorCursor<'a, S> {
  pub fn new(store: &'a S, page: usize) -> Self {
    Self { store, page, phase: Phase::Diplomas { after: None } }
  }

  /// The next non-empty batch of pairs, or `None` once both traversals are
  /// exhausted.
  pub async fn next_batch(&mut self) -> Result<Option<Vec<AggregatePair>>> {
    loop {
      match &self.phase {
        Phase::Diplomas { after } => {
          let diplomas = self
            .store
            .diplomas_after(after.clone(), self.page)
            .await
            .map_err(Error::store)?;
          let Some(last) = diplomas.last() else {
            self.phase = Phase::Qualifications { after: None };
            continue;
          };
          self.phase = Phase::Diplomas { after: Some(last.code.clone()) };

          let codes = diplomas.iter().map(|d| d.code.clone()).collect();
          let mappings = self.store.mappings_for(codes).await.map_err(Error::store)?;
          let fiche_codes: BTreeSet<String> = mappings
            .iter()
            .filter_map(|m| m.qualification_code.clone())
            .collect();
          let fiches = self
            .store
            .qualifications_by_code(fiche_codes.into_iter().collect())
            .await
            .map_err(Error::store)?
            .into_iter()
            .map(|q| (q.code.clone(), q))
            .collect::<HashMap<_, _>>();

          return Ok(Some(pair_diplomas(diplomas, &mappings, &fiches)?));
        }

        Phase::Qualifications { after } => {
          let fiches = self
            .store
            .unmapped_qualifications_after(after.clone(), self.page)
            .await
            .map_err(Error::store)?;
          let Some(last) = fiches.last() else {
            self.phase = Phase::Done;
            continue;
          };
          self.phase = Phase::Qualifications { after: Some(last.code.clone()) };

          // The store already excludes every fiche a mapping row mentions.
          let pairs = pair_unmapped_qualifications(fiches, |_| false)?;
          if !pairs.is_empty() {
            return Ok(Some(pairs));
          }
        }

        Phase::Done => return Ok(None),
      }
    }
  }
}

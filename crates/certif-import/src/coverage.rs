//! The `covering` stage: fill gaps in the tiling of every paired code.

use certif_core::{
  certification::Side,
  coverage::{Anchor, fill_gaps},
  store::{CertificationStore, SourceStore},
};

use crate::{Error, Result, context::RunContext, lease::RunLease};

/// Write filler certifications for every code of `side` paired in this run.
/// Returns the number of fillers written.
pub async fn cover_side<S>(
  store: &S,
  ctx: &RunContext,
  lease: &RunLease<'_, S>,
  side: Side,
  page: usize,
) -> Result<usize>
where
  S: SourceStore + CertificationStore,
{
  let mut after = None;
  let mut written = 0;

  loop {
    let codes = store
      .paired_codes_after(ctx.run_id, side, after.clone(), page)
      .await
      .map_err(Error::store)?;
    let Some(last) = codes.last() else { break };
    after = Some(last.clone());

    let mut fillers = Vec::new();
    match side {
      Side::Diploma => {
        let records = store.diplomas_by_code(codes).await.map_err(Error::store)?;
        for record in &records {
          let existing = store
            .certifications_for_code(ctx.run_id, side, record.code.clone())
            .await
            .map_err(Error::store)?;
          fillers.extend(fill_gaps(Anchor::Diploma(record), &existing, &ctx.build)?);
        }
      }
      Side::Qualification => {
        let records = store.qualifications_by_code(codes).await.map_err(Error::store)?;
        for record in &records {
          let existing = store
            .certifications_for_code(ctx.run_id, side, record.code.clone())
            .await
            .map_err(Error::store)?;
          fillers.extend(fill_gaps(Anchor::Qualification(record), &existing, &ctx.build)?);
        }
      }
    }

    if !fillers.is_empty() {
      written += store
        .upsert_certifications(ctx.stamp(), fillers)
        .await
        .map_err(Error::store)?;
      lease.renew().await?;
    }
  }

  tracing::debug!(side = side_name(side), written, "coverage side filled");
  Ok(written)
}

fn side_name(side: Side) -> &'static str {
  match side {
    Side::Diploma => "diploma",
    Side::Qualification => "qualification",
  }
}

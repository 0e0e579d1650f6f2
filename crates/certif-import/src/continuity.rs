//! The `continuity` stage: attach lineage chains to every certification of
//! the run.

use certif_core::{
  continuity::{ContinuityBuilder, ContinuityIndex},
  period::{diploma_window, qualification_window},
  store::{CertificationStore, SourceStore},
};

use crate::{Error, Result, context::RunContext, lease::RunLease};

/// Union every predecessor/successor reference of both registries into one
/// index per side.
async fn build_indexes<S>(
  store: &S,
  ctx: &RunContext,
  page: usize,
) -> Result<(ContinuityIndex, ContinuityIndex)>
where
  S: SourceStore,
{
  let mut diplomas = ContinuityBuilder::new();
  let mut after = None;
  loop {
    let records = store.diplomas_after(after, page).await.map_err(Error::store)?;
    let Some(last) = records.last() else { break };
    after = Some(last.code.clone());
    for record in &records {
      diplomas.add_code(&record.code, diploma_window(record)?);
      for other in record.predecessors.iter().chain(&record.successors) {
        diplomas.link(&record.code, other);
      }
    }
  }

  let mut qualifications = ContinuityBuilder::new();
  let mut after = None;
  loop {
    let records = store.qualifications_after(after, page).await.map_err(Error::store)?;
    let Some(last) = records.last() else { break };
    after = Some(last.code.clone());
    for record in &records {
      let window = qualification_window(record, ctx.build.oldest_qualification_snapshot)?;
      qualifications.add_code(&record.code, window);
      for other in record.predecessors.iter().chain(&record.successors) {
        qualifications.link(&record.code, other);
      }
    }
  }

  Ok((diplomas.finish(), qualifications.finish()))
}

/// Rewrite every certification of the run with its continuity chains.
/// Returns the number of certifications rewritten.
pub async fn attach_chains<S>(
  store: &S,
  ctx: &RunContext,
  lease: &RunLease<'_, S>,
  page: usize,
) -> Result<usize>
where
  S: SourceStore + CertificationStore,
{
  let (diplomas, qualifications) = build_indexes(store, ctx, page).await?;
  tracing::debug!(
    diploma_codes = diplomas.len(),
    qualification_codes = qualifications.len(),
    "continuity indexes built"
  );

  let mut after = None;
  let mut written = 0;
  loop {
    let mut batch = store
      .run_certifications_after(ctx.run_id, after, page)
      .await
      .map_err(Error::store)?;
    let Some(last) = batch.last() else { break };
    after = Some(last.key().encode());

    for certification in &mut batch {
      let identity = &certification.identity;
      certification.continuity.diploma =
        identity.diploma_code.as_deref().map(|c| diplomas.chain(c));
      certification.continuity.qualification =
        identity.qualification_code.as_deref().map(|c| qualifications.chain(c));
      certification.validate()?;
    }

    written += store
      .upsert_certifications(ctx.stamp(), batch)
      .await
      .map_err(Error::store)?;
    lease.renew().await?;
  }

  Ok(written)
}

//! Sequences one reconciliation run through its stages.
//!
//! ```text
//! idle → sourcing → aggregating → covering → continuity → sweeping → done
//!                                                         (any) → failed
//! ```
//!
//! The run holds the store's single-writer lease from start to finish and
//! renews it on every stage transition and after every written batch. Each
//! stage reads only what the
//! previous stage committed. Every row written is stamped with the run id;
//! sweeping deletes whatever the run did not stamp, so a failed run never
//! evicts anything.

use certif_core::{
  builder::assemble,
  certification::{Certification, Side},
  store::{CertificationStore, RunRecord, SourceStore},
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{
  Error, Result,
  aggregator::AggregatorCursor,
  config::ReconcileConfig,
  context::RunContext,
  continuity::attach_chains,
  coverage::cover_side,
  lease::RunLease,
  stage::RunStage,
};

/// How many dangling mappings are quoted when the consistency check fails.
const DANGLING_SAMPLE: usize = 5;

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Row counts of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
  pub run_id:  Uuid,
  /// Aggregated certifications written.
  pub written: usize,
  /// Coverage fillers written.
  pub fillers: usize,
  /// Certifications rewritten with continuity chains.
  pub chained: usize,
  /// Stale certifications deleted.
  pub swept:   usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
  /// No source changed since the last successful run.
  NoOp,
  Completed(RunSummary),
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct Orchestrator<S> {
  store:  S,
  config: ReconcileConfig,
  stage:  watch::Sender<RunStage>,
}

impl<S> Orchestrator<S>
where
  S: SourceStore + CertificationStore,
{
  pub fn new(store: S, config: ReconcileConfig) -> Self {
    let (stage, _) = watch::channel(RunStage::Idle);
    Self { store, config, stage }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Observe stage transitions.
  pub fn subscribe(&self) -> watch::Receiver<RunStage> { self.stage.subscribe() }

  pub fn stage(&self) -> RunStage { *self.stage.borrow() }

  /// Run one reconciliation stamped with `now`.
  pub async fn run(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
    let run_id = Uuid::new_v4();
    let holder = run_id.to_string();
    self.stage.send_replace(RunStage::Idle);

    let lease = match RunLease::acquire(&self.store, holder, now, self.config.lease_ttl()).await {
      Ok(lease) => lease,
      Err(e) => {
        tracing::warn!(%run_id, error = %e, "could not take the reconciliation lease");
        self.stage.send_replace(RunStage::Failed);
        return Err(e);
      }
    };

    let result = self.run_stages(run_id, &lease, now).await;
    lease.release().await;

    match result {
      Ok(outcome) => {
        self.stage.send_replace(RunStage::Done);
        Ok(outcome)
      }
      Err(e) => {
        tracing::error!(%run_id, stage = %self.stage(), error = %e, "reconciliation run failed");
        self.stage.send_replace(RunStage::Failed);
        Err(e)
      }
    }
  }

  /// Renew the lease, then publish `stage`.
  async fn enter(&self, stage: RunStage, lease: &RunLease<'_, S>) -> Result<()> {
    lease.renew().await?;
    tracing::info!(%stage, "entering stage");
    self.stage.send_replace(stage);
    Ok(())
  }

  async fn run_stages(
    &self,
    run_id: Uuid,
    lease: &RunLease<'_, S>,
    now: DateTime<Utc>,
  ) -> Result<RunOutcome> {
    // ── sourcing ──────────────────────────────────────────────────────────
    tracing::info!(stage = %RunStage::Sourcing, %run_id, "entering stage");
    self.stage.send_replace(RunStage::Sourcing);

    let snapshot = self.store.snapshot().await.map_err(Error::store)?;
    let previous = self.store.last_successful_run().await.map_err(Error::store)?;
    if !self.config.force
      && let Some(previous) = &previous
      && !snapshot.is_newer_than(&previous.sources)
    {
      tracing::info!(last_run = %previous.run_id, "sources unchanged; nothing to reconcile");
      return Ok(RunOutcome::NoOp);
    }

    let dangling = self
      .store
      .dangling_mappings(DANGLING_SAMPLE)
      .await
      .map_err(Error::store)?;
    if !dangling.is_empty() {
      let sample = dangling
        .iter()
        .map(|m| {
          format!(
            "{} -> {}",
            m.diploma_code,
            m.qualification_code.as_deref().unwrap_or("(none)")
          )
        })
        .collect::<Vec<_>>()
        .join(", ");
      return Err(
        certif_core::Error::SourceConsistency(format!(
          "mappings reference unknown codes: {sample}"
        ))
        .into(),
      );
    }

    let ctx = RunContext::new(run_id, now, snapshot);
    let page = self.config.page();

    // ── aggregating ───────────────────────────────────────────────────────
    self.enter(RunStage::Aggregating, lease).await?;
    let written = self.aggregate(&ctx, lease).await?;

    // ── covering ──────────────────────────────────────────────────────────
    self.enter(RunStage::Covering, lease).await?;
    let fillers = cover_side(&self.store, &ctx, lease, Side::Diploma, page).await?
      + cover_side(&self.store, &ctx, lease, Side::Qualification, page).await?;

    // ── continuity ────────────────────────────────────────────────────────
    self.enter(RunStage::Continuity, lease).await?;
    let chained = attach_chains(&self.store, &ctx, lease, page).await?;

    // ── sweeping ──────────────────────────────────────────────────────────
    self.enter(RunStage::Sweeping, lease).await?;
    let swept = self.store.sweep(run_id).await.map_err(Error::store)?;
    self
      .store
      .record_run(RunRecord {
        run_id,
        started_at: now,
        completed_at: Utc::now().max(now),
        sources: ctx.snapshot.clone(),
      })
      .await
      .map_err(Error::store)?;

    let summary = RunSummary { run_id, written, fillers, chained, swept };
    tracing::info!(
      %run_id,
      written = summary.written,
      fillers = summary.fillers,
      chained = summary.chained,
      swept = summary.swept,
      "reconciliation run complete"
    );
    Ok(RunOutcome::Completed(summary))
  }

  /// Stream aggregate pairs through the assembler into the store. The
  /// producer and the writer are joined over a bounded channel so at most
  /// `channel_capacity` batches are in flight.
  async fn aggregate(&self, ctx: &RunContext, lease: &RunLease<'_, S>) -> Result<usize> {
    let capacity = self.config.channel_capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<Vec<Certification>>(capacity);
    let page = self.config.page();

    let producer = async move {
      let mut cursor = AggregatorCursor::new(&self.store, page);
      while let Some(pairs) = cursor.next_batch().await? {
        let batch = pairs
          .iter()
          .map(|pair| assemble(pair, &ctx.build))
          .collect::<certif_core::Result<Vec<_>>>()?;
        if tx.send(batch).await.is_err() {
          // The writer failed; its error is the one reported.
          break;
        }
      }
      Ok::<_, Error>(())
    };

    let writer = async move {
      let mut written = 0;
      while let Some(batch) = rx.recv().await {
        written += self
          .store
          .upsert_certifications(ctx.stamp(), batch)
          .await
          .map_err(Error::store)?;
        lease.renew().await?;
        tracing::debug!(written, "aggregated batch written");
      }
      Ok::<_, Error>(written)
    };

    let ((), written) = tokio::try_join!(producer, writer)?;
    Ok(written)
  }
}

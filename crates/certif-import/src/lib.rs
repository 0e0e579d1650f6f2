//! Reconciliation run orchestration.
//!
//! An [`Orchestrator`] drives one run over any store implementing both
//! [`SourceStore`](certif_core::store::SourceStore) and
//! [`CertificationStore`](certif_core::store::CertificationStore): it pairs
//! and assembles certifications, fills coverage gaps, attaches continuity
//! chains, then sweeps every row the run did not stamp.

mod aggregator;
mod continuity;
mod coverage;
mod lease;

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod stage;

pub use config::ReconcileConfig;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, RunOutcome, RunSummary};
pub use stage::RunStage;

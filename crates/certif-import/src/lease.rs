//! A run's hold on the store's single-writer lease.
//!
//! Every lease call of a run reads the same clock: the run's start instant
//! advanced by the monotonic time elapsed since. Renewal only extends a lease
//! the run still holds; if another run took it over in between, the run
//! stops with [`Error::LeaseLost`] before it writes or sweeps anything more.

use std::time::Duration;

use certif_core::store::{CertificationStore, LeaseOutcome};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{Error, Result};

pub struct RunLease<'a, S> {
  store:   &'a S,
  holder:  String,
  ttl:     Duration,
  origin:  DateTime<Utc>,
  started: Instant,
}

impl<'a, S> RunLease<'a, S>
where
  S: CertificationStore,
{
  /// Take the lease for `holder`, failing with [`Error::LeaseHeld`] while
  /// another holder's lease is live at `origin`.
  pub async fn acquire(
    store: &'a S,
    holder: String,
    origin: DateTime<Utc>,
    ttl: Duration,
  ) -> Result<Self> {
    let outcome = store
      .acquire_lease(holder.clone(), origin, ttl)
      .await
      .map_err(Error::store)?;
    match outcome {
      LeaseOutcome::Acquired(_) => {
        let started = Instant::now();
        Ok(Self { store, holder, ttl, origin, started })
      }
      LeaseOutcome::Held(lease) => Err(Error::LeaseHeld {
        holder:     lease.holder,
        expires_at: lease.expires_at,
      }),
    }
  }

  /// The run clock.
  pub fn now(&self) -> DateTime<Utc> {
    let elapsed = chrono::Duration::from_std(self.started.elapsed())
      .unwrap_or_else(|_| chrono::Duration::zero());
    self.origin + elapsed
  }

  /// Push the expiry out by another ttl.
  pub async fn renew(&self) -> Result<()> {
    let renewed = self
      .store
      .renew_lease(self.holder.clone(), self.now(), self.ttl)
      .await
      .map_err(Error::store)?;
    match renewed {
      Some(lease) => {
        tracing::trace!(expires_at = %lease.expires_at, "lease renewed");
        Ok(())
      }
      None => Err(Error::LeaseLost { holder: self.holder.clone() }),
    }
  }

  /// Drop the lease. Failure is logged, not returned.
  pub async fn release(self) {
    if let Err(e) = self.store.release_lease(self.holder.clone()).await {
      tracing::warn!(holder = %self.holder, error = %e, "failed to release the reconciliation lease");
    }
  }
}

//! Core types and reconciliation logic for the certification registry.
//!
//! Three source registries (diplomas, qualification fiches, and the sparse
//! mapping table between them) are reconciled into canonical
//! [`Certification`](certification::Certification) records. Everything in this
//! crate is pure: storage backends implement the traits in [`store`], and the
//! run sequencing lives in `certif-import`.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod builder;
pub mod certification;
pub mod continuity;
pub mod coverage;
pub mod date;
pub mod error;
pub mod period;
pub mod source;
pub mod store;

pub use error::{Error, Result};

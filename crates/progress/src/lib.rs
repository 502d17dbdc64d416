//! Weighted multi-stage progress model.
//!
//! A system upgrade goes through several stages (download, keyring and
//! integrity checks, package loading, file conflict and disk space checks,
//! commit) that each report their own 0-100 % figure. This crate folds them
//! into one global fraction that never goes backwards.
//!
//! The stage weights depend on the [`Scenario`]: an upgrade that downloads
//! nothing spends most of its time committing, a download-only run never
//! commits at all.

mod accumulator;
mod rate;
mod weights;

pub use accumulator::ProgressAccumulator;
pub use rate::RateEstimator;
pub use weights::{Scenario, Stage, StageWeights};

//! Object Lock retention renewal.
//!
//! A run proceeds in four steps:
//! 1. Resolve the bucket's default retention rule into a mode and period
//! 2. Compute the renewal threshold and target from a single `now`
//! 3. Walk every key of the bucket page by page
//! 4. Extend each lock ending before the threshold and verify the write
//!
//! Objects are processed strictly one after another. The first error aborts
//! the run; nothing is retried at the run level.

mod enumerator;
mod policy;
mod renewal;
mod runner;

pub use enumerator::object_keys;
pub use policy::{DAYS_PER_YEAR, RenewalPolicy, RenewalWindow, resolve_default_retention};
pub use renewal::{RenewalEngine, RenewalOutcome};
pub use runner::{
    RenewalPlan, RunFailure, RunSummary, plan_renewal, report, run_renewal, run_renewal_at,
};

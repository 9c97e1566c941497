//! Policy evaluation.
//!
//! Runs many independent trajectories per policy and aggregates returns and
//! model-specific KPIs into one [`PolicyComparison`] record per policy.

pub mod comparer;

use std::collections::BTreeMap;

use crate::mdp::Mdp;
use crate::rollout::EventObserver;

pub use comparer::{save_comparisons, ComparerConfig, PolicyComparer, PolicyComparison};

/// An [`EventObserver`] that can summarize what it observed.
///
/// Trackers accumulate across all trajectories of one policy; the comparer
/// calls [`KpiTracker::reset`] before each policy.
pub trait KpiTracker<M: Mdp>: EventObserver<M> {
    fn reset(&mut self) {}

    /// Named KPI values, e.g. `service_level`.
    fn summarize(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl<M: Mdp> KpiTracker<M> for () {}

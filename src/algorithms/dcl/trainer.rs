//! Contract between DCL and the component that fits a policy to samples.

use std::sync::Arc;

use serde_json::Value;

use super::config::{NnArchitecture, TrainingConfig};
use super::sample::SampleSet;
use crate::error::Result;
use crate::mdp::Mdp;
use crate::policy::SharedPolicy;

/// Fits a policy that imitates the labels of a sample set.
///
/// DCL never looks inside the returned policy; it only drives it and
/// persists its [`Policy::snapshot`](crate::policy::Policy::snapshot), which
/// [`PolicyTrainer::load`] must be able to turn back into an equivalent
/// policy.
pub trait PolicyTrainer<M: Mdp> {
    /// Trains a new policy on `samples`.
    ///
    /// # Arguments
    ///
    /// * `mdp` - The model the samples were drawn from
    /// * `samples` - Labelled decisions of one generation
    /// * `architecture` - Model layout requested by the run configuration
    /// * `training` - Optimizer settings requested by the run configuration
    /// * `warm_start` - The previous generation's policy, when the run asks
    ///   to continue from it
    fn train(
        &self,
        mdp: &Arc<M>,
        samples: &SampleSet,
        architecture: &NnArchitecture,
        training: &TrainingConfig,
        warm_start: Option<&SharedPolicy<M>>,
    ) -> Result<SharedPolicy<M>>;

    /// Rebuilds a policy from a snapshot produced by a trained policy.
    fn load(&self, mdp: &Arc<M>, snapshot: &Value) -> Result<SharedPolicy<M>>;
}

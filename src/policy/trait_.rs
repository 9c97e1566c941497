//! Policy trait for driving an MDP.

use std::sync::Arc;

use rand::rngs::StdRng;
use serde_json::Value;

use crate::error::Result;
use crate::mdp::Mdp;

/// A policy that selects an action index for a state awaiting a decision.
///
/// Policies hold only their own parameters (thresholds, a trained model) and
/// the model they were built for; they keep no per-trajectory data. Any
/// randomness comes from the trajectory's stream passed in as `rng`, which
/// keeps rollouts reproducible.
pub trait Policy<M: Mdp>: Send + Sync {
    /// Selects an action for `state`.
    ///
    /// # Arguments
    ///
    /// * `state` - A state whose category is `AwaitAction`
    /// * `rng` - The random stream of the trajectory holding `state`
    fn get_action(&self, state: &M::State, rng: &mut StdRng) -> Result<usize>;

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;

    /// Structured description used when persisting the policy.
    fn snapshot(&self) -> Value {
        serde_json::json!({ "id": self.name() })
    }
}

/// Reference-counted, thread-shareable policy handle.
pub type SharedPolicy<M> = Arc<dyn Policy<M>>;

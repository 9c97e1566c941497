//! Generic MDP contract.
//!
//! Every model implements [`Mdp`]; the rollout driver, the policies and DCL
//! only ever talk to this trait, so any model can be driven by any policy.

pub mod registry;

use std::fmt;

use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::StateCategory;
use crate::error::{Result, RollplexError};

pub use registry::{PolicyRegistry, Registry};

/// Whether rewards are costs to minimize or gains to maximize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Minimize,
    Maximize,
}

impl Objective {
    /// Returns true if `candidate` is strictly better than `incumbent`.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Objective::Minimize => candidate < incumbent,
            Objective::Maximize => candidate > incumbent,
        }
    }
}

/// Horizon type reported to external tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonType {
    Finite,
    Infinite,
}

/// Static description of a model, independent of any state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticInfo {
    pub valid_actions: usize,
    pub horizon_type: HorizonType,
    pub is_non_stationary: bool,
    pub objective: Objective,
}

/// A Markov decision process with interleaved decisions and events.
///
/// Implementations are immutable after construction and are shared read-only
/// across worker threads; all mutable simulation data lives in
/// [`Mdp::State`], which is owned by exactly one trajectory.
///
/// Actions are plain indices into a per-model enumerated action list of
/// length [`Mdp::num_valid_actions`].
pub trait Mdp: Send + Sync + 'static {
    /// Full simulation state.
    type State: Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
    /// Exogenous event consumed by [`Mdp::modify_state_with_event`].
    type Event;

    /// Identifier used to address persisted artifacts for this instance.
    fn identifier(&self) -> String;

    /// Per-period discount factor applied to rewards.
    fn discount_factor(&self) -> f64;

    fn static_info(&self) -> StaticInfo;

    /// Size of the enumerated action list.
    fn num_valid_actions(&self) -> usize;

    /// Start-of-horizon state.
    fn initial_state(&self) -> Self::State;

    /// Category of `state`; the sole dispatch key of the rollout driver.
    fn category(&self, state: &Self::State) -> StateCategory;

    /// Phase-aware legality check.
    ///
    /// # Errors
    ///
    /// [`RollplexError::InvalidActionIndex`] if `action` is outside the
    /// enumerated action list.
    fn is_allowed_action(&self, state: &Self::State, action: usize) -> Result<bool>;

    /// Applies one decision to `state` and returns its reward.
    fn modify_state_with_action(&self, state: &mut Self::State, action: usize) -> Result<f64>;

    /// Applies one exogenous event to `state` and returns its reward.
    fn modify_state_with_event(&self, state: &mut Self::State, event: &Self::Event)
        -> Result<f64>;

    /// Samples the next exogenous event from the trajectory's stream.
    fn get_event(&self, rng: &mut StdRng) -> Result<Self::Event>;

    /// Appends the fixed-width numeric encoding of `state` to `features`.
    fn get_features(&self, state: &Self::State, features: &mut Vec<f64>);

    /// Length of the vector written by [`Mdp::get_features`].
    fn num_flat_features(&self) -> usize {
        let mut features = Vec::new();
        self.get_features(&self.initial_state(), &mut features);
        features.len()
    }

    /// Legality mask over the full action list.
    fn allowed_actions(&self, state: &Self::State) -> Result<Vec<bool>> {
        (0..self.num_valid_actions())
            .map(|action| self.is_allowed_action(state, action))
            .collect()
    }

    /// Serializes `state` into a structured record.
    fn state_to_value(&self, state: &Self::State) -> Result<Value> {
        Ok(serde_json::to_value(state)?)
    }

    /// Rebuilds a state from a record produced by [`Mdp::state_to_value`]
    /// (or written by hand, e.g. for heat-map probing).
    fn state_from_value(&self, value: &Value) -> Result<Self::State> {
        serde_json::from_value(value.clone())
            .map_err(|e| RollplexError::InvalidConfig(format!("state record: {e}")))
    }

    /// Registers model-specific policies. The default registers nothing
    /// beyond the generic ones every [`PolicyRegistry`] starts with.
    fn register_policies(&self, _registry: &mut PolicyRegistry<Self>)
    where
        Self: Sized,
    {
    }
}

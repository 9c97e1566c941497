//! rollplex - Rollout-driven MDP simulation and generational policy training
//!
//! A substrate for simulating Markov decision processes with multi-stage
//! actions and stochastic events, driving them with pluggable policies, and
//! improving those policies generation by generation (DCL).

pub mod algorithms;
pub mod category;
pub mod error;
pub mod evaluation;
pub mod mdp;
pub mod models;
pub mod policy;
pub mod rollout;

#[cfg(test)]
pub(crate) mod test_support;

pub use category::StateCategory;
pub use error::{Result, RollplexError};
pub use mdp::{Mdp, Objective, Registry, StaticInfo};
pub use policy::{Policy, SharedPolicy};

/// Identifier type used for runs and persisted artifacts.
pub type Id = String;

/// Generates a new unique identifier (UUID v4).
pub fn generate_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

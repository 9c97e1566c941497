//! Policy-improvement algorithms.
//!
//! [`dcl`] is always available; the neural trainer in `network` requires
//! the `nn` feature flag (which brings in `tch`).

pub mod dcl;

#[cfg(feature = "nn")]
pub mod network;

pub use dcl::{
    Dcl, DclConfig, NearestNeighbourPolicy, NearestNeighbourTrainer, NnArchitecture,
    PolicyTrainer, Sample, SampleSet, TrainingConfig,
};

#[cfg(feature = "nn")]
pub use network::{MlpTrainer, NeuralPolicy};

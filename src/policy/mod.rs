//! Policy trait and model-agnostic implementations.

pub mod random;
pub mod trait_;

pub use random::RandomPolicy;
pub use trait_::{Policy, SharedPolicy};

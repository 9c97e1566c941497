//! Trajectory-driven simulation.
//!
//! [`Trajectory`] holds one run's state and random stream; [`driver`]
//! advances trajectories by dispatching on their category; [`Emulator`]
//! exposes the same loop one decision at a time.

pub mod driver;
pub mod emulator;
pub mod trajectory;

pub use driver::{
    advance_to_decision, incorporate_action, incorporate_event, run_batch, run_periods,
    set_action, EventObserver,
};
pub use emulator::{Emulator, EmulatorStep, Observation};
pub use trajectory::{derive_seed, Trajectory};

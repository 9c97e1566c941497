//! Concrete models.

pub mod joint_replenishment;

use crate::mdp::Registry;

/// Registers every model shipped with the crate.
pub fn register_builtin(registry: &mut Registry) {
    joint_replenishment::register(registry);
}

//! Phase tags shared by every MDP state.
//!
//! A state is either waiting for an exogenous event, waiting for a decision
//! at a given stage, or finished. The rollout driver dispatches on this tag
//! alone.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of an MDP state.
///
/// `stage` is only meaningful for [`StateCategory::AwaitAction`]; multi-stage
/// decisions (e.g. "pick a product, then pick its quantity") use consecutive
/// stage numbers starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateCategory {
    AwaitEvent,
    AwaitAction { stage: usize },
    Final,
}

impl StateCategory {
    /// The state awaits an exogenous event.
    pub fn await_event() -> Self {
        StateCategory::AwaitEvent
    }

    /// The state awaits a decision at `stage`.
    pub fn await_action(stage: usize) -> Self {
        StateCategory::AwaitAction { stage }
    }

    /// The trajectory has terminated.
    pub fn final_() -> Self {
        StateCategory::Final
    }

    pub fn is_await_event(&self) -> bool {
        matches!(self, StateCategory::AwaitEvent)
    }

    pub fn is_await_action(&self) -> bool {
        matches!(self, StateCategory::AwaitAction { .. })
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StateCategory::Final)
    }

    /// Returns the decision stage, or `None` when not awaiting an action.
    pub fn index(&self) -> Option<usize> {
        match self {
            StateCategory::AwaitAction { stage } => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for StateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateCategory::AwaitEvent => write!(f, "await_event"),
            StateCategory::AwaitAction { stage } => write!(f, "await_action({})", stage),
            StateCategory::Final => write!(f, "final"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_are_exclusive() {
        let all = [
            StateCategory::await_event(),
            StateCategory::await_action(0),
            StateCategory::final_(),
        ];
        for cat in all {
            let hits = [cat.is_await_event(), cat.is_await_action(), cat.is_final()]
                .iter()
                .filter(|b| **b)
                .count();
            assert_eq!(hits, 1, "{cat}");
        }
    }

    #[test]
    fn index_only_for_await_action() {
        assert_eq!(StateCategory::await_action(1).index(), Some(1));
        assert_eq!(StateCategory::await_event().index(), None);
        assert_eq!(StateCategory::final_().index(), None);
    }

    #[test]
    fn serializes_with_stage() {
        let json = serde_json::to_value(StateCategory::await_action(1)).unwrap();
        assert_eq!(json["type"], "await_action");
        assert_eq!(json["stage"], 1);
        let back: StateCategory = serde_json::from_value(json).unwrap();
        assert_eq!(back, StateCategory::await_action(1));
    }
}

//! Small deterministic model shared by unit tests of the generic layers.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::category::StateCategory;
use crate::error::{Result, RollplexError};
use crate::mdp::{HorizonType, Mdp, Objective, StaticInfo};

/// Each period the policy either holds (action 0) or raises the level by one
/// (action 1); the event then charges `level` as cost.
#[derive(Debug, Clone)]
pub struct CountdownMdp {
    horizon: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownState {
    pub cat: StateCategory,
    pub level: i64,
    pub remaining: u64,
}

impl CountdownMdp {
    pub fn new(horizon: Option<u64>) -> Self {
        Self { horizon }
    }
}

impl Mdp for CountdownMdp {
    type State = CountdownState;
    type Event = ();

    fn identifier(&self) -> String {
        "countdown".into()
    }

    fn discount_factor(&self) -> f64 {
        1.0
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            valid_actions: 2,
            horizon_type: if self.horizon.is_some() {
                HorizonType::Finite
            } else {
                HorizonType::Infinite
            },
            is_non_stationary: false,
            objective: Objective::Minimize,
        }
    }

    fn num_valid_actions(&self) -> usize {
        2
    }

    fn initial_state(&self) -> CountdownState {
        CountdownState {
            cat: StateCategory::await_action(0),
            level: 1,
            remaining: self.horizon.unwrap_or(0),
        }
    }

    fn category(&self, state: &CountdownState) -> StateCategory {
        state.cat
    }

    fn is_allowed_action(&self, state: &CountdownState, action: usize) -> Result<bool> {
        if action >= 2 {
            return Err(RollplexError::InvalidActionIndex {
                action,
                num_actions: 2,
            });
        }
        Ok(state.cat.is_await_action())
    }

    fn modify_state_with_action(&self, state: &mut CountdownState, action: usize) -> Result<f64> {
        if !self.is_allowed_action(state, action)? {
            return Err(RollplexError::IllegalAction {
                action,
                state: format!("{state:?}"),
            });
        }
        state.level += action as i64;
        state.cat = StateCategory::await_event();
        Ok(0.0)
    }

    fn modify_state_with_event(&self, state: &mut CountdownState, _event: &()) -> Result<f64> {
        state.cat = StateCategory::await_action(0);
        if self.horizon.is_some() {
            state.remaining -= 1;
            if state.remaining == 0 {
                state.cat = StateCategory::final_();
            }
        }
        Ok(state.level as f64)
    }

    fn get_event(&self, _rng: &mut StdRng) -> Result<()> {
        Ok(())
    }

    fn get_features(&self, state: &CountdownState, features: &mut Vec<f64>) {
        features.push(state.level as f64);
    }
}

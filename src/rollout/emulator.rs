//! Step-at-a-time view of an MDP for external learners.
//!
//! Each [`Emulator::step`] applies one action and then incorporates events
//! until the next decision, so callers only ever see decision states along
//! with the mask of allowed actions.

use std::sync::Arc;

use super::driver::{advance_to_decision, incorporate_action};
use super::trajectory::Trajectory;
use crate::category::StateCategory;
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;

/// Features of a decision state plus the legality mask of every action.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub features: Vec<f64>,
    pub mask: Vec<bool>,
}

/// Result of a single emulator step.
#[derive(Debug, Clone)]
pub struct EmulatorStep {
    /// Observation at the next decision (all-false mask once terminated).
    pub observation: Observation,
    /// Reward of the action plus every event incorporated after it.
    pub reward: f64,
    /// The trajectory reached `Final`.
    pub terminated: bool,
    /// An action or period budget ran out before `Final`.
    pub truncated: bool,
}

/// Single-trajectory emulator.
///
/// # Lifecycle
///
/// 1. Call [`Emulator::new`] with the model and optional step budgets.
/// 2. Call [`Emulator::reset`] with a seed to start a trajectory.
/// 3. Call [`Emulator::step`] until `terminated` or `truncated`.
pub struct Emulator<M: Mdp> {
    mdp: Arc<M>,
    trajectory: Option<Trajectory<M::State>>,
    /// Truncate after this many actions (0 = unlimited).
    num_actions_until_done: u64,
    /// Truncate after this many periods (0 = unlimited).
    num_periods_until_done: u64,
    actions_taken: u64,
}

impl<M: Mdp> Emulator<M> {
    pub fn new(mdp: Arc<M>, num_actions_until_done: u64, num_periods_until_done: u64) -> Self {
        Self {
            mdp,
            trajectory: None,
            num_actions_until_done,
            num_periods_until_done,
            actions_taken: 0,
        }
    }

    /// Number of actions in the model's action list.
    pub fn action_space_size(&self) -> usize {
        self.mdp.num_valid_actions()
    }

    /// Length of the feature vector in each observation.
    pub fn observation_space_size(&self) -> usize {
        self.mdp.num_flat_features()
    }

    /// Starts a new trajectory and returns the first decision observation.
    pub fn reset(&mut self, seed: u64) -> Result<Observation> {
        let mut trajectory = Trajectory::initiate(self.mdp.as_ref(), seed);
        advance_to_decision(self.mdp.as_ref(), &mut trajectory, &mut ())?;
        let observation = Self::observe(self.mdp.as_ref(), &trajectory)?;
        self.trajectory = Some(trajectory);
        self.actions_taken = 0;
        Ok(observation)
    }

    /// Applies `action` and advances to the next decision.
    pub fn step(&mut self, action: usize) -> Result<EmulatorStep> {
        let mdp = Arc::clone(&self.mdp);
        let trajectory = self
            .trajectory
            .as_mut()
            .ok_or(RollplexError::UnexpectedCategory {
                expected: "started with reset",
                found: StateCategory::final_(),
            })?;
        if trajectory.category.is_final() {
            return Err(RollplexError::UnexpectedCategory {
                expected: "awaiting an action",
                found: trajectory.category,
            });
        }

        trajectory.next_action = Some(action);
        let mut reward = incorporate_action(mdp.as_ref(), trajectory)?;
        reward += advance_to_decision(mdp.as_ref(), trajectory, &mut ())?;
        self.actions_taken += 1;

        let terminated = trajectory.category.is_final();
        let truncated = !terminated
            && ((self.num_actions_until_done > 0
                && self.actions_taken >= self.num_actions_until_done)
                || (self.num_periods_until_done > 0
                    && trajectory.period_count >= self.num_periods_until_done));

        let observation = Self::observe(mdp.as_ref(), trajectory)?;
        Ok(EmulatorStep {
            observation,
            reward,
            terminated,
            truncated,
        })
    }

    /// Returns the current trajectory, if one was started.
    pub fn trajectory(&self) -> Option<&Trajectory<M::State>> {
        self.trajectory.as_ref()
    }

    fn observe(mdp: &M, trajectory: &Trajectory<M::State>) -> Result<Observation> {
        let mut features = Vec::new();
        mdp.get_features(&trajectory.state, &mut features);
        let mask = if trajectory.category.is_await_action() {
            mdp.allowed_actions(&trajectory.state)?
        } else {
            vec![false; mdp.num_valid_actions()]
        };
        Ok(Observation { features, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountdownMdp;

    #[test]
    fn reset_returns_decision_observation() {
        let mut emulator = Emulator::new(Arc::new(CountdownMdp::new(Some(3))), 0, 0);
        let obs = emulator.reset(5).unwrap();
        assert_eq!(obs.features, vec![1.0]);
        assert_eq!(obs.mask, vec![true, true]);
        assert_eq!(emulator.action_space_size(), 2);
        assert_eq!(emulator.observation_space_size(), 1);
    }

    #[test]
    fn episode_terminates_at_horizon() {
        let mut emulator = Emulator::new(Arc::new(CountdownMdp::new(Some(3))), 0, 0);
        emulator.reset(5).unwrap();
        for t in 0..3 {
            let step = emulator.step(0).unwrap();
            assert_eq!(step.reward, 1.0);
            assert_eq!(step.terminated, t == 2);
            assert!(!step.truncated);
        }
        assert_eq!(
            emulator.step(0).err().map(|e| e.to_string()),
            Some("expected a state that is awaiting an action, found final".to_string())
        );
    }

    #[test]
    fn action_budget_truncates() {
        let mut emulator = Emulator::new(Arc::new(CountdownMdp::new(None)), 2, 0);
        emulator.reset(5).unwrap();
        assert!(!emulator.step(1).unwrap().truncated);
        let step = emulator.step(1).unwrap();
        assert!(step.truncated);
        assert!(!step.terminated);
        assert_eq!(step.observation.features, vec![3.0]);
    }

    #[test]
    fn step_before_reset_fails() {
        let mut emulator = Emulator::new(Arc::new(CountdownMdp::new(None)), 0, 0);
        assert!(emulator.step(0).is_err());
    }
}

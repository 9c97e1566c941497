//! Trajectories: the unit of simulation progress.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::category::StateCategory;
use crate::mdp::Mdp;

/// Derives a seed for an independent random stream from a run seed and a
/// stream path (e.g. `[generation, rank, trajectory]`).
///
/// Uses the SplitMix64 finalizer per component so neighbouring indices give
/// unrelated streams.
pub fn derive_seed(base: u64, stream: &[u64]) -> u64 {
    fn mix(mut z: u64) -> u64 {
        z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
    stream
        .iter()
        .fold(mix(base), |acc, &part| mix(acc ^ mix(part)))
}

/// One simulated run of a state through the category state machine.
///
/// The trajectory owns its state and its random stream; nothing in it is
/// shared with other trajectories.
#[derive(Debug, Clone)]
pub struct Trajectory<S> {
    /// Current state.
    pub state: S,
    /// Category of `state`, refreshed after every transition.
    pub category: StateCategory,
    /// Random stream for events and randomized policies.
    pub rng: StdRng,
    /// Sum of rewards, each discounted by the number of events before it.
    pub cumulative_return: f64,
    /// Undiscounted sum of rewards.
    pub total_reward: f64,
    /// Discount applied to the next reward.
    pub effective_discount: f64,
    /// Number of events incorporated so far.
    pub period_count: u64,
    /// Action chosen by a policy and not yet applied.
    pub next_action: Option<usize>,
}

impl<S> Trajectory<S> {
    /// Wraps an existing state, e.g. a clone taken to branch off a rollout.
    pub fn from_state(state: S, category: StateCategory, seed: u64) -> Self {
        Self {
            state,
            category,
            rng: StdRng::seed_from_u64(seed),
            cumulative_return: 0.0,
            total_reward: 0.0,
            effective_discount: 1.0,
            period_count: 0,
            next_action: None,
        }
    }

    /// Adds `reward` to both return accumulators.
    pub(crate) fn accrue(&mut self, reward: f64) {
        self.cumulative_return += self.effective_discount * reward;
        self.total_reward += reward;
    }
}

impl<S: Clone> Trajectory<S> {
    /// Starts a trajectory at the model's initial state.
    pub fn initiate<M>(mdp: &M, seed: u64) -> Self
    where
        M: Mdp<State = S>,
    {
        let state = mdp.initial_state();
        let category = mdp.category(&state);
        Self::from_state(state, category, seed)
    }

    /// Discards progress and restarts at the initial state with a new seed.
    pub fn reset<M>(&mut self, mdp: &M, seed: u64)
    where
        M: Mdp<State = S>,
    {
        *self = Self::initiate(mdp, seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountdownMdp;

    #[test]
    fn derive_seed_separates_streams() {
        let a = derive_seed(42, &[1, 0]);
        let b = derive_seed(42, &[0, 1]);
        let c = derive_seed(43, &[1, 0]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_seed(42, &[1, 0]));
    }

    #[test]
    fn initiate_starts_clean() {
        let mdp = CountdownMdp::new(Some(3));
        let traj = Trajectory::initiate(&mdp, 1);
        assert_eq!(traj.category, StateCategory::await_action(0));
        assert_eq!(traj.cumulative_return, 0.0);
        assert_eq!(traj.effective_discount, 1.0);
        assert_eq!(traj.period_count, 0);
        assert!(traj.next_action.is_none());
    }

    #[test]
    fn reset_discards_progress() {
        let mdp = CountdownMdp::new(Some(3));
        let mut traj = Trajectory::initiate(&mdp, 1);
        traj.accrue(5.0);
        traj.period_count = 2;
        traj.reset(&mdp, 2);
        assert_eq!(traj.total_reward, 0.0);
        assert_eq!(traj.period_count, 0);
    }
}

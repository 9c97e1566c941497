//! Random policy for baselines and as the seed policy of DCL.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::trait_::Policy;
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;

/// Uniformly random selection among the actions allowed in the current state.
pub struct RandomPolicy<M: Mdp> {
    mdp: Arc<M>,
}

impl<M: Mdp> RandomPolicy<M> {
    /// Creates a new random policy for `mdp`.
    pub fn new(mdp: Arc<M>) -> Self {
        Self { mdp }
    }
}

impl<M: Mdp> Policy<M> for RandomPolicy<M> {
    fn get_action(&self, state: &M::State, rng: &mut StdRng) -> Result<usize> {
        let allowed: Vec<usize> = self
            .mdp
            .allowed_actions(state)?
            .into_iter()
            .enumerate()
            .filter_map(|(action, ok)| ok.then_some(action))
            .collect();
        allowed
            .choose(rng)
            .copied()
            .ok_or_else(|| RollplexError::InvalidPhase {
                policy: self.name().to_string(),
                stage: self.mdp.category(state).index(),
            })
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::test_support::{CountdownMdp, CountdownState};
    use crate::StateCategory;

    #[test]
    fn random_policy_picks_allowed_actions() {
        let mdp = Arc::new(CountdownMdp::new(Some(5)));
        let policy = RandomPolicy::new(Arc::clone(&mdp));
        let mut rng = StdRng::seed_from_u64(7);
        let state = mdp.initial_state();
        for _ in 0..50 {
            let action = policy.get_action(&state, &mut rng).unwrap();
            assert!(mdp.is_allowed_action(&state, action).unwrap());
        }
    }

    #[test]
    fn random_policy_fails_without_allowed_actions() {
        let mdp = Arc::new(CountdownMdp::new(Some(5)));
        let policy = RandomPolicy::new(Arc::clone(&mdp));
        let mut rng = StdRng::seed_from_u64(7);
        let state = CountdownState {
            cat: StateCategory::await_event(),
            ..mdp.initial_state()
        };
        assert!(matches!(
            policy.get_action(&state, &mut rng),
            Err(RollplexError::InvalidPhase { stage: None, .. })
        ));
    }
}

//! Phase-dispatch loop shared by evaluation, DCL and the emulator.
//!
//! While a trajectory awaits an event, an event is sampled from its own
//! stream and incorporated; while it awaits an action, the policy is asked
//! for one and the MDP applies it; `Final` stops the loop.

use super::trajectory::Trajectory;
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;
use crate::policy::Policy;

/// Hooks around every incorporated event, for KPI bookkeeping.
pub trait EventObserver<M: Mdp> {
    /// Called with the state just before the event is applied.
    fn before_event(&mut self, _mdp: &M, _state: &M::State) {}

    /// Called with the state just after the event was applied.
    fn after_event(&mut self, _mdp: &M, _state: &M::State, _reward: f64) {}
}

impl<M: Mdp> EventObserver<M> for () {}

/// Renders a state for error diagnostics.
pub(crate) fn describe_state<M: Mdp>(mdp: &M, state: &M::State) -> String {
    mdp.state_to_value(state)
        .map(|value| value.to_string())
        .unwrap_or_else(|_| format!("{state:?}"))
}

/// Samples and incorporates one event.
///
/// Returns the event's reward, which is also accrued into the trajectory's
/// returns before the discount advances.
pub fn incorporate_event<M, O>(
    mdp: &M,
    trajectory: &mut Trajectory<M::State>,
    observer: &mut O,
) -> Result<f64>
where
    M: Mdp,
    O: EventObserver<M> + ?Sized,
{
    if !trajectory.category.is_await_event() {
        return Err(RollplexError::UnexpectedCategory {
            expected: "awaiting an event",
            found: trajectory.category,
        });
    }
    let event = mdp.get_event(&mut trajectory.rng)?;
    observer.before_event(mdp, &trajectory.state);
    let reward = mdp.modify_state_with_event(&mut trajectory.state, &event)?;
    observer.after_event(mdp, &trajectory.state, reward);

    trajectory.accrue(reward);
    trajectory.effective_discount *= mdp.discount_factor();
    trajectory.period_count += 1;
    trajectory.category = mdp.category(&trajectory.state);
    Ok(reward)
}

/// Asks `policy` for an action and stores it as the trajectory's next action.
pub fn set_action<M: Mdp>(
    policy: &dyn Policy<M>,
    trajectory: &mut Trajectory<M::State>,
) -> Result<usize> {
    if !trajectory.category.is_await_action() {
        return Err(RollplexError::UnexpectedCategory {
            expected: "awaiting an action",
            found: trajectory.category,
        });
    }
    let action = policy.get_action(&trajectory.state, &mut trajectory.rng)?;
    trajectory.next_action = Some(action);
    Ok(action)
}

/// Applies the pending action.
///
/// The action is checked with [`Mdp::is_allowed_action`] first, so the MDP
/// never receives an action it would reject.
pub fn incorporate_action<M: Mdp>(mdp: &M, trajectory: &mut Trajectory<M::State>) -> Result<f64> {
    let action = trajectory
        .next_action
        .take()
        .ok_or(RollplexError::UnexpectedCategory {
            expected: "holding a chosen action",
            found: trajectory.category,
        })?;
    if !mdp.is_allowed_action(&trajectory.state, action)? {
        return Err(RollplexError::IllegalAction {
            action,
            state: describe_state(mdp, &trajectory.state),
        });
    }
    let reward = mdp.modify_state_with_action(&mut trajectory.state, action)?;
    trajectory.accrue(reward);
    trajectory.category = mdp.category(&trajectory.state);
    Ok(reward)
}

/// Incorporates events until the trajectory awaits an action or is final.
///
/// Returns the summed reward of the incorporated events.
pub fn advance_to_decision<M, O>(
    mdp: &M,
    trajectory: &mut Trajectory<M::State>,
    observer: &mut O,
) -> Result<f64>
where
    M: Mdp,
    O: EventObserver<M> + ?Sized,
{
    let mut reward = 0.0;
    while trajectory.category.is_await_event() {
        reward += incorporate_event(mdp, trajectory, observer)?;
    }
    Ok(reward)
}

/// Drives one trajectory for up to `periods` further events, or until final.
pub fn run_periods<M, O>(
    mdp: &M,
    policy: &dyn Policy<M>,
    trajectory: &mut Trajectory<M::State>,
    periods: u64,
    observer: &mut O,
) -> Result<()>
where
    M: Mdp,
    O: EventObserver<M> + ?Sized,
{
    let target = trajectory.period_count + periods;
    while trajectory.period_count < target {
        if trajectory.category.is_await_event() {
            incorporate_event(mdp, trajectory, observer)?;
        } else if trajectory.category.is_await_action() {
            set_action(policy, trajectory)?;
            incorporate_action(mdp, trajectory)?;
        } else {
            break;
        }
    }
    Ok(())
}

/// Drives a batch of independent trajectories, one after another.
pub fn run_batch<M, O>(
    mdp: &M,
    policy: &dyn Policy<M>,
    trajectories: &mut [Trajectory<M::State>],
    periods: u64,
    observer: &mut O,
) -> Result<()>
where
    M: Mdp,
    O: EventObserver<M> + ?Sized,
{
    for trajectory in trajectories.iter_mut() {
        run_periods(mdp, policy, trajectory, periods, observer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;

    use super::*;
    use crate::category::StateCategory;
    use crate::test_support::{CountdownMdp, CountdownState};

    /// Always picks the same action index.
    struct Fixed(usize);

    impl Policy<CountdownMdp> for Fixed {
        fn get_action(&self, _state: &CountdownState, _rng: &mut StdRng) -> Result<usize> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        before: usize,
        after: usize,
        rewards: f64,
    }

    impl EventObserver<CountdownMdp> for CountingObserver {
        fn before_event(&mut self, _mdp: &CountdownMdp, _state: &CountdownState) {
            self.before += 1;
        }

        fn after_event(&mut self, _mdp: &CountdownMdp, _state: &CountdownState, reward: f64) {
            self.after += 1;
            self.rewards += reward;
        }
    }

    #[test]
    fn finite_horizon_stops_at_final() {
        let mdp = CountdownMdp::new(Some(4));
        let mut traj = Trajectory::initiate(&mdp, 0);
        let mut observer = CountingObserver::default();
        run_periods(&mdp, &Fixed(1), &mut traj, 100, &mut observer).unwrap();
        assert!(traj.category.is_final());
        assert_eq!(traj.period_count, 4);
        assert_eq!(observer.before, 4);
        assert_eq!(observer.after, 4);
        // levels 2, 3, 4, 5 are charged after each raise
        assert_eq!(traj.total_reward, 14.0);
        assert_eq!(observer.rewards, 14.0);
    }

    #[test]
    fn infinite_horizon_runs_requested_periods() {
        let mdp = CountdownMdp::new(None);
        let mut traj = Trajectory::initiate(&mdp, 0);
        run_periods(&mdp, &Fixed(0), &mut traj, 25, &mut ()).unwrap();
        assert_eq!(traj.period_count, 25);
        assert!(!traj.category.is_final());
        assert_eq!(traj.cumulative_return, 25.0);
    }

    #[test]
    fn illegal_action_is_rejected_before_the_mdp_sees_it() {
        let mdp = CountdownMdp::new(Some(4));
        let mut traj = Trajectory::initiate(&mdp, 0);
        traj.category = StateCategory::await_event();
        traj.state.cat = StateCategory::await_event();
        traj.next_action = Some(0);
        assert!(matches!(
            incorporate_action(&mdp, &mut traj),
            Err(RollplexError::IllegalAction { action: 0, .. })
        ));
        assert_eq!(traj.state.level, 1);
    }

    #[test]
    fn out_of_range_action_is_an_error() {
        let mdp = CountdownMdp::new(Some(4));
        let mut traj = Trajectory::initiate(&mdp, 0);
        assert!(matches!(
            run_periods(&mdp, &Fixed(9), &mut traj, 1, &mut ()),
            Err(RollplexError::InvalidActionIndex { action: 9, .. })
        ));
    }

    #[test]
    fn event_requires_await_event() {
        let mdp = CountdownMdp::new(Some(4));
        let mut traj = Trajectory::initiate(&mdp, 0);
        assert!(matches!(
            incorporate_event(&mdp, &mut traj, &mut ()),
            Err(RollplexError::UnexpectedCategory { .. })
        ));
    }

    #[test]
    fn batch_runs_every_trajectory() {
        let mdp = Arc::new(CountdownMdp::new(Some(3)));
        let mut batch: Vec<_> = (0..5)
            .map(|i| Trajectory::initiate(mdp.as_ref(), i))
            .collect();
        run_batch(mdp.as_ref(), &Fixed(0), &mut batch, 10, &mut ()).unwrap();
        assert!(batch.iter().all(|t| t.category.is_final() && t.period_count == 3));
    }
}

//! Parallel, rollout-labelled sample generation.
//!
//! Every worker rank owns one trajectory stream and follows the current
//! policy through the model. At each decision with a real choice it claims a
//! slot from a shared counter, values every allowed action by `M` rollouts of
//! `H` periods on common random numbers, and records the best action as the
//! label.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use super::config::DclConfig;
use super::sample::{Sample, SampleSet};
use crate::error::Result;
use crate::mdp::Mdp;
use crate::policy::Policy;
use crate::rollout::{
    advance_to_decision, derive_seed, incorporate_action, run_periods, set_action, Trajectory,
};

/// Restarts in a row without a single sample after which a worker gives up.
/// A trajectory is restarted when it ends, or after `reinitiate_counter`
/// samples, or after `reinitiate_counter * H` periods without one.
const MAX_BARREN_RESTARTS: usize = 100;

/// Generates up to `config.n` samples with `policy`, one shard per rank.
///
/// Shards come back in rank order. A configured timeout stops sampling early;
/// whatever was collected by then is returned.
pub fn generate<M: Mdp>(
    mdp: &M,
    policy: &dyn Policy<M>,
    config: &DclConfig,
    generation: usize,
) -> Result<Vec<SampleSet>> {
    let claimed = AtomicUsize::new(0);
    let timed_out = AtomicBool::new(false);
    let deadline = config
        .sampling_time_out
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .and_then(|budget| Instant::now().checked_add(budget));

    let shards = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.num_threads)
            .map(|rank| {
                let worker = Worker {
                    mdp,
                    policy,
                    config,
                    generation,
                    rank,
                    claimed: &claimed,
                    timed_out: &timed_out,
                    deadline,
                };
                scope.spawn(move || worker.run())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    if timed_out.load(Ordering::Relaxed) {
        let collected: usize = shards.iter().map(SampleSet::len).sum();
        warn!(
            generation,
            collected,
            requested = config.n,
            "sampling timed out, continuing with the samples collected so far"
        );
    }
    Ok(shards)
}

struct Worker<'a, M: Mdp> {
    mdp: &'a M,
    policy: &'a dyn Policy<M>,
    config: &'a DclConfig,
    generation: usize,
    rank: usize,
    claimed: &'a AtomicUsize,
    timed_out: &'a AtomicBool,
    deadline: Option<Instant>,
}

impl<M: Mdp> Worker<'_, M> {
    fn expired(&self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.timed_out.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    fn run(self) -> Result<SampleSet> {
        let mut shard = SampleSet::new();
        let mut restarts = 0u64;
        let mut barren_restarts = 0usize;
        let mut since_restart = 0usize;
        let mut trajectory: Option<Trajectory<M::State>> = None;
        // Periods a trajectory may run without yielding a sample.
        let stall_limit = (self.config.reinitiate_counter as u64).saturating_mul(self.config.h);
        let mut last_progress = 0u64;

        while !self.expired() && self.claimed.load(Ordering::Relaxed) < self.config.n {
            let needs_restart = match &trajectory {
                None => true,
                Some(t) => {
                    t.category.is_final()
                        || since_restart >= self.config.reinitiate_counter
                        || t.period_count.saturating_sub(last_progress) >= stall_limit
                }
            };
            if needs_restart {
                if since_restart == 0 && trajectory.is_some() {
                    barren_restarts += 1;
                    if barren_restarts >= MAX_BARREN_RESTARTS {
                        warn!(
                            rank = self.rank,
                            "no decision with a choice reached after {MAX_BARREN_RESTARTS} restarts"
                        );
                        break;
                    }
                } else {
                    barren_restarts = 0;
                }
                let seed = derive_seed(
                    self.config.rng_seed,
                    &[self.generation as u64, self.rank as u64, restarts],
                );
                restarts += 1;
                since_restart = 0;
                let mut fresh = Trajectory::initiate(self.mdp, seed);
                run_periods(self.mdp, self.policy, &mut fresh, self.config.l, &mut ())?;
                last_progress = fresh.period_count;
                trajectory = Some(fresh);
            }
            let Some(current) = trajectory.as_mut() else {
                break;
            };

            advance_to_decision(self.mdp, current, &mut ())?;
            if current.category.is_final() {
                continue;
            }

            let mask = self.mdp.allowed_actions(&current.state)?;
            if mask.iter().filter(|ok| **ok).count() >= 2 {
                if self.claimed.fetch_add(1, Ordering::Relaxed) >= self.config.n {
                    break;
                }
                match self.label(current, mask)? {
                    Some(sample) => {
                        shard.add(sample);
                        since_restart += 1;
                        last_progress = current.period_count;
                    }
                    None => break,
                }
            }

            set_action(self.policy, current)?;
            incorporate_action(self.mdp, current)?;
        }

        debug!(
            generation = self.generation,
            rank = self.rank,
            samples = shard.len(),
            "worker finished"
        );
        Ok(shard)
    }

    /// Values every allowed action; `None` if the deadline passes meanwhile.
    fn label(
        &self,
        trajectory: &mut Trajectory<M::State>,
        mask: Vec<bool>,
    ) -> Result<Option<Sample>> {
        let objective = self.mdp.static_info().objective;
        // Shared by all actions so they face the same demand paths.
        let rollout_base: u64 = trajectory.rng.gen();
        let mut q_values = vec![None; mask.len()];
        let mut best: Option<(usize, f64)> = None;

        for (action, _) in mask.iter().enumerate().filter(|(_, ok)| **ok) {
            if self.expired() {
                return Ok(None);
            }
            let mut total = 0.0;
            for rollout in 0..self.config.m {
                let mut branch = Trajectory::from_state(
                    trajectory.state.clone(),
                    trajectory.category,
                    derive_seed(rollout_base, &[rollout as u64]),
                );
                branch.next_action = Some(action);
                incorporate_action(self.mdp, &mut branch)?;
                run_periods(self.mdp, self.policy, &mut branch, self.config.h, &mut ())?;
                total += branch.cumulative_return;
            }
            let value = total / self.config.m as f64;
            q_values[action] = Some(value);
            if best.map_or(true, |(_, incumbent)| objective.is_better(value, incumbent)) {
                best = Some((action, value));
            }
        }

        let Some((label, _)) = best else {
            return Ok(None);
        };
        let mut features = Vec::with_capacity(self.mdp.num_flat_features());
        self.mdp.get_features(&trajectory.state, &mut features);
        Ok(Some(Sample {
            features,
            mask,
            label,
            q_values,
            state: self.mdp.state_to_value(&trajectory.state)?,
            generation: self.generation,
        }))
    }
}

//! Nearest-neighbour imitation of DCL labels.
//!
//! A dependency-free stand-in for a neural trainer: the policy keeps the
//! standardized features of every sample and lets the `k` closest samples
//! vote on the action.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{NnArchitecture, TrainingConfig};
use super::sample::SampleSet;
use super::trainer::PolicyTrainer;
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;
use crate::policy::{Policy, SharedPolicy};

const POLICY_ID: &str = "nearest_neighbour";

/// Persisted form of a [`NearestNeighbourPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighbourSnapshot {
    pub id: String,
    pub k: usize,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub points: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

/// k-nearest-neighbour vote over labelled samples.
///
/// Only neighbours whose label is allowed in the queried state vote. When
/// none of the `k` neighbours qualifies, the policy defers to its fallback
/// (the warm-start policy, if any) or picks uniformly among allowed actions.
pub struct NearestNeighbourPolicy<M: Mdp> {
    mdp: Arc<M>,
    snapshot: NearestNeighbourSnapshot,
    fallback: Option<SharedPolicy<M>>,
}

impl<M: Mdp> NearestNeighbourPolicy<M> {
    pub fn fit(mdp: Arc<M>, samples: &SampleSet, k: usize) -> Result<Self> {
        if samples.is_empty() {
            return Err(RollplexError::InvalidConfig(
                "nearest_neighbour :: cannot fit an empty sample set".into(),
            ));
        }
        let width = mdp.num_flat_features();
        if let Some(bad) = samples.iter().find(|s| s.features.len() != width) {
            return Err(RollplexError::InvalidConfig(format!(
                "nearest_neighbour :: sample has {} features, model has {width}",
                bad.features.len()
            )));
        }

        let n = samples.len() as f64;
        let mut mean = vec![0.0; width];
        for sample in samples.iter() {
            for (m, x) in mean.iter_mut().zip(&sample.features) {
                *m += x / n;
            }
        }
        let mut scale = vec![0.0; width];
        for sample in samples.iter() {
            for ((s, x), m) in scale.iter_mut().zip(&sample.features).zip(&mean) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in &mut scale {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }

        let points = samples
            .iter()
            .map(|s| standardize(&s.features, &mean, &scale))
            .collect();
        let labels = samples.iter().map(|s| s.label).collect();
        Ok(Self {
            mdp,
            snapshot: NearestNeighbourSnapshot {
                id: POLICY_ID.into(),
                k: k.max(1),
                mean,
                scale,
                points,
                labels,
            },
            fallback: None,
        })
    }

    pub fn from_snapshot(mdp: Arc<M>, snapshot: NearestNeighbourSnapshot) -> Result<Self> {
        let width = mdp.num_flat_features();
        if snapshot.mean.len() != width
            || snapshot.scale.len() != width
            || snapshot.points.len() != snapshot.labels.len()
            || snapshot.points.iter().any(|p| p.len() != width)
        {
            return Err(RollplexError::InvalidConfig(
                "nearest_neighbour :: snapshot does not match the model's feature width".into(),
            ));
        }
        Ok(Self {
            mdp,
            snapshot,
            fallback: None,
        })
    }

    /// Defers to `fallback` where no neighbour's action is allowed.
    pub fn with_fallback(mut self, fallback: SharedPolicy<M>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn vote(&self, query: &[f64], mask: &[bool]) -> Option<usize> {
        let mut order: Vec<(f64, usize)> = self
            .snapshot
            .points
            .iter()
            .zip(&self.snapshot.labels)
            .filter(|(_, label)| mask.get(**label).copied().unwrap_or(false))
            .map(|(point, label)| (squared_distance(point, query), *label))
            .collect();
        order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        order.truncate(self.snapshot.k);

        let mut votes: HashMap<usize, usize> = HashMap::new();
        for (_, label) in &order {
            *votes.entry(*label).or_default() += 1;
        }
        let top = votes.values().copied().max()?;
        // ties go to the label with the closest supporter
        order
            .iter()
            .map(|(_, label)| *label)
            .find(|label| votes.get(label) == Some(&top))
    }
}

fn standardize(features: &[f64], mean: &[f64], scale: &[f64]) -> Vec<f64> {
    features
        .iter()
        .zip(mean)
        .zip(scale)
        .map(|((x, m), s)| (x - m) / s)
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

impl<M: Mdp> Policy<M> for NearestNeighbourPolicy<M> {
    fn get_action(&self, state: &M::State, rng: &mut StdRng) -> Result<usize> {
        let mask = self.mdp.allowed_actions(state)?;
        let mut features = Vec::with_capacity(self.snapshot.mean.len());
        self.mdp.get_features(state, &mut features);
        let query = standardize(&features, &self.snapshot.mean, &self.snapshot.scale);

        if let Some(action) = self.vote(&query, &mask) {
            return Ok(action);
        }
        if let Some(fallback) = &self.fallback {
            return fallback.get_action(state, rng);
        }
        let allowed: Vec<usize> = (0..mask.len()).filter(|&a| mask[a]).collect();
        allowed
            .choose(rng)
            .copied()
            .ok_or_else(|| RollplexError::InvalidPhase {
                policy: POLICY_ID.into(),
                stage: self.mdp.category(state).index(),
            })
    }

    fn name(&self) -> &str {
        POLICY_ID
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(&self.snapshot).unwrap_or(Value::Null)
    }
}

/// Trainer producing [`NearestNeighbourPolicy`] instances.
///
/// Ignores the architecture; reads `neighbours` from the training settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbourTrainer;

impl<M: Mdp> PolicyTrainer<M> for NearestNeighbourTrainer {
    fn train(
        &self,
        mdp: &Arc<M>,
        samples: &SampleSet,
        _architecture: &NnArchitecture,
        training: &TrainingConfig,
        warm_start: Option<&SharedPolicy<M>>,
    ) -> Result<SharedPolicy<M>> {
        let policy = NearestNeighbourPolicy::fit(Arc::clone(mdp), samples, training.neighbours)?;
        let policy: SharedPolicy<M> = match warm_start {
            Some(previous) => Arc::new(policy.with_fallback(Arc::clone(previous))),
            None => Arc::new(policy),
        };
        Ok(policy)
    }

    fn load(&self, mdp: &Arc<M>, snapshot: &Value) -> Result<SharedPolicy<M>> {
        let snapshot: NearestNeighbourSnapshot = serde_json::from_value(snapshot.clone())
            .map_err(|e| RollplexError::InvalidConfig(format!("{POLICY_ID} :: {e}")))?;
        if snapshot.id != POLICY_ID {
            return Err(RollplexError::UnknownPolicy(snapshot.id));
        }
        Ok(Arc::new(NearestNeighbourPolicy::from_snapshot(
            Arc::clone(mdp),
            snapshot,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::algorithms::dcl::Sample;
    use crate::test_support::{CountdownMdp, CountdownState};
    use crate::StateCategory;

    fn sample(level: f64, label: usize) -> Sample {
        Sample {
            features: vec![level],
            mask: vec![true, true],
            label,
            q_values: vec![None, None],
            state: Value::Null,
            generation: 1,
        }
    }

    fn state(level: i64) -> CountdownState {
        CountdownState {
            cat: StateCategory::await_action(0),
            level,
            remaining: 0,
        }
    }

    fn samples() -> SampleSet {
        [
            sample(1.0, 1),
            sample(2.0, 1),
            sample(3.0, 1),
            sample(8.0, 0),
            sample(9.0, 0),
            sample(10.0, 0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn neighbours_vote_by_region() {
        let mdp = Arc::new(CountdownMdp::new(None));
        let policy = NearestNeighbourPolicy::fit(Arc::clone(&mdp), &samples(), 3).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(policy.get_action(&state(2), &mut rng).unwrap(), 1);
        assert_eq!(policy.get_action(&state(9), &mut rng).unwrap(), 0);
    }

    #[test]
    fn empty_sample_set_is_rejected() {
        let mdp = Arc::new(CountdownMdp::new(None));
        assert!(NearestNeighbourPolicy::fit(mdp, &SampleSet::new(), 3).is_err());
    }

    #[test]
    fn snapshot_reloads_identical_policy() {
        let mdp = Arc::new(CountdownMdp::new(None));
        let trainer = NearestNeighbourTrainer;
        let trained = trainer
            .train(
                &mdp,
                &samples(),
                &NnArchitecture::default(),
                &TrainingConfig {
                    neighbours: 3,
                    ..TrainingConfig::default()
                },
                None,
            )
            .unwrap();
        let loaded =
            PolicyTrainer::<CountdownMdp>::load(&trainer, &mdp, &trained.snapshot()).unwrap();
        assert_eq!(loaded.snapshot(), trained.snapshot());
        let mut rng = StdRng::seed_from_u64(4);
        for level in 0..12 {
            assert_eq!(
                loaded.get_action(&state(level), &mut rng).unwrap(),
                trained.get_action(&state(level), &mut rng).unwrap()
            );
        }
    }

    #[test]
    fn foreign_snapshot_is_rejected() {
        let mdp = Arc::new(CountdownMdp::new(None));
        let err = PolicyTrainer::<CountdownMdp>::load(
            &NearestNeighbourTrainer,
            &mdp,
            &serde_json::json!({
                "id": "random", "k": 1, "mean": [0.0], "scale": [1.0],
                "points": [], "labels": []
            }),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RollplexError::UnknownPolicy(id) if id == "random"));
    }
}

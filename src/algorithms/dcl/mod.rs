//! Deep controlled learning (DCL).
//!
//! Generation `g` is trained on decisions sampled along trajectories of
//! generation `g - 1`'s policy, each labelled with the action that performed
//! best in rollouts. Generation 0 is the seed policy (uniformly random unless
//! one is supplied). Every generation's policy is kept in memory and persisted
//! as `<output_dir>/<mdp identifier>/dcl_policy_gen{g}.json`.

pub mod config;
pub mod generator;
pub mod nearest;
pub mod sample;
pub mod trainer;


use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::{Result, RollplexError};
use crate::mdp::{Mdp, PolicyRegistry};
use crate::policy::{RandomPolicy, SharedPolicy};

pub use config::{DclConfig, NnArchitecture, TrainingConfig};
pub use nearest::{NearestNeighbourPolicy, NearestNeighbourTrainer};
pub use sample::{Sample, SampleSet};
pub use trainer::PolicyTrainer;

/// A DCL run over one model.
pub struct Dcl<M: Mdp> {
    mdp: Arc<M>,
    config: DclConfig,
    trainer: Box<dyn PolicyTrainer<M>>,
    policies: Vec<SharedPolicy<M>>,
}

impl<M: Mdp> Dcl<M> {
    /// Creates a run whose generation 0 is `policy_0`, or a random policy.
    pub fn new<T>(
        mdp: Arc<M>,
        policy_0: Option<SharedPolicy<M>>,
        trainer: T,
        config: DclConfig,
    ) -> Result<Self>
    where
        T: PolicyTrainer<M> + 'static,
    {
        config.validate()?;
        let seed_policy = policy_0.unwrap_or_else(|| {
            Arc::new(RandomPolicy::new(Arc::clone(&mdp))) as SharedPolicy<M>
        });
        Ok(Self {
            mdp,
            config,
            trainer: Box::new(trainer),
            policies: vec![seed_policy],
        })
    }

    pub fn config(&self) -> &DclConfig {
        &self.config
    }

    pub fn mdp(&self) -> &Arc<M> {
        &self.mdp
    }

    /// Directory holding this model's artifacts.
    pub fn artifact_dir(&self) -> PathBuf {
        self.config.output_dir.join(self.mdp.identifier())
    }

    pub fn policy_path(&self, generation: usize) -> PathBuf {
        self.artifact_dir()
            .join(format!("dcl_policy_gen{generation}.json"))
    }

    /// Sample shard written by worker `rank` in `generation`.
    pub fn sample_path(&self, generation: usize, rank: usize) -> PathBuf {
        self.artifact_dir()
            .join(format!("gen{generation}_rank{rank}.jsonl"))
    }

    /// Runs generations `1..=num_gens`, each trained on samples of the
    /// previous generation's policy.
    ///
    /// A generation that collects no samples (e.g. after a sampling timeout)
    /// keeps the previous policy.
    #[instrument(skip(self), fields(mdp = %self.mdp.identifier()))]
    pub fn train_policy(&mut self) -> Result<()> {
        self.save_policy(0, &self.policies[0])?;
        let first = self.policies.len();
        for generation in first..first + self.config.num_gens {
            let previous = self.latest();
            info!(generation, policy = previous.name(), "generation started");

            let samples = self.generate_samples(&previous, generation)?;
            let policy = if samples.is_empty() {
                warn!(generation, "no samples collected, keeping the previous policy");
                Arc::clone(&previous)
            } else {
                let warm_start = self.config.retrain_lastgen_only.then_some(&previous);
                self.trainer.train(
                    &self.mdp,
                    &samples,
                    &self.config.nn_architecture,
                    &self.config.nn_training,
                    warm_start,
                )?
            };

            self.save_policy(generation, &policy)?;
            self.policies.push(policy);
            info!(generation, samples = samples.len(), "generation finished");
        }
        Ok(())
    }

    /// Generates one generation's samples with `policy`, writes the per-rank
    /// shards, and returns them merged.
    #[instrument(skip(self, policy), fields(policy = policy.name()))]
    pub fn generate_samples(
        &self,
        policy: &SharedPolicy<M>,
        generation: usize,
    ) -> Result<SampleSet> {
        let shards = generator::generate(
            self.mdp.as_ref(),
            policy.as_ref(),
            &self.config,
            generation,
        )?;
        let mut merged = SampleSet::new();
        for (rank, shard) in shards.into_iter().enumerate() {
            shard.save_jsonl(&self.sample_path(generation, rank))?;
            merged.extend(shard);
        }
        info!(generation, samples = merged.len(), "samples generated");
        Ok(merged)
    }

    /// Policy of `generation`; negative values count from the latest
    /// (`-1` is the latest).
    pub fn get_policy(&self, generation: i64) -> Result<SharedPolicy<M>> {
        let available = self.policies.len();
        let index = if generation < 0 {
            available as i64 + generation
        } else {
            generation
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| self.policies.get(i))
            .cloned()
            .ok_or(RollplexError::Generation {
                requested: generation,
                available,
            })
    }

    /// Every generation's policy, generation 0 first.
    pub fn get_policies(&self) -> Vec<SharedPolicy<M>> {
        self.policies.clone()
    }

    /// Rebuilds a persisted generation from disk.
    ///
    /// Generation 0 is resolved through the model's policy registry, later
    /// generations through the trainer.
    pub fn load_policy(&self, generation: usize) -> Result<SharedPolicy<M>> {
        let path = self.policy_path(generation);
        let text = fs::read_to_string(&path).map_err(|e| RollplexError::io(&path, e))?;
        let record: Value = serde_json::from_str(&text)?;
        let snapshot = record.get("policy").ok_or_else(|| {
            RollplexError::InvalidConfig(format!("{} has no `policy` entry", path.display()))
        })?;
        if generation == 0 {
            PolicyRegistry::for_mdp(self.mdp.as_ref()).get_policy(&self.mdp, snapshot)
        } else {
            self.trainer.load(&self.mdp, snapshot)
        }
    }

    fn latest(&self) -> SharedPolicy<M> {
        // `new` seeds generation 0, so the list is never empty.
        Arc::clone(&self.policies[self.policies.len() - 1])
    }

    fn save_policy(&self, generation: usize, policy: &SharedPolicy<M>) -> Result<()> {
        let dir = self.artifact_dir();
        fs::create_dir_all(&dir).map_err(|e| RollplexError::io(&dir, e))?;
        let record = json!({
            "generation": generation,
            "mdp": self.mdp.identifier(),
            "policy": policy.snapshot(),
        });
        let path = self.policy_path(generation);
        fs::write(&path, serde_json::to_string_pretty(&record)?)
            .map_err(|e| RollplexError::io(&path, e))
    }
}

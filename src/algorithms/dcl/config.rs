//! Configuration of a DCL run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RollplexError};

/// Hidden-layer layout handed to the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NnArchitecture {
    /// Widths of the hidden layers, input to output.
    pub hidden_layers: Vec<usize>,
}

impl Default for NnArchitecture {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 64],
        }
    }
}

/// Supervised training hyperparameters handed to the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Learning rate of the optimizer.
    pub lr: f64,
    /// Passes over the sample set.
    pub n_epochs: u32,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Fraction of samples held out for validation.
    pub validation_fraction: f64,
    /// Neighbours consulted by the nearest-neighbour trainer.
    pub neighbours: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            n_epochs: 20,
            batch_size: 64,
            validation_fraction: 0.1,
            neighbours: 5,
        }
    }
}

/// DCL settings.
///
/// Field names follow the external JSON documents, so the sample counts are
/// spelled `N`, `M`, `H` and `L` there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DclConfig {
    /// Samples to collect per generation.
    #[serde(rename = "N")]
    pub n: usize,
    /// Exogenous rollouts per candidate action.
    #[serde(rename = "M")]
    pub m: usize,
    /// Periods per rollout.
    #[serde(rename = "H")]
    pub h: u64,
    /// Warm-up periods discarded before sampling starts.
    #[serde(rename = "L")]
    pub l: u64,
    pub num_gens: usize,
    pub num_threads: usize,
    pub rng_seed: u64,
    /// Wall-clock budget for one generation's sampling, in seconds.
    pub sampling_time_out: Option<f64>,
    /// Samples a worker collects before restarting from the initial state.
    pub reinitiate_counter: usize,
    /// Train each generation only on its own samples, warm-starting from the
    /// previous policy.
    pub retrain_lastgen_only: bool,
    pub nn_architecture: NnArchitecture,
    pub nn_training: TrainingConfig,
    /// Root directory of persisted policies and sample shards.
    pub output_dir: PathBuf,
}

impl Default for DclConfig {
    fn default() -> Self {
        Self {
            n: 5000,
            m: 1000,
            h: 40,
            l: 100,
            num_gens: 1,
            num_threads: 1,
            rng_seed: 11_112_014,
            sampling_time_out: None,
            reinitiate_counter: 200,
            retrain_lastgen_only: false,
            nn_architecture: NnArchitecture::default(),
            nn_training: TrainingConfig::default(),
            output_dir: PathBuf::from("dcl_output"),
        }
    }
}

impl DclConfig {
    /// Parses a DCL record; missing keys take their defaults.
    pub fn from_value(value: &Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|e| RollplexError::InvalidConfig(format!("dcl :: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RollplexError::InvalidConfig(format!("dcl :: {msg}")));
        if self.m == 0 {
            return invalid("M must be at least 1");
        }
        if self.h == 0 {
            return invalid("H must be at least 1");
        }
        if self.num_threads == 0 {
            return invalid("num_threads must be at least 1");
        }
        if self.reinitiate_counter == 0 {
            return invalid("reinitiate_counter must be at least 1");
        }
        if matches!(self.sampling_time_out, Some(t) if t < 0.0 || t.is_nan()) {
            return invalid("sampling_time_out must be non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_single_letter_keys() {
        let config = DclConfig::from_value(&serde_json::json!({
            "N": 100, "M": 10, "H": 5, "L": 0, "num_gens": 3,
            "nn_architecture": { "hidden_layers": [32] }
        }))
        .unwrap();
        assert_eq!((config.n, config.m, config.h, config.l), (100, 10, 5, 0));
        assert_eq!(config.num_gens, 3);
        assert_eq!(config.nn_architecture.hidden_layers, vec![32]);
        assert_eq!(config.nn_training, TrainingConfig::default());
    }

    #[test]
    fn zero_rollouts_rejected() {
        assert!(matches!(
            DclConfig::from_value(&serde_json::json!({ "M": 0 })),
            Err(RollplexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn default_is_valid() {
        DclConfig::default().validate().unwrap();
    }
}

//! Neural network policy using tch-rs (PyTorch bindings).
//!
//! Provides an MLP classifier over flat state features, trained by masked
//! cross-entropy on DCL labels. This module is only available with the `nn`
//! feature.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, Tensor};
use tracing::info;

use super::dcl::{NnArchitecture, PolicyTrainer, SampleSet, TrainingConfig};
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;
use crate::policy::{Policy, SharedPolicy};

const POLICY_ID: &str = "neural_mlp";

/// MLP that outputs log-probabilities over the action list.
///
/// Architecture: `input_dim → hidden_layers… → action_dim` with ReLU
/// activations; disallowed actions are masked out before the softmax.
pub struct ActorNetwork {
    vs: nn::VarStore,
    net: nn::Sequential,
    input_dim: usize,
    hidden_layers: Vec<usize>,
    action_dim: usize,
}

impl ActorNetwork {
    /// Creates a new, randomly initialized network.
    pub fn new(
        input_dim: usize,
        hidden_layers: &[usize],
        action_dim: usize,
        device: Device,
    ) -> Self {
        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let mut net = nn::seq();
        let mut width = input_dim as i64;
        for (i, &hidden) in hidden_layers.iter().enumerate() {
            net = net
                .add(nn::linear(
                    p / format!("l{}", i + 1),
                    width,
                    hidden as i64,
                    Default::default(),
                ))
                .add_fn(|x| x.relu());
            width = hidden as i64;
        }
        net = net.add(nn::linear(
            p / format!("l{}", hidden_layers.len() + 1),
            width,
            action_dim as i64,
            Default::default(),
        ));

        Self {
            vs,
            net,
            input_dim,
            hidden_layers: hidden_layers.to_vec(),
            action_dim,
        }
    }

    /// Forward pass: log-probabilities with disallowed actions at `-inf`.
    pub fn forward_masked(&self, features: &Tensor, mask: &Tensor) -> Tensor {
        self.net
            .forward(features)
            .masked_fill(&mask.logical_not(), f64::NEG_INFINITY)
            .log_softmax(-1, Kind::Float)
    }

    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn to_snapshot(&self) -> Result<NetworkSnapshot> {
        let mut weights = BTreeMap::new();
        for (name, tensor) in self.vs.variables() {
            let values = Vec::<f64>::try_from(tensor.flatten(0, -1).to_kind(Kind::Double))
                .map_err(|e| RollplexError::InvalidConfig(format!("{POLICY_ID} :: {e}")))?;
            weights.insert(
                name,
                WeightSnapshot {
                    shape: tensor.size(),
                    values,
                },
            );
        }
        Ok(NetworkSnapshot {
            id: POLICY_ID.into(),
            input_dim: self.input_dim,
            hidden_layers: self.hidden_layers.clone(),
            action_dim: self.action_dim,
            weights,
        })
    }

    fn from_snapshot(snapshot: &NetworkSnapshot, device: Device) -> Result<Self> {
        let network = Self::new(
            snapshot.input_dim,
            &snapshot.hidden_layers,
            snapshot.action_dim,
            device,
        );
        tch::no_grad(|| -> Result<()> {
            for (name, mut var) in network.vs.variables() {
                let weight = snapshot.weights.get(&name).ok_or_else(|| {
                    RollplexError::InvalidConfig(format!("{POLICY_ID} :: missing weights `{name}`"))
                })?;
                let source = Tensor::from_slice(&weight.values)
                    .reshape(weight.shape.as_slice())
                    .to_kind(Kind::Float)
                    .to_device(device);
                var.copy_(&source);
            }
            Ok(())
        })?;
        Ok(network)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightSnapshot {
    shape: Vec<i64>,
    values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkSnapshot {
    id: String,
    input_dim: usize,
    hidden_layers: Vec<usize>,
    action_dim: usize,
    weights: BTreeMap<String, WeightSnapshot>,
}

/// Greedy policy over an [`ActorNetwork`]: the most probable allowed action.
pub struct NeuralPolicy<M: Mdp> {
    mdp: Arc<M>,
    actor: Mutex<ActorNetwork>,
    device: Device,
}

impl<M: Mdp> NeuralPolicy<M> {
    pub fn new(mdp: Arc<M>, actor: ActorNetwork, device: Device) -> Self {
        Self {
            mdp,
            actor: Mutex::new(actor),
            device,
        }
    }
}

impl<M: Mdp> Policy<M> for NeuralPolicy<M> {
    fn get_action(&self, state: &M::State, _rng: &mut StdRng) -> Result<usize> {
        let mask = self.mdp.allowed_actions(state)?;
        if !mask.iter().any(|ok| *ok) {
            return Err(RollplexError::InvalidPhase {
                policy: POLICY_ID.into(),
                stage: self.mdp.category(state).index(),
            });
        }
        let mut features = Vec::new();
        self.mdp.get_features(state, &mut features);
        let features = Tensor::from_slice(&features)
            .to_kind(Kind::Float)
            .unsqueeze(0)
            .to_device(self.device);
        let mask = Tensor::from_slice(&mask).unsqueeze(0).to_device(self.device);

        // inference leaves the weights untouched, so a poisoned lock is still usable
        let actor = self
            .actor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let action = tch::no_grad(|| actor.forward_masked(&features, &mask).argmax(-1, false));
        Ok(action.int64_value(&[0]) as usize)
    }

    fn name(&self) -> &str {
        POLICY_ID
    }

    fn snapshot(&self) -> Value {
        let actor = self
            .actor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        actor
            .to_snapshot()
            .and_then(|snapshot| Ok(serde_json::to_value(snapshot)?))
            .unwrap_or(Value::Null)
    }
}

/// Trains [`NeuralPolicy`] instances by supervised imitation of DCL labels.
pub struct MlpTrainer {
    device: Device,
}

impl MlpTrainer {
    pub fn new(device: Device) -> Self {
        Self { device }
    }
}

impl Default for MlpTrainer {
    fn default() -> Self {
        Self::new(Device::cuda_if_available())
    }
}

/// Stacks sample features and masks into `[n, d]` tensors.
fn batch_tensors(samples: &SampleSet, device: Device) -> (Tensor, Tensor, Tensor) {
    let n = samples.len() as i64;
    let features: Vec<f64> = samples
        .iter()
        .flat_map(|s| s.features.iter().copied())
        .collect();
    let masks: Vec<bool> = samples.iter().flat_map(|s| s.mask.iter().copied()).collect();
    let labels: Vec<i64> = samples.iter().map(|s| s.label as i64).collect();
    (
        Tensor::from_slice(&features)
            .reshape([n, -1])
            .to_kind(Kind::Float)
            .to_device(device),
        Tensor::from_slice(&masks).reshape([n, -1]).to_device(device),
        Tensor::from_slice(&labels).to_device(device),
    )
}

impl<M: Mdp> PolicyTrainer<M> for MlpTrainer {
    fn train(
        &self,
        mdp: &Arc<M>,
        samples: &SampleSet,
        architecture: &NnArchitecture,
        training: &TrainingConfig,
        warm_start: Option<&SharedPolicy<M>>,
    ) -> Result<SharedPolicy<M>> {
        if samples.is_empty() {
            return Err(RollplexError::InvalidConfig(format!(
                "{POLICY_ID} :: cannot train on an empty sample set"
            )));
        }
        let input_dim = mdp.num_flat_features();
        let action_dim = mdp.num_valid_actions();

        let warm: Option<NetworkSnapshot> = warm_start
            .map(|policy| policy.snapshot())
            .and_then(|value| serde_json::from_value(value).ok())
            .filter(|s: &NetworkSnapshot| {
                s.id == POLICY_ID
                    && s.input_dim == input_dim
                    && s.action_dim == action_dim
                    && s.hidden_layers == architecture.hidden_layers
            });
        let mut actor = match &warm {
            Some(snapshot) => ActorNetwork::from_snapshot(snapshot, self.device)?,
            None => ActorNetwork::new(
                input_dim,
                &architecture.hidden_layers,
                action_dim,
                self.device,
            ),
        };

        let (features, masks, labels) = batch_tensors(samples, self.device);
        let n = samples.len() as i64;
        let held_out = ((n as f64) * training.validation_fraction).floor() as i64;
        let n_train = (n - held_out).max(1);
        let batch_size = training.batch_size.max(1) as i64;

        let mut opt = nn::Adam::default()
            .build(actor.var_store_mut(), training.lr)
            .map_err(|e| RollplexError::InvalidConfig(format!("{POLICY_ID} :: {e}")))?;

        for epoch in 0..training.n_epochs {
            let order = Tensor::randperm(n_train, (Kind::Int64, self.device));
            let mut epoch_loss = 0.0;
            let mut batches = 0;
            let mut start = 0;
            while start < n_train {
                let len = batch_size.min(n_train - start);
                let idx = order.narrow(0, start, len);
                let log_probs = actor.forward_masked(
                    &features.index_select(0, &idx),
                    &masks.index_select(0, &idx),
                );
                let loss = -log_probs
                    .gather(1, &labels.index_select(0, &idx).unsqueeze(1), false)
                    .mean(Kind::Float);
                opt.zero_grad();
                loss.backward();
                opt.step();
                epoch_loss += loss.double_value(&[]);
                batches += 1;
                start += len;
            }

            if held_out > 0 && (epoch + 1 == training.n_epochs || epoch % 10 == 0) {
                let accuracy = tch::no_grad(|| {
                    let val_features = features.narrow(0, n_train, held_out);
                    let val_masks = masks.narrow(0, n_train, held_out);
                    let predicted = actor
                        .forward_masked(&val_features, &val_masks)
                        .argmax(-1, false);
                    predicted
                        .eq_tensor(&labels.narrow(0, n_train, held_out))
                        .to_kind(Kind::Float)
                        .mean(Kind::Float)
                        .double_value(&[])
                });
                info!(
                    epoch,
                    loss = epoch_loss / batches.max(1) as f64,
                    accuracy,
                    "mlp training"
                );
            }
        }

        Ok(Arc::new(NeuralPolicy::new(Arc::clone(mdp), actor, self.device)))
    }

    fn load(&self, mdp: &Arc<M>, snapshot: &Value) -> Result<SharedPolicy<M>> {
        let snapshot: NetworkSnapshot = serde_json::from_value(snapshot.clone())
            .map_err(|e| RollplexError::InvalidConfig(format!("{POLICY_ID} :: {e}")))?;
        if snapshot.id != POLICY_ID {
            return Err(RollplexError::UnknownPolicy(snapshot.id));
        }
        if snapshot.input_dim != mdp.num_flat_features()
            || snapshot.action_dim != mdp.num_valid_actions()
        {
            return Err(RollplexError::InvalidConfig(format!(
                "{POLICY_ID} :: network dimensions do not match the model"
            )));
        }
        let actor = ActorNetwork::from_snapshot(&snapshot, self.device)?;
        Ok(Arc::new(NeuralPolicy::new(Arc::clone(mdp), actor, self.device)))
    }
}

//! Joint replenishment of several products sharing one container.
//!
//! Each period is a two-stage decision process: pick a product to order
//! (or pass), then pick its quantity, repeated until the policy passes or the
//! container is full. The period then closes with a demand event that
//! receives arriving orders, serves demand (backordering shortages), updates
//! the exponentially smoothed forecasts and charges holding, backorder and
//! ordering costs.

pub mod config;
pub mod kpis;
pub mod policies;
pub mod state;


use std::fmt::Write;
use std::sync::Arc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::category::StateCategory;
use crate::error::{Result, RollplexError};
use crate::mdp::{HorizonType, Mdp, Objective, PolicyRegistry, Registry, StaticInfo};
use crate::policy::SharedPolicy;
use crate::rollout::driver::describe_state;

pub use config::JointReplenishmentConfig;
pub use kpis::ReplenishmentKpis;
pub use policies::{CanOrderPolicy, PeriodicReviewPolicy};
pub use state::{Action, Sku, State};

/// Registry id of this model.
pub const MODEL_ID: &str = "joint_replenishment";

/// z-value of a 90% service level, used for the initial base stock.
const BASE_STOCK_Z: f64 = 1.282;

/// Registers the model under [`MODEL_ID`].
pub fn register(registry: &mut Registry) {
    registry.register_model(
        MODEL_ID,
        "Joint replenishment of products sharing container capacity",
        JointReplenishment::from_value,
    );
}

/// The joint-replenishment MDP.
///
/// The action list is built once at construction: indices
/// `0..nr_products` select a product, the next `max_pallets` indices select
/// quantities `1..=max_pallets`, and the last index is `Pass`.
#[derive(Debug, Clone)]
pub struct JointReplenishment {
    config: JointReplenishmentConfig,
    actions: Vec<Action>,
    demand_sizes: Vec<WeightedIndex<f64>>,
    identifier: String,
}

/// First 64 bits of the SHA-256 of `text`, as hex. Persisted artifacts are
/// addressed by it, so it must not change between toolchains.
fn config_digest(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in &digest[..8] {
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

impl JointReplenishment {
    /// Builds the model, validating every per-product vector.
    ///
    /// # Errors
    ///
    /// [`RollplexError::ConfigMismatch`] when a vector's length differs from
    /// `nr_products`; [`RollplexError::InvalidConfig`] for out-of-range
    /// scalars or demand tables without positive mass.
    pub fn new(config: JointReplenishmentConfig) -> Result<Self> {
        config.validate()?;

        let demand_sizes = config
            .demand_prob
            .iter()
            .enumerate()
            .map(|(product, row)| {
                WeightedIndex::new(row).map_err(|e| {
                    RollplexError::InvalidConfig(format!(
                        "{MODEL_ID} :: demand table of product {product}: {e}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut actions = Vec::with_capacity(config.nr_products + config.max_pallets + 1);
        actions.extend((0..config.nr_products).map(Action::ProductSelection));
        actions.extend((1..=config.max_pallets as u64).map(Action::QuantitySelection));
        actions.push(Action::Pass);

        let identifier = format!(
            "{MODEL_ID}_{}",
            config_digest(&serde_json::to_string(&config)?)
        );

        Ok(Self {
            config,
            actions,
            demand_sizes,
            identifier,
        })
    }

    /// Builds the model from a configuration record.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::new(JointReplenishmentConfig::from_value(value)?)
    }

    pub fn config(&self) -> &JointReplenishmentConfig {
        &self.config
    }

    /// Decodes an action index.
    pub fn action(&self, index: usize) -> Result<Action> {
        self.actions
            .get(index)
            .copied()
            .ok_or(RollplexError::InvalidActionIndex {
                action: index,
                num_actions: self.actions.len(),
            })
    }

    /// Encodes an action; `None` for products or quantities out of range.
    pub fn action_index(&self, action: Action) -> Option<usize> {
        let n = self.config.nr_products;
        match action {
            Action::ProductSelection(product) if product < n => Some(product),
            Action::QuantitySelection(q) if q >= 1 && q <= self.config.max_pallets as u64 => {
                Some(n + q as usize - 1)
            }
            Action::Pass => Some(self.pass_action()),
            _ => None,
        }
    }

    /// Index of the `Pass` action.
    pub fn pass_action(&self) -> usize {
        self.actions.len() - 1
    }

    /// Container volume still free in the current period.
    pub fn remaining_capacity(&self, state: &State) -> f64 {
        self.config.capacity - state.used_capacity
    }

    fn is_finite_horizon(&self) -> bool {
        self.config.horizon_length.is_some()
    }

    fn illegal(&self, state: &State, action: usize) -> RollplexError {
        RollplexError::IllegalAction {
            action,
            state: describe_state(self, state),
        }
    }
}

impl Mdp for JointReplenishment {
    type State = State;
    /// Demand in pallets, one entry per product.
    type Event = Vec<f64>;

    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn discount_factor(&self) -> f64 {
        self.config.discount_factor
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            valid_actions: self.actions.len(),
            horizon_type: if self.is_finite_horizon() {
                HorizonType::Finite
            } else {
                HorizonType::Infinite
            },
            is_non_stationary: self.config.is_non_stationary,
            objective: Objective::Minimize,
        }
    }

    fn num_valid_actions(&self) -> usize {
        self.actions.len()
    }

    fn num_flat_features(&self) -> usize {
        self.config.nr_products * (3 + self.config.lead_time)
            + 1
            + usize::from(self.is_finite_horizon())
    }

    fn initial_state(&self) -> State {
        let skus = (0..self.config.nr_products)
            .map(|i| Sku {
                sku_number: i,
                forecasted_demand: self.config.initial_forecast[i],
                forecast_deviation: self.config.initial_sigma[i],
                inventory_level: (self.config.initial_forecast[i]
                    + BASE_STOCK_Z * self.config.initial_sigma[i])
                    .ceil(),
                order_qty: vec![0; self.config.lead_time],
            })
            .collect();

        State {
            cat: StateCategory::await_action(0),
            skus,
            used_capacity: 0.0,
            remaining_events: self.config.horizon_length.unwrap_or(0),
            period_ordering_costs: 0.0,
            period_backorder_costs: 0.0,
            period_holding_costs: 0.0,
            order_item: 0,
            period_count: 0,
        }
    }

    fn category(&self, state: &State) -> StateCategory {
        state.cat
    }

    fn is_allowed_action(&self, state: &State, action: usize) -> Result<bool> {
        let decoded = self.action(action)?;
        let stage = state.cat.index();
        let remaining = self.remaining_capacity(state);

        Ok(match decoded {
            Action::Pass => stage == Some(0),
            Action::ProductSelection(product) => {
                stage == Some(0)
                    && self.config.volume[product] <= remaining
                    && state.skus[product].placed_this_period() == 0
            }
            // Unlike product selection, the whole quantity must fit, not one
            // pallet; this keeps used capacity within the container.
            Action::QuantitySelection(quantity) => {
                let item = state.order_item;
                stage == Some(1)
                    && item < self.config.nr_products
                    && quantity as f64 * self.config.volume[item] <= remaining
                    && state.skus[item].placed_this_period() == 0
            }
        })
    }

    fn modify_state_with_action(&self, state: &mut State, action: usize) -> Result<f64> {
        if !self.is_allowed_action(state, action)? {
            return Err(self.illegal(state, action));
        }
        let remaining = self.remaining_capacity(state);

        match self.action(action)? {
            Action::Pass => {
                state.cat = StateCategory::await_event();
            }
            Action::ProductSelection(product) => {
                // An infeasible product choice closes the period instead of
                // being rejected.
                if self.config.volume[product] > remaining {
                    state.cat = StateCategory::await_event();
                } else {
                    state.order_item = product;
                    state.cat = StateCategory::await_action(1);
                }
            }
            Action::QuantitySelection(quantity) => {
                let item = state.order_item;
                let last = self.config.lead_time - 1;
                state.skus[item].order_qty[last] = quantity;
                state.used_capacity += quantity as f64 * self.config.volume[item];
                state.cat = StateCategory::await_action(0);
            }
        }
        Ok(0.0)
    }

    fn modify_state_with_event(&self, state: &mut State, event: &Vec<f64>) -> Result<f64> {
        if event.len() != self.config.nr_products {
            return Err(RollplexError::ConfigMismatch {
                model: MODEL_ID.into(),
                field: "event".into(),
                expected: self.config.nr_products,
                actual: event.len(),
            });
        }

        let lead_time = self.config.lead_time as f64;
        let alpha = self.config.smoothing_parameter;
        let last = self.config.lead_time - 1;

        state.period_holding_costs = 0.0;
        state.period_backorder_costs = 0.0;
        state.period_ordering_costs = 0.0;
        let mut ordered = false;

        for (sku, &demand) in state.skus.iter_mut().zip(event) {
            if sku.order_qty[last] > 0 {
                ordered = true;
            }

            sku.inventory_level += sku.order_qty[0] as f64 - demand;
            sku.order_qty.rotate_left(1);
            sku.order_qty[last] = 0;

            // Smooth on a per-period scale, store on a lead-time scale.
            let mean = sku.forecasted_demand / lead_time;
            let deviation = sku.forecast_deviation / lead_time.sqrt();
            let deviation = (alpha * (demand - mean).powi(2)
                + (1.0 - alpha) * deviation * deviation)
                .sqrt();
            let mean = alpha * demand + (1.0 - alpha) * mean;
            sku.forecasted_demand = mean * lead_time;
            sku.forecast_deviation = deviation * lead_time.sqrt();

            if sku.inventory_level >= 0.0 {
                // charged per pallet slot, so partial pallets round up
                state.period_holding_costs += self.config.holding_cost * sku.inventory_level.ceil();
            } else {
                state.period_backorder_costs += self.config.penalty_cost * -sku.inventory_level;
            }
        }

        if ordered {
            state.period_ordering_costs = self.config.order_cost;
        }

        state.used_capacity = 0.0;
        state.period_count += 1;
        state.cat = StateCategory::await_action(0);
        if self.is_finite_horizon() {
            state.remaining_events = state.remaining_events.saturating_sub(1);
            if state.remaining_events == 0 {
                state.cat = StateCategory::final_();
            }
        }

        Ok(state.period_holding_costs + state.period_backorder_costs + state.period_ordering_costs)
    }

    fn get_event(&self, rng: &mut StdRng) -> Result<Vec<f64>> {
        if self.config.is_non_stationary {
            return Err(RollplexError::Unimplemented(format!(
                "{MODEL_ID} :: non-stationary demand"
            )));
        }
        Ok(self
            .config
            .order_rate
            .iter()
            .zip(&self.demand_sizes)
            .map(|(&rate, sizes)| {
                if rng.gen_bool(rate) {
                    (sizes.sample(rng) + 1) as f64
                } else {
                    0.0
                }
            })
            .collect())
    }

    fn get_features(&self, state: &State, features: &mut Vec<f64>) {
        for sku in &state.skus {
            sku.add_to_features(features);
        }
        features.push(state.used_capacity);
        if self.is_finite_horizon() {
            features.push(state.remaining_events as f64);
        }
    }

    fn register_policies(&self, registry: &mut PolicyRegistry<Self>) {
        registry.register(
            "canOrderPolicy",
            "Rule-based can-order policy: order when any product hits its reorder point.",
            |mdp, config| {
                Ok(Arc::new(CanOrderPolicy::from_value(Arc::clone(mdp), config)?)
                    as SharedPolicy<Self>)
            },
        );
        registry.register(
            "periodicReviewPolicy",
            "Rule-based periodic-review policy: order only in review periods.",
            |mdp, config| {
                Ok(Arc::new(PeriodicReviewPolicy::from_value(Arc::clone(mdp), config)?)
                    as SharedPolicy<Self>)
            },
        );
    }
}

//! Rule-based inventory-control policies for the joint-replenishment model.
//!
//! Both policies share the quantity stage (order up to a target level when it
//! fits) and differ only in when ordering is considered at all.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JointReplenishment, State, MODEL_ID};
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;
use crate::policy::Policy;

/// Parameters of [`CanOrderPolicy`], one entry per product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanOrderConfig {
    pub reorder_point: Vec<f64>,
    pub can_order_point: Vec<f64>,
    pub order_up_to_level: Vec<f64>,
}

/// Parameters of [`PeriodicReviewPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicReviewConfig {
    /// Review period in periods; only the first entry is used.
    pub review_period: Vec<u64>,
    pub reorder_point: Vec<f64>,
    pub order_up_to_level: Vec<f64>,
}

fn parse<T: serde::de::DeserializeOwned>(policy: &str, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| RollplexError::InvalidConfig(format!("{MODEL_ID} :: {policy}: {e}")))
}

fn check_len(mdp: &JointReplenishment, field: &str, actual: usize) -> Result<()> {
    let expected = mdp.config().nr_products;
    if actual != expected {
        return Err(RollplexError::ConfigMismatch {
            model: MODEL_ID.into(),
            field: field.into(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Pallets needed to lift `product` to `up_to`, capped at `maxPallets`.
fn desired_quantity(mdp: &JointReplenishment, state: &State, product: usize, up_to: f64) -> u64 {
    let missing = (up_to - state.skus[product].inventory_position()).ceil();
    if missing <= 0.0 {
        0
    } else {
        (missing as u64).min(mdp.config().max_pallets as u64)
    }
}

fn fits(mdp: &JointReplenishment, state: &State, product: usize, quantity: u64) -> bool {
    quantity as f64 * mdp.config().volume[product] <= mdp.remaining_capacity(state)
}

/// Products that are not ordered yet, whose position is at or below
/// `threshold`, and whose order-up-to quantity fits in the container.
///
/// Pass is illegal in quantity selection, so a product is only offered when
/// its second stage can place an order.
fn eligible_products(
    mdp: &JointReplenishment,
    state: &State,
    threshold: &[f64],
    up_to: &[f64],
) -> Vec<usize> {
    (0..mdp.config().nr_products)
        .filter(|&product| {
            let sku = &state.skus[product];
            let quantity = desired_quantity(mdp, state, product, up_to[product]);
            sku.placed_this_period() == 0
                && sku.inventory_position() <= threshold[product]
                && quantity >= 1
                && fits(mdp, state, product, quantity)
        })
        .collect()
}

/// Stage-0 choice: a uniformly random eligible product, or `Pass`.
fn select_product(mdp: &JointReplenishment, candidates: &[usize], rng: &mut StdRng) -> usize {
    candidates
        .choose(rng)
        .copied()
        .unwrap_or_else(|| mdp.pass_action())
}

/// Stage-1 choice: the order-up-to quantity. Stage 0 only offers products
/// whose quantity fits, so the `Pass` fallback is never reached through the
/// driver.
fn select_quantity(mdp: &JointReplenishment, state: &State, up_to: &[f64]) -> usize {
    let item = state.order_item;
    let quantity = desired_quantity(mdp, state, item, up_to[item]);
    if quantity == 0 || !fits(mdp, state, item, quantity) {
        return mdp.pass_action();
    }
    mdp.config().nr_products + quantity as usize - 1
}

/// Can-order policy.
///
/// Ordering is triggered while any product's inventory position is at or
/// below its reorder point. Each triggered decision picks a random product at
/// or below its (looser) can-order point; once no position is at its reorder
/// point any more the period closes.
pub struct CanOrderPolicy {
    mdp: Arc<JointReplenishment>,
    config: CanOrderConfig,
}

impl CanOrderPolicy {
    pub fn new(mdp: Arc<JointReplenishment>, config: CanOrderConfig) -> Result<Self> {
        check_len(&mdp, "reorderPoint", config.reorder_point.len())?;
        check_len(&mdp, "canOrderPoint", config.can_order_point.len())?;
        check_len(&mdp, "orderUpToLevel", config.order_up_to_level.len())?;
        Ok(Self { mdp, config })
    }

    pub fn from_value(mdp: Arc<JointReplenishment>, value: &Value) -> Result<Self> {
        Self::new(mdp, parse("canOrderPolicy", value)?)
    }

    pub fn config(&self) -> &CanOrderConfig {
        &self.config
    }
}

impl Policy<JointReplenishment> for CanOrderPolicy {
    fn get_action(&self, state: &State, rng: &mut StdRng) -> Result<usize> {
        let mdp = self.mdp.as_ref();
        match mdp.category(state).index() {
            Some(0) => {
                let triggered = state
                    .skus
                    .iter()
                    .zip(&self.config.reorder_point)
                    .any(|(sku, &reorder)| sku.inventory_position() <= reorder);
                if !triggered {
                    return Ok(mdp.pass_action());
                }
                let candidates = eligible_products(
                    mdp,
                    state,
                    &self.config.can_order_point,
                    &self.config.order_up_to_level,
                );
                Ok(select_product(mdp, &candidates, rng))
            }
            Some(1) => Ok(select_quantity(mdp, state, &self.config.order_up_to_level)),
            stage => Err(RollplexError::InvalidPhase {
                policy: self.name().to_string(),
                stage,
            }),
        }
    }

    fn name(&self) -> &str {
        "canOrderPolicy"
    }

    fn snapshot(&self) -> Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(Value::Null);
        value["id"] = self.name().into();
        value
    }
}

/// Periodic-review policy: orders only every `reviewPeriod` periods, then
/// joins every product at or below its reorder point.
pub struct PeriodicReviewPolicy {
    mdp: Arc<JointReplenishment>,
    config: PeriodicReviewConfig,
    review_period: u64,
}

impl PeriodicReviewPolicy {
    pub fn new(mdp: Arc<JointReplenishment>, config: PeriodicReviewConfig) -> Result<Self> {
        check_len(&mdp, "reorderPoint", config.reorder_point.len())?;
        check_len(&mdp, "orderUpToLevel", config.order_up_to_level.len())?;
        let review_period = match config.review_period.first() {
            Some(&period) if period > 0 => period,
            _ => {
                return Err(RollplexError::InvalidConfig(format!(
                    "{MODEL_ID} :: periodicReviewPolicy needs a positive reviewPeriod"
                )))
            }
        };
        Ok(Self {
            mdp,
            config,
            review_period,
        })
    }

    pub fn from_value(mdp: Arc<JointReplenishment>, value: &Value) -> Result<Self> {
        Self::new(mdp, parse("periodicReviewPolicy", value)?)
    }

    pub fn config(&self) -> &PeriodicReviewConfig {
        &self.config
    }
}

impl Policy<JointReplenishment> for PeriodicReviewPolicy {
    fn get_action(&self, state: &State, rng: &mut StdRng) -> Result<usize> {
        let mdp = self.mdp.as_ref();
        match mdp.category(state).index() {
            Some(0) => {
                if state.period_count % self.review_period != 0 {
                    return Ok(mdp.pass_action());
                }
                let candidates = eligible_products(
                    mdp,
                    state,
                    &self.config.reorder_point,
                    &self.config.order_up_to_level,
                );
                Ok(select_product(mdp, &candidates, rng))
            }
            Some(1) => Ok(select_quantity(mdp, state, &self.config.order_up_to_level)),
            stage => Err(RollplexError::InvalidPhase {
                policy: self.name().to_string(),
                stage,
            }),
        }
    }

    fn name(&self) -> &str {
        "periodicReviewPolicy"
    }

    fn snapshot(&self) -> Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(Value::Null);
        value["id"] = self.name().into();
        value
    }
}

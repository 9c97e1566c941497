//! Configuration record of the joint-replenishment model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RollplexError};

/// Longest demand-size table accepted per product (order sizes 1..=10).
pub const MAX_DEMAND_SIZES: usize = 10;

/// Joint-replenishment parameters, keyed as in the external JSON documents.
///
/// Demand tables may be given either as `demandProb` (one row per product)
/// or as separate `SKU_0`, `SKU_1`, ... keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointReplenishmentConfig {
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    /// Backorder cost per pallet short per period.
    pub penalty_cost: f64,
    /// Holding cost per (rounded-up) pallet per period.
    pub holding_cost: f64,
    /// Flat cost of a period in which anything was ordered.
    pub order_cost: f64,
    /// Exponential smoothing weight of new demand in the forecast.
    pub smoothing_parameter: f64,
    /// Container volume available per period.
    pub capacity: f64,
    pub nr_products: usize,
    pub lead_time: usize,
    /// Largest quantity selectable in one order.
    pub max_pallets: usize,
    #[serde(default)]
    pub is_non_stationary: bool,
    /// Demand forecast over the lead time, per product.
    pub initial_forecast: Vec<f64>,
    /// Forecast deviation over the lead time, per product.
    pub initial_sigma: Vec<f64>,
    /// Volume of one pallet, per product.
    pub volume: Vec<f64>,
    /// Probability that a product sees an order in a period.
    pub order_rate: Vec<f64>,
    /// Row `i`, column `k`: probability that an occurring order of product
    /// `i` has size `k + 1`.
    #[serde(default)]
    pub demand_prob: Vec<Vec<f64>>,
    /// Number of periods of a finite horizon; absent for infinite horizon.
    #[serde(default)]
    pub horizon_length: Option<u64>,
}

fn default_discount_factor() -> f64 {
    1.0
}

impl JointReplenishmentConfig {
    /// Parses a configuration record.
    ///
    /// # Errors
    ///
    /// [`RollplexError::InvalidConfig`] if a required key is missing or has
    /// the wrong type, including a missing demand table.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut config: Self = serde_json::from_value(value.clone())
            .map_err(|e| RollplexError::InvalidConfig(format!("joint_replenishment :: {e}")))?;
        if config.demand_prob.is_empty() {
            for product in 0..config.nr_products {
                let key = format!("SKU_{product}");
                let row = value.get(&key).ok_or_else(|| {
                    RollplexError::InvalidConfig(format!(
                        "joint_replenishment :: missing demand table `{key}`"
                    ))
                })?;
                let row: Vec<f64> = serde_json::from_value(row.clone()).map_err(|e| {
                    RollplexError::InvalidConfig(format!("joint_replenishment :: {key}: {e}"))
                })?;
                config.demand_prob.push(row);
            }
        }
        Ok(config)
    }

    /// Checks vector lengths against `nr_products` and scalar ranges.
    pub fn validate(&self) -> Result<()> {
        let n = self.nr_products;
        let lengths = [
            ("initialForecast", self.initial_forecast.len()),
            ("initialSigma", self.initial_sigma.len()),
            ("volume", self.volume.len()),
            ("orderRate", self.order_rate.len()),
            ("demandProb", self.demand_prob.len()),
        ];
        for (field, actual) in lengths {
            if actual != n {
                return Err(RollplexError::ConfigMismatch {
                    model: "joint_replenishment".into(),
                    field: field.into(),
                    expected: n,
                    actual,
                });
            }
        }

        let invalid = |msg: String| Err(RollplexError::InvalidConfig(format!("joint_replenishment :: {msg}")));
        if n == 0 {
            return invalid("nrProducts must be positive".into());
        }
        if self.lead_time == 0 {
            return invalid("leadTime must be at least 1".into());
        }
        if self.max_pallets == 0 {
            return invalid("maxPallets must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.smoothing_parameter) {
            return invalid(format!("smoothingParameter {} outside [0, 1]", self.smoothing_parameter));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return invalid(format!("discountFactor {} outside [0, 1]", self.discount_factor));
        }
        if self.capacity < 0.0 {
            return invalid("capacity must be non-negative".into());
        }
        if self.horizon_length == Some(0) {
            return invalid("horizonLength must be at least 1".into());
        }
        for (product, &rate) in self.order_rate.iter().enumerate() {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(format!("orderRate[{product}] = {rate} outside [0, 1]"));
            }
        }
        for (product, &volume) in self.volume.iter().enumerate() {
            if volume <= 0.0 {
                return invalid(format!("volume[{product}] must be positive"));
            }
        }
        for (product, row) in self.demand_prob.iter().enumerate() {
            if row.is_empty() || row.len() > MAX_DEMAND_SIZES {
                return invalid(format!(
                    "demand table of product {product} has {} entries (1..={MAX_DEMAND_SIZES} allowed)",
                    row.len()
                ));
            }
        }
        Ok(())
    }
}

impl Default for JointReplenishmentConfig {
    fn default() -> Self {
        Self {
            discount_factor: 1.0,
            penalty_cost: 19.0,
            holding_cost: 1.0,
            order_cost: 50.0,
            smoothing_parameter: 0.1,
            capacity: 30.0,
            nr_products: 2,
            lead_time: 2,
            max_pallets: 10,
            is_non_stationary: false,
            initial_forecast: vec![4.0, 6.0],
            initial_sigma: vec![2.0, 2.5],
            volume: vec![1.0, 1.5],
            order_rate: vec![0.6, 0.8],
            demand_prob: vec![
                vec![0.5, 0.3, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                vec![0.3, 0.3, 0.2, 0.1, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0],
            ],
            horizon_length: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        JointReplenishmentConfig::default().validate().unwrap();
    }

    #[test]
    fn reads_sku_keyed_demand_tables() {
        let mut value = serde_json::to_value(JointReplenishmentConfig::default()).unwrap();
        let table = value["demandProb"].clone();
        value.as_object_mut().unwrap().remove("demandProb");
        value["SKU_0"] = table[0].clone();
        value["SKU_1"] = table[1].clone();
        let config = JointReplenishmentConfig::from_value(&value).unwrap();
        assert_eq!(config, JointReplenishmentConfig::default());
    }

    #[test]
    fn missing_demand_table_is_invalid() {
        let mut value = serde_json::to_value(JointReplenishmentConfig::default()).unwrap();
        value.as_object_mut().unwrap().remove("demandProb");
        value["SKU_0"] = serde_json::json!([1.0]);
        let err = JointReplenishmentConfig::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("SKU_1"));
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let mut value = serde_json::to_value(JointReplenishmentConfig::default()).unwrap();
        value.as_object_mut().unwrap().remove("capacity");
        assert!(matches!(
            JointReplenishmentConfig::from_value(&value),
            Err(RollplexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn length_mismatch_is_reported() {
        let config = JointReplenishmentConfig {
            volume: vec![1.0],
            ..JointReplenishmentConfig::default()
        };
        match config.validate() {
            Err(RollplexError::ConfigMismatch {
                field,
                expected,
                actual,
                ..
            }) => {
                assert_eq!(field, "volume");
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_lead_time_is_invalid() {
        let config = JointReplenishmentConfig {
            lead_time: 0,
            ..JointReplenishmentConfig::default()
        };
        assert!(matches!(config.validate(), Err(RollplexError::InvalidConfig(_))));
    }
}

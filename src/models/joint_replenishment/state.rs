//! State and action types of the joint-replenishment model.

use serde::{Deserialize, Serialize};

use crate::category::StateCategory;

/// Per-product stock record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub sku_number: usize,
    /// Demand forecast over the lead time.
    pub forecasted_demand: f64,
    /// Forecast deviation over the lead time.
    pub forecast_deviation: f64,
    /// On-hand inventory; negative values are backorders.
    pub inventory_level: f64,
    /// In-transit quantities by remaining lead time: slot 0 arrives this
    /// period, the last slot holds the order placed this period.
    pub order_qty: Vec<u64>,
}

impl Sku {
    /// On-hand inventory plus everything in transit.
    pub fn inventory_position(&self) -> f64 {
        self.inventory_level + self.order_qty.iter().sum::<u64>() as f64
    }

    /// Quantity ordered in the current period (0 if not ordered yet).
    pub fn placed_this_period(&self) -> u64 {
        self.order_qty.last().copied().unwrap_or(0)
    }

    pub(crate) fn add_to_features(&self, features: &mut Vec<f64>) {
        features.push(self.forecasted_demand);
        features.push(self.forecast_deviation);
        features.push(self.inventory_level);
        features.extend(self.order_qty.iter().map(|&q| q as f64));
    }
}

/// Full state of one joint-replenishment trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub cat: StateCategory,
    #[serde(rename = "SKUs")]
    pub skus: Vec<Sku>,
    /// Container volume already committed this period.
    pub used_capacity: f64,
    /// Events left before `Final` (finite horizon only).
    pub remaining_events: u64,
    pub period_ordering_costs: f64,
    pub period_backorder_costs: f64,
    pub period_holding_costs: f64,
    /// Product chosen in the product-selection stage, awaiting a quantity.
    pub order_item: usize,
    pub period_count: u64,
}

impl State {
    /// Inventory position of every product.
    pub fn inventory_positions(&self) -> Vec<f64> {
        self.skus.iter().map(Sku::inventory_position).collect()
    }
}

/// Decoded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Choose a product to order next.
    ProductSelection(usize),
    /// Order this many pallets of the selected product.
    QuantitySelection(u64),
    /// Stop ordering for this period.
    Pass,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku() -> Sku {
        Sku {
            sku_number: 0,
            forecasted_demand: 4.0,
            forecast_deviation: 1.0,
            inventory_level: -2.0,
            order_qty: vec![3, 0, 5],
        }
    }

    #[test]
    fn inventory_position_includes_pipeline() {
        assert_eq!(sku().inventory_position(), 6.0);
    }

    #[test]
    fn placed_this_period_reads_last_slot() {
        assert_eq!(sku().placed_this_period(), 5);
    }

    #[test]
    fn features_layout() {
        let mut features = Vec::new();
        sku().add_to_features(&mut features);
        assert_eq!(features, vec![4.0, 1.0, -2.0, 3.0, 0.0, 5.0]);
    }
}

//! Replenishment KPIs collected while a policy is being evaluated.

use std::collections::BTreeMap;

use super::{JointReplenishment, State};
use crate::evaluation::KpiTracker;
use crate::rollout::EventObserver;

/// Accumulates service level, container fill rate, ordering periodicity and
/// a per-period cost breakdown over any number of trajectories.
#[derive(Debug, Clone, Default)]
pub struct ReplenishmentKpis {
    periods: u64,
    orders: u64,
    fill_sum: f64,
    total_demand: f64,
    unmet_demand: f64,
    holding: f64,
    backorder: f64,
    ordering: f64,
    /// Per product: inventory level plus the arriving slot, captured before
    /// the event so demand can be recovered afterwards.
    available: Vec<f64>,
}

impl ReplenishmentKpis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of demanded pallets served from stock on hand.
    pub fn service_level(&self) -> f64 {
        if self.total_demand <= 0.0 {
            1.0
        } else {
            1.0 - self.unmet_demand / self.total_demand
        }
    }

    /// Mean fraction of the container used per placed order.
    pub fn fill_rate(&self) -> f64 {
        if self.orders == 0 {
            0.0
        } else {
            self.fill_sum / self.orders as f64
        }
    }

    /// Orders placed per simulated period.
    pub fn periodicity(&self) -> f64 {
        if self.periods == 0 {
            0.0
        } else {
            self.orders as f64 / self.periods as f64
        }
    }

    fn per_period(&self, total: f64) -> f64 {
        if self.periods == 0 {
            0.0
        } else {
            total / self.periods as f64
        }
    }
}

impl EventObserver<JointReplenishment> for ReplenishmentKpis {
    fn before_event(&mut self, mdp: &JointReplenishment, state: &State) {
        if state.skus.iter().any(|sku| sku.placed_this_period() > 0) {
            self.orders += 1;
            let capacity = mdp.config().capacity;
            if capacity > 0.0 {
                self.fill_sum += state.used_capacity / capacity;
            }
        }
        self.available.clear();
        self.available.extend(state.skus.iter().map(|sku| {
            sku.inventory_level + sku.order_qty.first().copied().unwrap_or(0) as f64
        }));
    }

    fn after_event(&mut self, _mdp: &JointReplenishment, state: &State, _reward: f64) {
        self.periods += 1;
        for (sku, &available) in state.skus.iter().zip(&self.available) {
            let demand = available - sku.inventory_level;
            self.total_demand += demand;
            self.unmet_demand += (demand - available.max(0.0)).max(0.0);
        }
        self.holding += state.period_holding_costs;
        self.backorder += state.period_backorder_costs;
        self.ordering += state.period_ordering_costs;
    }
}

impl KpiTracker<JointReplenishment> for ReplenishmentKpis {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn summarize(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("service_level".to_string(), self.service_level()),
            ("fill_rate".to_string(), self.fill_rate()),
            ("periodicity".to_string(), self.periodicity()),
            ("holding_cost".to_string(), self.per_period(self.holding)),
            ("backorder_cost".to_string(), self.per_period(self.backorder)),
            ("ordering_cost".to_string(), self.per_period(self.ordering)),
        ])
    }
}

//! Side-by-side evaluation of policies on common random numbers.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::KpiTracker;
use crate::error::{Result, RollplexError};
use crate::mdp::Mdp;
use crate::policy::{Policy, SharedPolicy};
use crate::rollout::{derive_seed, run_periods, Trajectory};

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparerConfig {
    pub number_of_trajectories: usize,
    /// Periods per trajectory; finite-horizon models may stop earlier.
    pub periods_per_trajectory: u64,
    pub rng_seed: u64,
}

impl Default for ComparerConfig {
    fn default() -> Self {
        Self {
            number_of_trajectories: 100,
            periods_per_trajectory: 1000,
            rng_seed: 13_031,
        }
    }
}

impl ComparerConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| RollplexError::InvalidConfig(format!("comparer :: {e}")))
    }
}

/// Aggregated result of evaluating one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyComparison {
    pub policy: String,
    /// Mean undiscounted reward per period.
    pub mean: f64,
    /// Standard error of `mean` across trajectories.
    pub std_error: f64,
    /// Mean discounted return per trajectory.
    pub mean_discounted: f64,
    pub trajectories: usize,
    pub periods: u64,
    /// Model-specific KPIs from the tracker, empty without one.
    pub kpis: BTreeMap<String, f64>,
}

impl fmt::Display for PolicyComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== {} ({} trajectories x {} periods) ===",
            self.policy, self.trajectories, self.periods
        )?;
        writeln!(
            f,
            "  Mean per period:    {:.4} (+/- {:.4})",
            self.mean, self.std_error
        )?;
        write!(f, "  Mean discounted:    {:.4}", self.mean_discounted)?;
        for (name, value) in &self.kpis {
            write!(f, "\n  {:<20}{:.4}", format!("{name}:"), value)?;
        }
        Ok(())
    }
}

/// Evaluates policies for one model.
///
/// Trajectory `i` uses the same seed for every policy, so differences
/// between policies are not masked by sampling noise.
pub struct PolicyComparer<M: Mdp> {
    mdp: Arc<M>,
    config: ComparerConfig,
}

impl<M: Mdp> PolicyComparer<M> {
    pub fn new(mdp: Arc<M>, config: ComparerConfig) -> Result<Self> {
        if config.number_of_trajectories == 0 || config.periods_per_trajectory == 0 {
            return Err(RollplexError::InvalidConfig(
                "comparer :: number_of_trajectories and periods_per_trajectory must be positive"
                    .into(),
            ));
        }
        Ok(Self { mdp, config })
    }

    pub fn config(&self) -> &ComparerConfig {
        &self.config
    }

    /// Evaluates a single policy without KPIs.
    pub fn assess(&self, policy: &dyn Policy<M>) -> Result<PolicyComparison> {
        self.assess_with_kpis(policy, &mut ())
    }

    /// Evaluates a single policy, feeding every event to `tracker`.
    pub fn assess_with_kpis<K>(
        &self,
        policy: &dyn Policy<M>,
        tracker: &mut K,
    ) -> Result<PolicyComparison>
    where
        K: KpiTracker<M> + ?Sized,
    {
        let n = self.config.number_of_trajectories;
        let mut per_period = Vec::with_capacity(n);
        let mut discounted = 0.0;

        for i in 0..n {
            let seed = derive_seed(self.config.rng_seed, &[i as u64]);
            let mut trajectory = Trajectory::initiate(self.mdp.as_ref(), seed);
            run_periods(
                self.mdp.as_ref(),
                policy,
                &mut trajectory,
                self.config.periods_per_trajectory,
                tracker,
            )?;
            per_period.push(trajectory.total_reward / trajectory.period_count.max(1) as f64);
            discounted += trajectory.cumulative_return;
        }

        let (mean, std_error) = mean_and_std_error(&per_period);
        let comparison = PolicyComparison {
            policy: policy.name().to_string(),
            mean,
            std_error,
            mean_discounted: discounted / n as f64,
            trajectories: n,
            periods: self.config.periods_per_trajectory,
            kpis: tracker.summarize(),
        };
        info!(
            policy = %comparison.policy,
            mean = comparison.mean,
            std_error = comparison.std_error,
            "policy evaluated"
        );
        Ok(comparison)
    }

    /// Evaluates each policy in turn.
    pub fn compare(&self, policies: &[SharedPolicy<M>]) -> Result<Vec<PolicyComparison>> {
        policies.iter().map(|policy| self.assess(policy.as_ref())).collect()
    }

    /// Evaluates each policy in turn, resetting `tracker` before each one.
    pub fn compare_with_kpis<K>(
        &self,
        policies: &[SharedPolicy<M>],
        tracker: &mut K,
    ) -> Result<Vec<PolicyComparison>>
    where
        K: KpiTracker<M> + ?Sized,
    {
        policies
            .iter()
            .map(|policy| {
                tracker.reset();
                self.assess_with_kpis(policy.as_ref(), tracker)
            })
            .collect()
    }
}

fn mean_and_std_error(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, (variance / n).sqrt())
}

/// Writes each record to `<dir>/<policy>_evaluation.json`.
pub fn save_comparisons(dir: &Path, comparisons: &[PolicyComparison]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| RollplexError::io(dir, e))?;
    comparisons
        .iter()
        .map(|comparison| {
            let path = dir.join(format!("{}_evaluation.json", comparison.policy));
            let json = serde_json::to_string_pretty(comparison)?;
            fs::write(&path, json).map_err(|e| RollplexError::io(&path, e))?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::PolicyRegistry;
    use crate::models::joint_replenishment::{
        JointReplenishment, JointReplenishmentConfig, ReplenishmentKpis,
    };
    use crate::policy::RandomPolicy;
    use crate::test_support::CountdownMdp;

    fn small_config() -> ComparerConfig {
        ComparerConfig {
            number_of_trajectories: 4,
            periods_per_trajectory: 50,
            rng_seed: 3,
        }
    }

    #[test]
    fn reports_mean_cost_per_period() {
        let mdp = Arc::new(CountdownMdp::new(None));
        let comparer = PolicyComparer::new(Arc::clone(&mdp), small_config()).unwrap();
        let policy = RandomPolicy::new(Arc::clone(&mdp));
        let comparison = comparer.assess(&policy).unwrap();
        assert_eq!(comparison.policy, "random");
        assert_eq!(comparison.trajectories, 4);
        assert!(comparison.mean >= 1.0);
        assert!(comparison.kpis.is_empty());
    }

    #[test]
    fn rejects_empty_evaluation() {
        let mdp = Arc::new(CountdownMdp::new(None));
        let config = ComparerConfig {
            number_of_trajectories: 0,
            ..small_config()
        };
        assert!(matches!(
            PolicyComparer::new(mdp, config),
            Err(RollplexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn same_seed_gives_same_result() {
        let mdp = Arc::new(JointReplenishment::new(JointReplenishmentConfig::default()).unwrap());
        let comparer = PolicyComparer::new(Arc::clone(&mdp), small_config()).unwrap();
        let policy = RandomPolicy::new(Arc::clone(&mdp));
        let a = comparer.assess(&policy).unwrap();
        let b = comparer.assess(&policy).unwrap();
        assert_eq!(a, b);
        assert!(a.std_error > 0.0);
    }

    #[test]
    fn compares_rule_policies_with_kpis() {
        let mdp = Arc::new(JointReplenishment::new(JointReplenishmentConfig::default()).unwrap());
        let registry = PolicyRegistry::for_mdp(mdp.as_ref());
        let can_order = registry
            .get_policy(
                &mdp,
                &serde_json::json!({
                    "id": "canOrderPolicy",
                    "reorderPoint": [6, 9],
                    "canOrderPoint": [9, 12],
                    "orderUpToLevel": [14, 20]
                }),
            )
            .unwrap();
        let random = registry.get_policy_by_id(&mdp, "random").unwrap();

        let comparer = PolicyComparer::new(Arc::clone(&mdp), small_config()).unwrap();
        let mut kpis = ReplenishmentKpis::new();
        let results = comparer
            .compare_with_kpis(&[can_order, random], &mut kpis)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].policy, "canOrderPolicy");
        for result in &results {
            let service = result.kpis["service_level"];
            assert!((0.0..=1.0).contains(&service));
            assert!(result.kpis.contains_key("fill_rate"));
        }
        assert!(results[0].mean < results[1].mean);
    }

    #[test]
    fn saves_one_file_per_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mdp = Arc::new(CountdownMdp::new(Some(5)));
        let comparer = PolicyComparer::new(Arc::clone(&mdp), small_config()).unwrap();
        let results = comparer
            .compare(&[Arc::new(RandomPolicy::new(Arc::clone(&mdp))) as SharedPolicy<CountdownMdp>])
            .unwrap();
        let paths = save_comparisons(dir.path(), &results).unwrap();
        assert_eq!(paths, vec![dir.path().join("random_evaluation.json")]);
        let back: PolicyComparison =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(back, results[0]);
        assert_eq!(back.periods, 50);
    }

    #[test]
    fn display_lists_kpis() {
        let comparison = PolicyComparison {
            policy: "canOrderPolicy".into(),
            mean: 12.5,
            std_error: 0.25,
            mean_discounted: 1250.0,
            trajectories: 10,
            periods: 100,
            kpis: BTreeMap::from([("fill_rate".to_string(), 0.8)]),
        };
        let text = comparison.to_string();
        assert!(text.contains("canOrderPolicy"));
        assert!(text.contains("fill_rate"));
    }
}

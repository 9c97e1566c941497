//! Trains a DCL policy for joint replenishment and compares it with the
//! rule-based policies.
//!
//! Run with `RUST_LOG=info cargo run --example joint_replenishment`.

use std::sync::Arc;

use rollplex::algorithms::{Dcl, DclConfig, NearestNeighbourTrainer};
use rollplex::evaluation::{save_comparisons, ComparerConfig, PolicyComparer};
use rollplex::mdp::PolicyRegistry;
use rollplex::models::joint_replenishment::{
    JointReplenishment, JointReplenishmentConfig, ReplenishmentKpis,
};
use rollplex::{generate_id, Registry};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> rollplex::Result<()> {
    init_tracing();

    let registry = Registry::with_builtin_models();
    for (id, description) in registry.list_mdps() {
        println!("model {id}: {description}");
    }

    let mut mdp_config = serde_json::to_value(JointReplenishmentConfig::default())?;
    mdp_config["id"] = "joint_replenishment".into();
    let mdp: Arc<JointReplenishment> = registry.get_mdp(&mdp_config)?;

    let output_dir = std::env::temp_dir().join(format!("rollplex-{}", generate_id()));
    let dcl_config = DclConfig::from_value(&json!({
        "N": 2000,
        "M": 50,
        "H": 20,
        "L": 20,
        "num_gens": 2,
        "num_threads": 4,
        "sampling_time_out": 120.0,
        "nn_training": { "neighbours": 7 },
        "output_dir": output_dir,
    }))?;

    let mut dcl = Dcl::new(Arc::clone(&mdp), None, NearestNeighbourTrainer, dcl_config)?;
    dcl.train_policy()?;

    let policies = PolicyRegistry::for_mdp(mdp.as_ref());
    let mut candidates = dcl.get_policies();
    candidates.push(policies.get_policy(
        &mdp,
        &json!({
            "id": "canOrderPolicy",
            "reorderPoint": [5, 8],
            "canOrderPoint": [8, 12],
            "orderUpToLevel": [14, 20]
        }),
    )?);
    candidates.push(policies.get_policy(
        &mdp,
        &json!({
            "id": "periodicReviewPolicy",
            "reviewPeriod": [2],
            "reorderPoint": [7, 11],
            "orderUpToLevel": [14, 20]
        }),
    )?);

    let comparer = PolicyComparer::new(
        Arc::clone(&mdp),
        ComparerConfig {
            number_of_trajectories: 200,
            periods_per_trajectory: 520,
            ..ComparerConfig::default()
        },
    )?;
    let mut kpis = ReplenishmentKpis::new();
    let mut comparisons = comparer.compare_with_kpis(&candidates, &mut kpis)?;
    let generations = dcl.get_policies().len();
    for (generation, comparison) in comparisons.iter_mut().take(generations).enumerate() {
        comparison.policy = format!("dcl_gen{generation}_{}", comparison.policy);
    }
    for comparison in &comparisons {
        println!("{comparison}");
    }

    let written = save_comparisons(&dcl.artifact_dir(), &comparisons)?;
    println!("results written to {}", dcl.artifact_dir().display());
    println!("{} evaluation files", written.len());
    Ok(())
}

//! Explicit, injectable registries for models and policies.
//!
//! A [`Registry`] maps model ids to factories; a [`PolicyRegistry`] maps
//! policy ids to factories for one concrete model type. Both are plain values
//! owned by the caller, so tests can build a registry with exactly the
//! entries they need.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::Mdp;
use crate::error::{Result, RollplexError};
use crate::policy::{RandomPolicy, SharedPolicy};

type MdpFactory = Box<dyn Fn(&Value) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync>;
type PolicyFactory<M> = Box<dyn Fn(&Arc<M>, &Value) -> Result<SharedPolicy<M>> + Send + Sync>;

struct ModelEntry {
    description: String,
    factory: MdpFactory,
}

/// Reads the mandatory `id` field of a configuration record.
fn config_id(config: &Value) -> Result<&str> {
    config
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RollplexError::InvalidConfig("missing string field `id`".into()))
}

/// Model registry: string id → model factory.
#[derive(Default)]
pub struct Registry {
    models: BTreeMap<String, ModelEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every model shipped with this crate.
    pub fn with_builtin_models() -> Self {
        let mut registry = Self::new();
        crate::models::register_builtin(&mut registry);
        registry
    }

    /// Registers a model factory under `id`, replacing any previous entry.
    pub fn register_model<M, F>(&mut self, id: &str, description: &str, factory: F)
    where
        M: Mdp,
        F: Fn(&Value) -> Result<M> + Send + Sync + 'static,
    {
        let factory: MdpFactory = Box::new(move |config| {
            let mdp: Arc<dyn Any + Send + Sync> = Arc::new(factory(config)?);
            Ok(mdp)
        });
        self.models.insert(
            id.to_string(),
            ModelEntry {
                description: description.to_string(),
                factory,
            },
        );
    }

    /// Lists `(id, description)` pairs in id order.
    pub fn list_mdps(&self) -> Vec<(String, String)> {
        self.models
            .iter()
            .map(|(id, entry)| (id.clone(), entry.description.clone()))
            .collect()
    }

    /// Builds the model named by `config["id"]` as concrete type `M`.
    pub fn get_mdp<M: Mdp>(&self, config: &Value) -> Result<Arc<M>> {
        let id = config_id(config)?;
        let entry = self
            .models
            .get(id)
            .ok_or_else(|| RollplexError::UnknownModel(id.to_string()))?;
        (entry.factory)(config)?
            .downcast::<M>()
            .map_err(|_| RollplexError::ModelTypeMismatch(id.to_string()))
    }
}

/// Policy registry for one model type.
pub struct PolicyRegistry<M: Mdp> {
    policies: BTreeMap<String, (String, PolicyFactory<M>)>,
}

impl<M: Mdp> PolicyRegistry<M> {
    /// Creates a registry holding the model-agnostic policies (`random`).
    pub fn new() -> Self {
        let mut registry = Self {
            policies: BTreeMap::new(),
        };
        registry.register(
            "random",
            "Selects uniformly among the currently allowed actions.",
            |mdp, _| Ok(Arc::new(RandomPolicy::new(Arc::clone(mdp))) as SharedPolicy<M>),
        );
        registry
    }

    /// Creates a registry holding the generic policies plus those the model
    /// registers through [`Mdp::register_policies`].
    pub fn for_mdp(mdp: &M) -> Self {
        let mut registry = Self::new();
        mdp.register_policies(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, id: &str, description: &str, factory: F)
    where
        F: Fn(&Arc<M>, &Value) -> Result<SharedPolicy<M>> + Send + Sync + 'static,
    {
        self.policies.insert(
            id.to_string(),
            (description.to_string(), Box::new(factory)),
        );
    }

    /// Lists `(id, description)` pairs in id order.
    pub fn list(&self) -> Vec<(String, String)> {
        self.policies
            .iter()
            .map(|(id, (description, _))| (id.clone(), description.clone()))
            .collect()
    }

    /// Builds the policy named by `config["id"]` for `mdp`.
    pub fn get_policy(&self, mdp: &Arc<M>, config: &Value) -> Result<SharedPolicy<M>> {
        let id = config_id(config)?;
        let (_, factory) = self
            .policies
            .get(id)
            .ok_or_else(|| RollplexError::UnknownPolicy(id.to_string()))?;
        factory(mdp, config)
    }

    /// Builds a parameterless policy by id.
    pub fn get_policy_by_id(&self, mdp: &Arc<M>, id: &str) -> Result<SharedPolicy<M>> {
        self.get_policy(mdp, &serde_json::json!({ "id": id }))
    }
}

impl<M: Mdp> Default for PolicyRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::joint_replenishment::{JointReplenishment, JointReplenishmentConfig};

    fn jr_config_value() -> Value {
        let mut value = serde_json::to_value(JointReplenishmentConfig::default()).unwrap();
        value["id"] = "joint_replenishment".into();
        value
    }

    #[test]
    fn builtin_registry_lists_joint_replenishment() {
        let registry = Registry::with_builtin_models();
        let ids: Vec<_> = registry.list_mdps().into_iter().map(|(id, _)| id).collect();
        assert!(ids.contains(&"joint_replenishment".to_string()));
    }

    #[test]
    fn get_mdp_builds_concrete_model() {
        let registry = Registry::with_builtin_models();
        let mdp: Arc<JointReplenishment> = registry.get_mdp(&jr_config_value()).unwrap();
        assert_eq!(mdp.config().nr_products, 2);
    }

    #[test]
    fn get_mdp_unknown_id() {
        let registry = Registry::new();
        let err = registry
            .get_mdp::<JointReplenishment>(&serde_json::json!({ "id": "lost_sales" }))
            .err()
            .unwrap();
        assert!(matches!(err, RollplexError::UnknownModel(id) if id == "lost_sales"));
    }

    #[test]
    fn get_mdp_requires_id() {
        let registry = Registry::with_builtin_models();
        let err = registry
            .get_mdp::<JointReplenishment>(&serde_json::json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, RollplexError::InvalidConfig(_)));
    }

    #[test]
    fn policy_registry_includes_model_policies() {
        let registry = Registry::with_builtin_models();
        let mdp: Arc<JointReplenishment> = registry.get_mdp(&jr_config_value()).unwrap();
        let policies = PolicyRegistry::for_mdp(mdp.as_ref());
        let ids: Vec<_> = policies.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["canOrderPolicy", "periodicReviewPolicy", "random"]);

        let random = policies.get_policy_by_id(&mdp, "random").unwrap();
        assert_eq!(random.name(), "random");
        assert!(matches!(
            policies.get_policy_by_id(&mdp, "nope").err().unwrap(),
            RollplexError::UnknownPolicy(_)
        ));
    }
}

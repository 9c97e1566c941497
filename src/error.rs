use std::path::PathBuf;

use thiserror::Error;

use crate::category::StateCategory;

/// Errors raised by MDPs, policies, the rollout driver and DCL.
///
/// Every variant except [`RollplexError::Io`] and
/// [`RollplexError::Serialization`] signals misuse or misconfiguration and is
/// meant to abort the current run.
#[derive(Debug, Error)]
pub enum RollplexError {
    #[error("{model} :: {field} has {actual} entries but nrProducts is {expected}")]
    ConfigMismatch {
        model: String,
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("action index {action} is out of range (valid actions: {num_actions})")]
    InvalidActionIndex { action: usize, num_actions: usize },

    #[error("action {action} is not allowed in state {state}")]
    IllegalAction { action: usize, state: String },

    #[error("{policy} cannot act in decision stage {stage:?}")]
    InvalidPhase { policy: String, stage: Option<usize> },

    #[error("expected a state that is {expected}, found {found}")]
    UnexpectedCategory {
        expected: &'static str,
        found: StateCategory,
    },

    #[error("not implemented: {0}")]
    Unimplemented(String),

    #[error("no model registered under id `{0}`")]
    UnknownModel(String),

    #[error("no policy registered under id `{0}`")]
    UnknownPolicy(String),

    #[error("model `{0}` is registered with a different concrete type")]
    ModelTypeMismatch(String),

    #[error("generation {requested} is not available ({available} generations retained)")]
    Generation { requested: i64, available: usize },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RollplexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RollplexError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RollplexError>;

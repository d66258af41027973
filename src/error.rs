use crate::model::AgentId;
use thiserror::Error;

/// Errors produced by a simulation run.
///
/// None of these are retried internally; the caller decides whether to
/// start a new run with different parameters.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration value is out of range. Nothing was executed.
    #[error("invalid {field}: {reason}")]
    Configuration { field: &'static str, reason: String },

    /// No free position was found for a relocating agent.
    #[error("no free position for agent {agent} after {attempts} attempts")]
    PlacementExhausted { agent: AgentId, attempts: usize },

    /// Population size or group counts changed, or the engine was driven out of order.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }
}

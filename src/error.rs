use serde_json::{Value, json};
use thiserror::Error;

use crate::maas::GatewayError;
use crate::selection::{Candidate, SelectionCriteria};
use crate::state_machine::InvalidTransition;

const IDENTIFIER_HINT: &str = "Use either hostname (e.g., 'wekapoc1') or system ID (e.g., 'ht3nrd')";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{message}")]
    Validation { message: String, example: Value },

    #[error("Cannot resolve machine identifiers: {}", unresolved.join(", "))]
    IdentifierResolution {
        unresolved: Vec<String>,
        available_hostnames: Vec<String>,
        available_system_ids: Vec<String>,
    },

    #[error(
        "Requested {requested} machines with tags [{}]{}, but only {available} ready machines available",
        criteria.tags.join(", "),
        criteria.pool.as_deref().map(|p| format!(" in pool '{p}'")).unwrap_or_default()
    )]
    InsufficientResources {
        requested: usize,
        available: usize,
        criteria: SelectionCriteria,
        candidates: Vec<Candidate>,
    },

    #[error("MAAS error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Provisioning job not found: {0}")]
    JobNotFound(String),

    #[error("Machine not found: {0}")]
    MachineNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("cloud-config rendering failed: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl ProvisionError {
    pub fn validation(message: impl Into<String>, example: Value) -> Self {
        ProvisionError::Validation {
            message: message.into(),
            example,
        }
    }

    /// Structured context for API error bodies.
    pub fn details(&self) -> Value {
        match self {
            ProvisionError::Validation { example, .. } => json!({ "example": example }),
            ProvisionError::IdentifierResolution {
                unresolved,
                available_hostnames,
                available_system_ids,
            } => json!({
                "unresolved": unresolved,
                "available_hostnames": available_hostnames,
                "available_system_ids": available_system_ids,
                "hint": IDENTIFIER_HINT,
            }),
            ProvisionError::InsufficientResources {
                requested,
                available,
                criteria,
                candidates,
            } => json!({
                "requested_count": requested,
                "available_count": available,
                "required_tags": criteria.tags,
                "tag_match_mode": criteria.tag_match_mode,
                "pool": criteria.pool.as_deref().unwrap_or("any configured pool"),
                "message": self.to_string(),
                "available_machines": candidates,
            }),
            ProvisionError::JobNotFound(id) => json!({ "job_id": id }),
            ProvisionError::MachineNotFound(id) => json!({ "system_id": id }),
            ProvisionError::Gateway(GatewayError::Api { status, message }) => {
                json!({ "status": status, "message": message })
            }
            other => json!({ "message": other.to_string() }),
        }
    }
}

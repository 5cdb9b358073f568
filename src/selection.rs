//! Turns a provisioning request into an ordered list of target machines.
//!
//! Explicit requests name machines by system id or hostname and resolve
//! all-or-nothing. Auto requests pick the first `count` Ready machines that
//! pass the pool and tag filters, in the order the controller listed them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ProvisionError;
use crate::maas::{Machine, MachineStatus};
use crate::state_machine::TargetMachine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatchMode {
    /// Every requested tag must be present.
    #[default]
    All,
    /// At least one requested tag must be present.
    Any,
}

impl TagMatchMode {
    pub fn matches(self, machine_tags: &[String], wanted: &[String]) -> bool {
        let has = |tag: &String| machine_tags.contains(tag);
        match self {
            TagMatchMode::All => wanted.iter().all(has),
            TagMatchMode::Any => wanted.iter().any(has),
        }
    }
}

impl fmt::Display for TagMatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagMatchMode::All => write!(f, "all"),
            TagMatchMode::Any => write!(f, "any"),
        }
    }
}

/// Body of a provisioning request as clients send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionRequest {
    pub machines: Vec<String>,
    pub distro_series: Option<String>,
    pub user_data: Option<String>,
    pub tags: Vec<String>,
    pub pool: Option<String>,
    pub count: Option<i64>,
    pub auto_select: bool,
    pub tag_match_mode: TagMatchMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSelect {
    pub tags: Vec<String>,
    pub match_mode: TagMatchMode,
    pub pool: Option<String>,
    pub count: usize,
}

/// A validated request; exactly one mode is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRequest {
    Explicit(Vec<String>),
    Auto(AutoSelect),
}

impl ProvisionRequest {
    /// Auto mode is on when asked for, or implied by tags without machines.
    pub fn is_auto(&self) -> bool {
        self.auto_select || (!self.tags.is_empty() && self.machines.is_empty())
    }

    pub fn validate(&self) -> Result<SelectionRequest, ProvisionError> {
        if !self.is_auto() {
            if self.machines.is_empty() {
                return Err(ProvisionError::validation(
                    "machines array is required when not using automatic selection",
                    json!({
                        "machines": ["wekapoc1", "wekapoc2", "wekapoc3"],
                        "distro_series": "jammy",
                        "note": "Use hostnames or system IDs",
                    }),
                ));
            }
            return Ok(SelectionRequest::Explicit(self.machines.clone()));
        }

        let example = json!({
            "auto_select": true,
            "tags": ["testing-fe"],
            "count": 2,
            "distro_series": "jammy",
        });
        if !self.machines.is_empty() {
            return Err(ProvisionError::validation(
                "auto_select cannot be combined with an explicit machines array",
                example,
            ));
        }
        if self.tags.is_empty() {
            return Err(ProvisionError::validation(
                "tags array is required for automatic machine selection",
                example,
            ));
        }
        let count = match self.count {
            Some(c) if c >= 1 => c as usize,
            _ => {
                return Err(ProvisionError::validation(
                    "count is required and must be greater than 0 for automatic machine selection",
                    example,
                ));
            }
        };
        Ok(SelectionRequest::Auto(AutoSelect {
            tags: self.tags.clone(),
            match_mode: self.tag_match_mode,
            pool: self.pool.clone(),
            count,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub tags: Vec<String>,
    pub tag_match_mode: TagMatchMode,
    pub pool: Option<String>,
    pub status: String,
}

/// A Ready machine that satisfied the auto-selection filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub system_id: String,
    pub hostname: String,
    pub tags: Vec<String>,
    pub pool: String,
}

impl From<&Machine> for Candidate {
    fn from(m: &Machine) -> Self {
        Self {
            system_id: m.system_id.clone(),
            hostname: m.display_name().to_string(),
            tags: m.tag_names.clone(),
            pool: m.pool_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub auto_selected: bool,
    pub requested_count: usize,
    pub available_count: usize,
    pub selected_machines: usize,
    pub selection_criteria: SelectionCriteria,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub targets: Vec<TargetMachine>,
    /// Present for auto selections only.
    pub summary: Option<SelectionSummary>,
}

fn target_of(m: &Machine) -> TargetMachine {
    TargetMachine {
        system_id: m.system_id.clone(),
        hostname: m.display_name().to_string(),
    }
}

/// Maps each token to a system id, trying system ids before hostnames.
///
/// Fails without partial output if any token is unknown.
pub fn resolve_identifiers(
    tokens: &[String],
    machines: &[Machine],
) -> Result<Vec<String>, ProvisionError> {
    let mut resolved = Vec::with_capacity(tokens.len());
    let mut unresolved = Vec::new();
    for token in tokens {
        let by_id = machines.iter().find(|m| &m.system_id == token);
        let found = by_id.or_else(|| {
            machines
                .iter()
                .find(|m| m.hostname.as_deref() == Some(token.as_str()))
        });
        match found {
            Some(m) => resolved.push(m.system_id.clone()),
            None => unresolved.push(token.clone()),
        }
    }

    if unresolved.is_empty() {
        return Ok(resolved);
    }
    let mut available_hostnames: Vec<String> =
        machines.iter().filter_map(|m| m.hostname.clone()).collect();
    available_hostnames.sort();
    let mut available_system_ids: Vec<String> =
        machines.iter().map(|m| m.system_id.clone()).collect();
    available_system_ids.sort();
    Err(ProvisionError::IdentifierResolution {
        unresolved,
        available_hostnames,
        available_system_ids,
    })
}

/// Resolves `request` against a fleet snapshot.
pub fn select(
    request: &SelectionRequest,
    machines: &[Machine],
    allowed_pools: &[String],
) -> Result<Selection, ProvisionError> {
    match request {
        SelectionRequest::Explicit(tokens) => {
            let ids = resolve_identifiers(tokens, machines)?;
            let mut seen = HashSet::new();
            let targets = ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .filter_map(|id| machines.iter().find(|m| &m.system_id == id))
                .map(target_of)
                .collect();
            Ok(Selection {
                targets,
                summary: None,
            })
        }
        SelectionRequest::Auto(auto) => select_auto(auto, machines, allowed_pools),
    }
}

fn select_auto(
    auto: &AutoSelect,
    machines: &[Machine],
    allowed_pools: &[String],
) -> Result<Selection, ProvisionError> {
    let allowed: HashSet<&str> = allowed_pools.iter().map(String::as_str).collect();
    let ready: Vec<&Machine> = machines
        .iter()
        .filter(|m| allowed.contains(m.pool_name()))
        .filter(|m| auto.pool.as_deref().is_none_or(|p| m.pool_name() == p))
        .filter(|m| auto.match_mode.matches(&m.tag_names, &auto.tags))
        .filter(|m| m.status() == MachineStatus::Ready)
        .collect();

    let criteria = SelectionCriteria {
        tags: auto.tags.clone(),
        tag_match_mode: auto.match_mode,
        pool: auto.pool.clone(),
        status: MachineStatus::Ready.to_string(),
    };
    tracing::info!(
        tags = %auto.tags.join(","),
        mode = %auto.match_mode,
        ready = ready.len(),
        requested = auto.count,
        "auto-selection candidates"
    );

    if ready.len() < auto.count {
        return Err(ProvisionError::InsufficientResources {
            requested: auto.count,
            available: ready.len(),
            criteria,
            candidates: ready.iter().map(|m| Candidate::from(*m)).collect(),
        });
    }

    let targets: Vec<TargetMachine> = ready.iter().take(auto.count).map(|m| target_of(m)).collect();
    Ok(Selection {
        summary: Some(SelectionSummary {
            auto_selected: true,
            requested_count: auto.count,
            available_count: ready.len(),
            selected_machines: targets.len(),
            selection_criteria: criteria,
        }),
        targets,
    })
}

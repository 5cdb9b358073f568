use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobStatus;
use crate::cloud_init::OsFamily;
use crate::selection::{SelectionSummary, TagMatchMode};

/// Deployment parameters fixed when the job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub distro_series: String,
    pub user_data: Option<String>,
    pub tags: Vec<String>,
    pub pool: Option<String>,
    pub count: Option<usize>,
    pub auto_select: bool,
    pub tag_match_mode: TagMatchMode,
}

/// A machine the job will attempt, in deployment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMachine {
    pub system_id: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineOutcome {
    Deployed,
    Skipped,
    Failed,
}

/// What happened to one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineResult {
    pub machine_id: String,
    pub hostname: String,
    #[serde(rename = "status")]
    pub outcome: MachineOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distro_series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_family: Option<OsFamily>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
    /// Raw answer of the fleet controller's deploy call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_response: Option<serde_json::Value>,
}

impl MachineResult {
    fn new(target: &TargetMachine, outcome: MachineOutcome, reason: Option<String>) -> Self {
        Self {
            machine_id: target.system_id.clone(),
            hostname: target.hostname.clone(),
            outcome,
            reason,
            distro_series: None,
            os_family: None,
            deployed_at: None,
            controller_response: None,
        }
    }

    pub fn deployed(
        target: &TargetMachine,
        distro_series: &str,
        os_family: OsFamily,
        response: serde_json::Value,
    ) -> Self {
        Self {
            distro_series: Some(distro_series.to_string()),
            os_family: Some(os_family),
            deployed_at: Some(Utc::now()),
            controller_response: Some(response),
            ..Self::new(target, MachineOutcome::Deployed, None)
        }
    }

    pub fn skipped(target: &TargetMachine, reason: impl Into<String>) -> Self {
        Self::new(target, MachineOutcome::Skipped, Some(reason.into()))
    }

    pub fn failed(target: &TargetMachine, reason: impl Into<String>) -> Self {
        Self::new(target, MachineOutcome::Failed, Some(reason.into()))
    }
}

/// A batch deployment and its per-machine progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningJob {
    pub id: String,
    pub sequence: u64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub config: JobConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionSummary>,
    pub machines: Vec<TargetMachine>,
    pub total_machines: usize,
    pub results: Vec<MachineResult>,
    pub successful_deployments: usize,
    pub failed_deployments: usize,
    pub skipped_machines: usize,
    pub error: Option<String>,
}

impl ProvisioningJob {
    pub fn new(
        id: String,
        sequence: u64,
        config: JobConfig,
        machines: Vec<TargetMachine>,
        selection: Option<SelectionSummary>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            sequence,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            config,
            selection,
            total_machines: machines.len(),
            machines,
            results: Vec::new(),
            successful_deployments: 0,
            failed_deployments: 0,
            skipped_machines: 0,
            error: None,
        }
    }

    /// Appends a result and bumps the matching counter.
    pub fn record(&mut self, result: MachineResult) {
        match result.outcome {
            MachineOutcome::Deployed => self.successful_deployments += 1,
            MachineOutcome::Skipped => self.skipped_machines += 1,
            MachineOutcome::Failed => self.failed_deployments += 1,
        }
        self.results.push(result);
    }

    /// Targets without a result yet. Results are recorded in target order.
    pub fn unprocessed(&self) -> &[TargetMachine] {
        let done = self.results.len().min(self.machines.len());
        &self.machines[done..]
    }

    pub fn processed_count(&self) -> usize {
        self.successful_deployments + self.failed_deployments + self.skipped_machines
    }
}

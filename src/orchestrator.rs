use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::cloud_init::{BatchRendering, Credential, OsFamily, RenderInput, render_batch, render_machine};
use crate::error::ProvisionError;
use crate::maas::{
    BootResource, BootSource, DEFAULT_POOL, DeployRequest, FleetGateway, GatewayError, Machine,
    Pool, Tag,
};
use crate::selection::{self, ProvisionRequest, SelectionSummary};
use crate::state_machine::{
    JobConfig, JobEvent, JobStatus, MachineOutcome, MachineResult, ProvisioningJob, StateMachine,
    TargetMachine, Transition,
};
use crate::store::JobStore;

/// Deployment settings shared by every job.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Pools auto-selection and fleet listings may draw from.
    pub pools: Vec<String>,
    pub default_distro: String,
    /// Bound on every fleet controller call.
    pub call_timeout: Duration,
    pub credential: Option<Credential>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            pools: vec![DEFAULT_POOL.to_string()],
            default_distro: "jammy".to_string(),
            call_timeout: Duration::from_secs(60),
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub machines_to_deploy: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_selection: Option<SelectionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_machines: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobList {
    pub jobs: Vec<Arc<ProvisioningJob>>,
    pub total: usize,
}

/// Accepts provisioning requests and drives each job on its own task.
pub struct Provisioner<G> {
    gateway: Arc<G>,
    store: Arc<JobStore>,
    settings: Arc<ProvisionSettings>,
}

impl<G> Clone for Provisioner<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            store: Arc::clone(&self.store),
            settings: Arc::clone(&self.settings),
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(GatewayError::Timeout(limit.as_secs())))
}

impl<G: FleetGateway + 'static> Provisioner<G> {
    pub fn new(gateway: Arc<G>, settings: ProvisionSettings, max_jobs: usize) -> Self {
        Self {
            gateway,
            store: Arc::new(JobStore::new(max_jobs)),
            settings: Arc::new(settings),
        }
    }

    #[cfg(test)]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Every machine the controller knows, bounded by the call timeout.
    pub async fn fleet_snapshot(&self) -> Result<Vec<Machine>, ProvisionError> {
        Ok(bounded(self.settings.call_timeout, self.gateway.list_machines()).await?)
    }

    /// Machines in the configured pools.
    pub async fn pool_machines(&self) -> Result<Vec<Machine>, ProvisionError> {
        let machines = self.fleet_snapshot().await?;
        let total = machines.len();
        let kept: Vec<Machine> = machines
            .into_iter()
            .filter(|m| self.settings.pools.iter().any(|p| p == m.pool_name()))
            .collect();
        tracing::debug!(kept = kept.len(), total, "filtered machines by configured pools");
        Ok(kept)
    }

    pub async fn tags(&self) -> Result<Vec<Tag>, ProvisionError> {
        Ok(bounded(self.settings.call_timeout, self.gateway.list_tags()).await?)
    }

    pub async fn pools(&self) -> Result<Vec<Pool>, ProvisionError> {
        Ok(bounded(self.settings.call_timeout, self.gateway.list_pools()).await?)
    }

    pub async fn boot_sources(&self) -> Result<Vec<BootSource>, ProvisionError> {
        Ok(bounded(self.settings.call_timeout, self.gateway.list_boot_sources()).await?)
    }

    pub async fn boot_resources(&self) -> Result<Vec<BootResource>, ProvisionError> {
        Ok(bounded(self.settings.call_timeout, self.gateway.list_boot_resources()).await?)
    }

    /// Validates and selects synchronously, then starts the job in the
    /// background. No job exists when this returns an error.
    #[tracing::instrument(skip_all, fields(auto = request.is_auto()))]
    pub async fn submit(&self, request: ProvisionRequest) -> Result<SubmitResponse, ProvisionError> {
        let selection_request = request.validate()?;
        let machines = self.fleet_snapshot().await?;
        let selection = selection::select(&selection_request, &machines, &self.settings.pools)?;

        let config = JobConfig {
            distro_series: request
                .distro_series
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| self.settings.default_distro.clone()),
            user_data: request.user_data.clone().filter(|u| !u.trim().is_empty()),
            tags: request.tags.clone(),
            pool: request.pool.clone(),
            count: request.count.filter(|c| *c > 0).map(|c| c as usize),
            auto_select: request.is_auto(),
            tag_match_mode: request.tag_match_mode,
        };
        let (job_id, sequence) = self.store.next_id();
        let machines_to_deploy = selection.targets.len();
        let selected_ids: Vec<String> = selection
            .targets
            .iter()
            .map(|t| t.system_id.clone())
            .collect();
        let job = ProvisioningJob::new(
            job_id.clone(),
            sequence,
            config,
            selection.targets,
            selection.summary.clone(),
        );
        self.store.insert(job).await;
        tracing::info!(job_id = %job_id, machines = machines_to_deploy, "provisioning job created");

        tokio::spawn(execute(
            Arc::clone(&self.gateway),
            Arc::clone(&self.store),
            Arc::clone(&self.settings),
            job_id.clone(),
        ));

        Ok(SubmitResponse {
            message: format!(
                "Provisioning job started. Use GET /api/provision/{job_id} to track progress."
            ),
            job_id,
            status: JobStatus::Pending,
            machines_to_deploy,
            selected_machines: selection.summary.as_ref().map(|_| selected_ids),
            auto_selection: selection.summary,
        })
    }

    pub async fn job(&self, id: &str) -> Result<Arc<ProvisioningJob>, ProvisionError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| ProvisionError::JobNotFound(id.to_string()))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> JobList {
        let (jobs, total) = self.store.list(status, limit).await;
        JobList { jobs, total }
    }

    pub async fn resolve_identifiers(
        &self,
        identifiers: &[String],
    ) -> Result<Vec<String>, ProvisionError> {
        let machines = self.fleet_snapshot().await?;
        let ids = selection::resolve_identifiers(identifiers, &machines)?;
        tracing::info!(count = ids.len(), "resolved machine identifiers");
        Ok(ids)
    }

    /// Display renderings for the named machines; nothing is deployed.
    pub async fn preview(
        &self,
        identifiers: &[String],
        distro_series: Option<&str>,
        user_data: Option<&str>,
    ) -> Result<BatchRendering, ProvisionError> {
        if identifiers.is_empty() {
            return Err(ProvisionError::validation(
                "machines array is required for a preview",
                json!({ "machines": ["wekapoc1"], "distro_series": "jammy" }),
            ));
        }
        let snapshot = self.fleet_snapshot().await?;
        let ids = selection::resolve_identifiers(identifiers, &snapshot)?;
        let mut seen = HashSet::new();
        let machines: Vec<Machine> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| snapshot.iter().find(|m| &m.system_id == id).cloned())
            .collect();
        let input = RenderInput {
            distro_series: distro_series.unwrap_or(&self.settings.default_distro),
            user_data,
            credential: self.settings.credential.as_ref(),
        };
        Ok(render_batch(&machines, &input, Utc::now())?)
    }

    /// Deploys one machine immediately with its rendered configuration.
    #[tracing::instrument(skip(self, user_data))]
    pub async fn deploy_machine(
        &self,
        system_id: &str,
        distro_series: Option<&str>,
        user_data: Option<&str>,
    ) -> Result<serde_json::Value, ProvisionError> {
        let snapshot = self.fleet_snapshot().await?;
        let machine = snapshot
            .iter()
            .find(|m| m.system_id == system_id)
            .ok_or_else(|| ProvisionError::MachineNotFound(system_id.to_string()))?;
        let distro_series = distro_series.unwrap_or(&self.settings.default_distro);
        let input = RenderInput {
            distro_series,
            user_data,
            credential: self.settings.credential.as_ref(),
        };
        let rendered = render_machine(machine, &input, Utc::now())?;
        let request = DeployRequest {
            distro_series: distro_series.to_string(),
            user_data: Some(rendered.config),
        };
        let response = bounded(
            self.settings.call_timeout,
            self.gateway.deploy(system_id, &request),
        )
        .await?;
        tracing::info!(system_id, "deploy requested");
        Ok(response)
    }
}

async fn execute<G: FleetGateway>(
    gateway: Arc<G>,
    store: Arc<JobStore>,
    settings: Arc<ProvisionSettings>,
    job_id: String,
) {
    if let Err(err) = run_job(gateway.as_ref(), &store, &settings, &job_id).await {
        tracing::error!(job_id = %job_id, error = %err, "job execution stopped");
    }
}

/// Processes every target of a pending job, in order, until it is terminal.
async fn run_job<G: FleetGateway>(
    gateway: &G,
    store: &JobStore,
    settings: &ProvisionSettings,
    job_id: &str,
) -> Result<(), ProvisionError> {
    store
        .update(job_id, |j| StateMachine::next(j, JobEvent::Started))
        .await??;
    let job = store
        .get(job_id)
        .await
        .ok_or_else(|| ProvisionError::JobNotFound(job_id.to_string()))?;
    tracing::info!(job_id, targets = job.total_machines, "job started");

    let snapshot = match bounded(settings.call_timeout, gateway.list_machines()).await {
        Ok(machines) => machines,
        Err(err) => {
            tracing::error!(job_id, error = %err, "could not fetch machines, aborting job");
            let reason = format!("Failed to fetch machines from MAAS: {err}");
            store
                .update(job_id, |j| StateMachine::next(j, JobEvent::Aborted(reason)))
                .await??;
            return Ok(());
        }
    };

    let mut admitted = 0;
    for target in &job.machines {
        let result = match snapshot.iter().find(|m| m.system_id == target.system_id) {
            None => MachineResult::failed(target, "Machine not found"),
            Some(m) if !m.is_ready() => MachineResult::skipped(
                target,
                format!("Machine not in Ready state (current: {})", m.status_name),
            ),
            Some(m) => match post_filter(&job.config, m, admitted) {
                Some(reason) => MachineResult::skipped(target, reason),
                None => {
                    admitted += 1;
                    deploy_target(gateway, settings, &job.config, target, m).await
                }
            },
        };
        match result.outcome {
            MachineOutcome::Failed => tracing::warn!(
                job_id,
                system_id = %target.system_id,
                reason = result.reason.as_deref().unwrap_or_default(),
                "machine failed"
            ),
            outcome => tracing::info!(job_id, system_id = %target.system_id, ?outcome, "machine processed"),
        }
        store.update(job_id, |j| j.record(result)).await?;
    }

    let transition = store
        .update(job_id, |j| StateMachine::next(j, JobEvent::Finished))
        .await??;
    if let Some(job) = store.get(job_id).await {
        let status = match transition {
            Transition::Complete(status) | Transition::Next(status) => status,
        };
        tracing::info!(
            job_id,
            %status,
            successful = job.successful_deployments,
            failed = job.failed_deployments,
            skipped = job.skipped_machines,
            "job finished"
        );
    }
    Ok(())
}

/// Why the job's own filters exclude `machine`, if they do.
fn post_filter(config: &JobConfig, machine: &Machine, admitted: usize) -> Option<String> {
    if !config.tags.is_empty() && !config.tag_match_mode.matches(&machine.tag_names, &config.tags)
    {
        return Some(format!(
            "Filtered out: tags do not match [{}] ({} match)",
            config.tags.join(", "),
            config.tag_match_mode
        ));
    }
    if let Some(pool) = &config.pool {
        if machine.pool_name() != pool {
            return Some(format!("Filtered out: not in pool '{pool}'"));
        }
    }
    if let Some(count) = config.count {
        if admitted >= count {
            return Some(format!("Filtered out: count limit of {count} reached"));
        }
    }
    None
}

async fn deploy_target<G: FleetGateway>(
    gateway: &G,
    settings: &ProvisionSettings,
    config: &JobConfig,
    target: &TargetMachine,
    machine: &Machine,
) -> MachineResult {
    let family = OsFamily::from_distro(&config.distro_series);
    let input = RenderInput {
        distro_series: &config.distro_series,
        user_data: config.user_data.as_deref(),
        credential: settings.credential.as_ref(),
    };
    let rendered = match render_machine(machine, &input, Utc::now()) {
        Ok(rendered) => rendered,
        Err(err) => return MachineResult::failed(target, format!("cloud-config rendering failed: {err}")),
    };
    let request = DeployRequest {
        distro_series: config.distro_series.clone(),
        user_data: Some(rendered.config),
    };
    match bounded(settings.call_timeout, gateway.deploy(&machine.system_id, &request)).await {
        Ok(response) => MachineResult::deployed(target, &config.distro_series, family, response),
        Err(err) => MachineResult::failed(target, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFleet, in_pool, job_config, machine, machine_named, target};

    const SECRET: &str = "pw-s3cr3";

    fn settings() -> ProvisionSettings {
        ProvisionSettings {
            call_timeout: Duration::from_millis(200),
            credential: Some(Credential::new("ops", SECRET)),
            ..Default::default()
        }
    }

    fn provisioner(fleet: MockFleet) -> Provisioner<MockFleet> {
        Provisioner::new(Arc::new(fleet), settings(), 100)
    }

    fn explicit(machines: &[&str]) -> ProvisionRequest {
        ProvisionRequest {
            machines: machines.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn wait_terminal(p: &Provisioner<MockFleet>, id: &str) -> Arc<ProvisioningJob> {
        for _ in 0..500 {
            let job = p.job(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    fn assert_counts_add_up(job: &ProvisioningJob) {
        assert_eq!(job.processed_count(), job.total_machines);
        assert_eq!(job.results.len(), job.total_machines);
    }

    #[tokio::test]
    async fn explicit_job_deploys_every_ready_machine() {
        let fleet = MockFleet::new(vec![
            machine_named("ht3nrd", "wekapoc1", "Ready", &["virtual"]),
            machine_named("k8p2qa", "wekapoc2", "Ready", &[]),
        ]);
        let p = provisioner(fleet);

        let response = p.submit(explicit(&["wekapoc2", "ht3nrd"])).await.unwrap();
        assert_eq!(response.status, JobStatus::Pending);
        assert_eq!(response.machines_to_deploy, 2);
        assert!(response.auto_selection.is_none());
        assert!(response.job_id.starts_with("job-"));

        let job = wait_terminal(&p, &response.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.successful_deployments, 2);
        assert_counts_add_up(&job);
        assert_eq!(p.gateway().deployed_ids(), vec!["k8p2qa", "ht3nrd"]);
        assert_eq!(job.results[0].os_family, Some(OsFamily::Debian));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn machine_named_twice_is_deployed_once() {
        let fleet = MockFleet::new(vec![machine_named("ht3nrd", "host-1", "Ready", &[])]);
        let p = provisioner(fleet);

        let response = p.submit(explicit(&["host-1", "ht3nrd", "host-1"])).await.unwrap();
        assert_eq!(response.machines_to_deploy, 1);

        let job = wait_terminal(&p, &response.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_machines, 1);
        assert_counts_add_up(&job);
        assert_eq!(p.gateway().deployed_ids(), vec!["ht3nrd"]);
    }

    #[tokio::test]
    async fn deploy_carries_rendered_config_with_secret() {
        let p = provisioner(MockFleet::new(vec![machine("aaa", "Ready", &[])]));
        let mut request = explicit(&["aaa"]);
        request.distro_series = Some("rocky9".into());
        let response = p.submit(request).await.unwrap();
        wait_terminal(&p, &response.job_id).await;

        let calls = p.gateway().deploys.lock().unwrap().clone();
        assert_eq!(calls[0].distro_series, "rocky9");
        let user_data = calls[0].user_data.clone().unwrap();
        assert!(user_data.starts_with("#cloud-config"));
        assert!(user_data.contains(SECRET));
    }

    #[tokio::test]
    async fn one_failed_deploy_completes_with_errors() {
        let fleet = MockFleet::new(vec![
            machine("aaa", "Ready", &[]),
            machine("bbb", "Ready", &[]),
        ])
        .failing_deploy("bbb");
        let p = provisioner(fleet);

        let response = p.submit(explicit(&["aaa", "bbb"])).await.unwrap();
        let job = wait_terminal(&p, &response.job_id).await;
        assert_eq!(job.status, JobStatus::CompletedWithErrors);
        assert_eq!(job.successful_deployments, 1);
        assert_eq!(job.failed_deployments, 1);
        assert_counts_add_up(&job);
        assert!(job.results[1].reason.as_deref().unwrap().contains("409"));
    }

    #[tokio::test]
    async fn not_ready_and_vanished_machines() {
        let fleet = MockFleet::new(vec![
            machine("aaa", "Deployed", &[]),
            machine("bbb", "Ready", &[]),
        ]);
        let p = provisioner(fleet);
        let response = p.submit(explicit(&["aaa", "bbb"])).await.unwrap();
        // Resolution saw `bbb`; execution will not.
        p.gateway().set_machines(vec![machine("aaa", "Deployed", &[])]);

        let job = wait_terminal(&p, &response.job_id).await;
        assert_eq!(job.results[0].outcome, MachineOutcome::Skipped);
        assert_eq!(
            job.results[0].reason.as_deref(),
            Some("Machine not in Ready state (current: Deployed)")
        );
        assert_eq!(job.results[1].outcome, MachineOutcome::Failed);
        assert_eq!(job.results[1].reason.as_deref(), Some("Machine not found"));
        assert_eq!(job.status, JobStatus::CompletedWithErrors);
        assert_counts_add_up(&job);
    }

    #[tokio::test]
    async fn explicit_post_filters_skip_machines() {
        let fleet = MockFleet::new(vec![
            machine("aaa", "Ready", &["gpu"]),
            machine("bbb", "Ready", &[]),
            machine("ccc", "Ready", &["gpu"]),
            in_pool(machine("ddd", "Ready", &["gpu"]), "lab"),
        ]);
        let p = provisioner(fleet);
        let request = ProvisionRequest {
            tags: vec!["gpu".into()],
            pool: Some("default".into()),
            count: Some(1),
            ..explicit(&["aaa", "bbb", "ccc", "ddd"])
        };
        let response = p.submit(request).await.unwrap();
        let job = wait_terminal(&p, &response.job_id).await;

        let outcomes: Vec<_> = job.results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                MachineOutcome::Deployed,
                MachineOutcome::Skipped,
                MachineOutcome::Skipped,
                MachineOutcome::Skipped,
            ]
        );
        assert!(job.results[1].reason.as_deref().unwrap().contains("tags"));
        assert!(job.results[2].reason.as_deref().unwrap().contains("count limit"));
        assert!(job.results[3].reason.as_deref().unwrap().contains("pool"));
        assert_eq!(job.status, JobStatus::Completed);
        assert_counts_add_up(&job);
    }

    #[tokio::test]
    async fn auto_selection_reports_summary() {
        let fleet = MockFleet::new(vec![
            machine("aaa", "Ready", &["gpu"]),
            machine("bbb", "Deployed", &["gpu"]),
            machine("ccc", "Ready", &["gpu"]),
            machine("ddd", "Ready", &["gpu"]),
        ]);
        let p = provisioner(fleet);
        let request = ProvisionRequest {
            auto_select: true,
            tags: vec!["gpu".into()],
            count: Some(2),
            ..Default::default()
        };
        let response = p.submit(request).await.unwrap();
        assert_eq!(
            response.selected_machines,
            Some(vec!["aaa".to_string(), "ccc".to_string()])
        );
        let summary = response.auto_selection.unwrap();
        assert_eq!(summary.available_count, 3);

        let job = wait_terminal(&p, &response.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.config.auto_select);
        assert_eq!(job.selection.as_ref().unwrap().selected_machines, 2);
    }

    #[tokio::test]
    async fn rejected_requests_create_no_job() {
        let fleet = MockFleet::new(vec![
            machine_named("aaa", "host-1", "Ready", &["gpu"]),
            machine("bbb", "Ready", &["gpu"]),
        ]);
        let p = provisioner(fleet);

        let err = p.submit(explicit(&["host-1", "unknown-host"])).await.unwrap_err();
        match err {
            ProvisionError::IdentifierResolution { unresolved, .. } => {
                assert_eq!(unresolved, vec!["unknown-host"])
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = p
            .submit(ProvisionRequest {
                auto_select: true,
                tags: vec!["gpu".into()],
                count: Some(3),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InsufficientResources {
                requested: 3,
                available: 2,
                ..
            }
        ));

        let err = p.submit(ProvisionRequest::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));

        assert_eq!(p.list_jobs(None, 50).await.total, 0);
        assert!(p.gateway().deployed_ids().is_empty());
    }

    #[tokio::test]
    async fn unreachable_controller_fails_submission() {
        let p = provisioner(MockFleet::new(Vec::new()).failing_list(503));
        let err = p.submit(explicit(&["aaa"])).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Gateway(GatewayError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn zero_targets_completes_immediately() {
        let store = JobStore::new(10);
        let fleet = MockFleet::new(Vec::new());
        let (id, seq) = store.next_id();
        store
            .insert(ProvisioningJob::new(id.clone(), seq, job_config(), Vec::new(), None))
            .await;

        run_job(&fleet, &store, &settings(), &id).await.unwrap();
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_count(), 0);
    }

    #[tokio::test]
    async fn snapshot_failure_aborts_and_fails_all_targets() {
        let store = JobStore::new(10);
        let fleet = MockFleet::new(Vec::new()).failing_list(500);
        let (id, seq) = store.next_id();
        let targets = vec![target("aaa"), target("bbb")];
        store
            .insert(ProvisioningJob::new(id.clone(), seq, job_config(), targets, None))
            .await;

        run_job(&fleet, &store, &settings(), &id).await.unwrap();
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("Failed to fetch machines"));
        assert_eq!(job.failed_deployments, 2);
        assert_counts_add_up(&job);
    }

    #[tokio::test]
    async fn snapshot_timeout_aborts_job() {
        let store = JobStore::new(10);
        let fleet = MockFleet::new(vec![machine("aaa", "Ready", &[])])
            .slow_list(Duration::from_secs(2));
        let (id, seq) = store.next_id();
        store
            .insert(ProvisioningJob::new(id.clone(), seq, job_config(), vec![target("aaa")], None))
            .await;

        run_job(&fleet, &store, &settings(), &id).await.unwrap();
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("timed out"));
        assert_counts_add_up(&job);
    }

    #[tokio::test]
    async fn deploy_timeout_is_a_machine_failure() {
        let store = JobStore::new(10);
        let fleet = MockFleet::new(vec![machine("aaa", "Ready", &[])])
            .slow_deploy(Duration::from_secs(2));
        let (id, seq) = store.next_id();
        store
            .insert(ProvisioningJob::new(id.clone(), seq, job_config(), vec![target("aaa")], None))
            .await;

        run_job(&fleet, &store, &settings(), &id).await.unwrap();
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::CompletedWithErrors);
        assert!(job.results[0].reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn running_job_cannot_be_started_twice() {
        let store = JobStore::new(10);
        let fleet = MockFleet::new(Vec::new());
        let (id, seq) = store.next_id();
        store
            .insert(ProvisioningJob::new(id.clone(), seq, job_config(), Vec::new(), None))
            .await;
        run_job(&fleet, &store, &settings(), &id).await.unwrap();

        let err = run_job(&fleet, &store, &settings(), &id).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Transition(_)));
    }

    #[tokio::test]
    async fn preview_renders_redacted_batch() {
        let fleet = MockFleet::new(vec![
            machine_named("aaa", "node-a", "Ready", &["virtual"]),
            machine("bbb", "Ready", &[]),
        ]);
        let p = provisioner(fleet);
        let batch = p
            .preview(
                &["node-a".to_string(), "bbb".to_string(), "aaa".to_string()],
                Some("jammy"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(batch.machines.len(), 2);
        assert_eq!(batch.machines[0].hostname, "node-a");
        assert!(!batch.machines[0].display_config.contains(SECRET));
        assert!(!batch.summary.contains(SECRET));
        assert!(p.gateway().deployed_ids().is_empty());

        let err = p.preview(&[], None, None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }

    #[tokio::test]
    async fn single_machine_deploy() {
        let p = provisioner(MockFleet::new(vec![machine("aaa", "Ready", &[])]));
        let response = p.deploy_machine("aaa", None, None).await.unwrap();
        assert_eq!(response["status_name"], "Deploying");
        let calls = p.gateway().deploys.lock().unwrap().clone();
        assert_eq!(calls[0].distro_series, "jammy");

        let err = p.deploy_machine("zzz", None, None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MachineNotFound(_)));
    }

    #[tokio::test]
    async fn pool_machines_uses_configured_pools() {
        let p = provisioner(MockFleet::new(vec![
            machine("aaa", "Ready", &[]),
            in_pool(machine("bbb", "Ready", &[]), "lab"),
        ]));
        let machines = p.pool_machines().await.unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].system_id, "aaa");
    }
}

//! Test fixtures shared across modules: machine builders and an in-memory
//! fleet controller.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::maas::types::PoolRef;
use crate::maas::{
    BootResource, BootSource, DeployRequest, FleetGateway, GatewayError, Machine, Pool, Tag,
};
use crate::selection::TagMatchMode;
use crate::state_machine::{JobConfig, TargetMachine};

/// A machine named `<system_id>-host` in the default pool.
pub fn machine(system_id: &str, status: &str, tags: &[&str]) -> Machine {
    machine_named(system_id, &format!("{system_id}-host"), status, tags)
}

pub fn machine_named(system_id: &str, hostname: &str, status: &str, tags: &[&str]) -> Machine {
    Machine {
        system_id: system_id.to_string(),
        hostname: Some(hostname.to_string()),
        fqdn: Some(format!("{hostname}.maas")),
        status_name: status.to_string(),
        status_message: None,
        deployment_progress: None,
        pool: None,
        tag_names: tags.iter().map(|t| t.to_string()).collect(),
        architecture: Some("amd64/generic".to_string()),
        cpu_count: Some(16),
        memory: Some(65536),
    }
}

pub fn in_pool(mut machine: Machine, pool: &str) -> Machine {
    machine.pool = Some(PoolRef {
        name: pool.to_string(),
    });
    machine
}

/// Records every deploy call it receives.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployCall {
    pub system_id: String,
    pub distro_series: String,
    pub user_data: Option<String>,
}

/// In-memory [`FleetGateway`].
#[derive(Default)]
pub struct MockFleet {
    machines: Mutex<Vec<Machine>>,
    failing_deploys: HashSet<String>,
    list_error: Option<u16>,
    list_delay: Option<Duration>,
    deploy_delay: Option<Duration>,
    pub deploys: Mutex<Vec<DeployCall>>,
}

impl MockFleet {
    pub fn new(machines: Vec<Machine>) -> Self {
        Self {
            machines: Mutex::new(machines),
            ..Self::default()
        }
    }

    /// Deploys of `system_id` answer with HTTP 409.
    pub fn failing_deploy(mut self, system_id: &str) -> Self {
        self.failing_deploys.insert(system_id.to_string());
        self
    }

    /// `list_machines` answers with the given HTTP status.
    pub fn failing_list(mut self, status: u16) -> Self {
        self.list_error = Some(status);
        self
    }

    pub fn slow_list(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn slow_deploy(mut self, delay: Duration) -> Self {
        self.deploy_delay = Some(delay);
        self
    }

    pub fn set_machines(&self, machines: Vec<Machine>) {
        *self.machines.lock().unwrap() = machines;
    }

    pub fn deployed_ids(&self) -> Vec<String> {
        self.deploys
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.system_id.clone())
            .collect()
    }
}

impl FleetGateway for MockFleet {
    async fn list_machines(&self) -> Result<Vec<Machine>, GatewayError> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.list_error {
            return Err(GatewayError::Api {
                status,
                message: "controller unavailable".into(),
            });
        }
        Ok(self.machines.lock().unwrap().clone())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, GatewayError> {
        let machines = self.machines.lock().unwrap().clone();
        let mut names: Vec<String> = machines.into_iter().flat_map(|m| m.tag_names).collect();
        names.sort();
        names.dedup();
        Ok(names
            .into_iter()
            .map(|name| Tag {
                name,
                comment: None,
                definition: None,
            })
            .collect())
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, GatewayError> {
        Ok(vec![Pool {
            id: Some(0),
            name: "default".into(),
            description: Some("Default pool".into()),
        }])
    }

    async fn list_boot_sources(&self) -> Result<Vec<BootSource>, GatewayError> {
        Ok(vec![BootSource {
            id: 1,
            url: "http://images.maas.io/ephemeral-v3/stable/".into(),
            keyring_filename: None,
            created: None,
            updated: None,
        }])
    }

    async fn list_boot_resources(&self) -> Result<Vec<BootResource>, GatewayError> {
        Ok(vec![
            BootResource {
                id: 7,
                name: "ubuntu/jammy".into(),
                architecture: "amd64/ga-22.04".into(),
                kind: Some("Synced".into()),
                subarches: None,
            },
            BootResource {
                id: 9,
                name: "rocky/9".into(),
                architecture: "amd64/generic".into(),
                kind: Some("Uploaded".into()),
                subarches: None,
            },
        ])
    }

    async fn deploy(
        &self,
        system_id: &str,
        request: &DeployRequest,
    ) -> Result<serde_json::Value, GatewayError> {
        if let Some(delay) = self.deploy_delay {
            tokio::time::sleep(delay).await;
        }
        self.deploys.lock().unwrap().push(DeployCall {
            system_id: system_id.to_string(),
            distro_series: request.distro_series.clone(),
            user_data: request.user_data.clone(),
        });
        if self.failing_deploys.contains(system_id) {
            return Err(GatewayError::Api {
                status: 409,
                message: format!("Machine {system_id} cannot be deployed"),
            });
        }
        Ok(serde_json::json!({
            "system_id": system_id,
            "status_name": "Deploying",
        }))
    }
}

pub fn target(system_id: &str) -> TargetMachine {
    TargetMachine {
        system_id: system_id.to_string(),
        hostname: format!("{system_id}-host"),
    }
}

/// Explicit-mode job settings with no post-filters.
pub fn job_config() -> JobConfig {
    JobConfig {
        distro_series: "jammy".into(),
        user_data: None,
        tags: Vec::new(),
        pool: None,
        count: None,
        auto_select: false,
        tag_match_mode: TagMatchMode::All,
    }
}

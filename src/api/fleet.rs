//! Fleet listings and single-machine operations.

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiResult;
use crate::error::ProvisionError;
use crate::maas::{BootResource, BootSource, FleetGateway, Machine, MachineStatus, Pool, Tag};

const RECENT_LIMIT: usize = 20;

/// GET /api/machines
#[tracing::instrument(skip(state))]
pub async fn list_machines<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> ApiResult<Json<Vec<Machine>>> {
    Ok(Json(state.provisioner.pool_machines().await?))
}

/// GET /api/tags
#[tracing::instrument(skip(state))]
pub async fn list_tags<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.provisioner.tags().await?))
}

/// GET /api/pools
#[tracing::instrument(skip(state))]
pub async fn list_pools<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> ApiResult<Json<Vec<Pool>>> {
    Ok(Json(state.provisioner.pools().await?))
}

/// GET /api/boot-sources
#[tracing::instrument(skip(state))]
pub async fn list_boot_sources<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> ApiResult<Json<Vec<BootSource>>> {
    Ok(Json(state.provisioner.boot_sources().await?))
}

/// GET /api/boot-resources
#[tracing::instrument(skip(state))]
pub async fn list_boot_resources<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> ApiResult<Json<Vec<BootResource>>> {
    Ok(Json(state.provisioner.boot_resources().await?))
}

#[derive(Debug, Serialize)]
pub struct MachineStatusView {
    pub system_id: String,
    pub hostname: Option<String>,
    pub status_name: String,
    pub status_message: Option<String>,
    pub deployment_progress: Option<u32>,
    pub last_updated: DateTime<Utc>,
}

/// GET /api/machines/:id/status
#[tracing::instrument(skip(state))]
pub async fn machine_status<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Path(system_id): Path<String>,
) -> ApiResult<Json<MachineStatusView>> {
    let machine = state
        .provisioner
        .fleet_snapshot()
        .await?
        .into_iter()
        .find(|m| m.system_id == system_id)
        .ok_or(ProvisionError::MachineNotFound(system_id))?;
    Ok(Json(MachineStatusView {
        system_id: machine.system_id,
        hostname: machine.hostname,
        status_name: machine.status_name,
        status_message: machine.status_message,
        deployment_progress: machine.deployment_progress,
        last_updated: Utc::now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeployBody {
    pub distro_series: Option<String>,
    pub user_data: Option<String>,
}

/// POST /api/machines/:id/deploy
#[tracing::instrument(skip(state, body))]
pub async fn deploy_machine<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Path(system_id): Path<String>,
    Json(body): Json<DeployBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let response = state
        .provisioner
        .deploy_machine(
            &system_id,
            body.distro_series.as_deref().filter(|d| !d.is_empty()),
            body.user_data.as_deref(),
        )
        .await?;
    Ok(Json(response))
}

/// A machine that is deployed, deploying or failed to deploy.
#[derive(Debug, Serialize)]
pub struct RecentDeployment {
    pub id: String,
    pub machine: String,
    pub system_id: String,
    pub hostname: Option<String>,
    pub status_name: String,
    pub status_message: Option<String>,
    pub pool: String,
    pub source: &'static str,
}

impl From<Machine> for RecentDeployment {
    fn from(m: Machine) -> Self {
        Self {
            id: format!("maas-{}", m.system_id),
            machine: m.display_name().to_string(),
            pool: m.pool_name().to_string(),
            system_id: m.system_id,
            hostname: m.hostname,
            status_name: m.status_name,
            status_message: m.status_message,
            source: "maas",
        }
    }
}

/// GET /api/deployments/recent
#[tracing::instrument(skip(state))]
pub async fn recent_deployments<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> ApiResult<Json<Vec<RecentDeployment>>> {
    let recent: Vec<RecentDeployment> = state
        .provisioner
        .pool_machines()
        .await?
        .into_iter()
        .filter(|m| {
            matches!(
                m.status(),
                MachineStatus::Deployed | MachineStatus::Deploying | MachineStatus::FailedDeployment
            )
        })
        .take(RECENT_LIMIT)
        .map(RecentDeployment::from)
        .collect();
    tracing::info!(count = recent.len(), "collected recent deployments");
    Ok(Json(recent))
}

//! Provisioning job endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use super::error::ApiResult;
use crate::error::ProvisionError;
use crate::maas::FleetGateway;
use crate::orchestrator::{JobList, SubmitResponse};
use crate::selection::ProvisionRequest;
use crate::state_machine::{JobStatus, ProvisioningJob};

const DEFAULT_LIST_LIMIT: usize = 50;

/// POST /api/provision
#[tracing::instrument(skip(state))]
pub async fn create_job<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Json(request): Json<ProvisionRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    Ok(Json(state.provisioner.submit(request).await?))
}

/// GET /api/provision/:job_id
#[tracing::instrument(skip(state))]
pub async fn get_job<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Arc<ProvisioningJob>>> {
    Ok(Json(state.provisioner.job(&job_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/provision
#[tracing::instrument(skip(state))]
pub async fn list_jobs<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<JobList>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<JobStatus>().map_err(|message| {
            ProvisionError::validation(
                message,
                json!({ "status": "completed_with_errors", "limit": DEFAULT_LIST_LIMIT }),
            )
        })?),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.provisioner.list_jobs(status, limit).await))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub system_ids: Vec<String>,
}

/// POST /api/machines/resolve
#[tracing::instrument(skip(state))]
pub async fn resolve<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    if request.identifiers.is_empty() {
        return Err(ProvisionError::validation(
            "identifiers array must not be empty",
            json!({ "identifiers": ["wekapoc1", "ht3nrd"] }),
        )
        .into());
    }
    let system_ids = state.provisioner.resolve_identifiers(&request.identifiers).await?;
    Ok(Json(ResolveResponse { system_ids }))
}

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use super::AppState;
use super::error::ApiResult;
use crate::cloud_init::BatchRendering;
use crate::maas::FleetGateway;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PreviewRequest {
    pub machines: Vec<String>,
    pub distro_series: Option<String>,
    pub user_data: Option<String>,
}

/// POST /api/cloud-init/preview
///
/// Display renderings only: secrets are redacted and nothing is deployed.
#[tracing::instrument(skip(state, request), fields(machines = request.machines.len()))]
pub async fn preview<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<BatchRendering>> {
    let batch = state
        .provisioner
        .preview(
            &request.machines,
            request.distro_series.as_deref().filter(|d| !d.is_empty()),
            request.user_data.as_deref(),
        )
        .await?;
    Ok(Json(batch))
}

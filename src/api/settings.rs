use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;
use crate::config::{ConfigStatus, UserStatus};
use crate::maas::FleetGateway;

/// GET /api/config/status
pub async fn config_status<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> Json<ConfigStatus> {
    Json(state.config.config_status())
}

/// GET /api/user/config
pub async fn user_config<G: FleetGateway + 'static>(
    State(state): State<AppState<G>>,
) -> Json<UserStatus> {
    Json(state.config.user_status())
}

#[derive(Debug, Serialize)]
pub struct Defaults {
    pub default_distro_series: String,
    pub pools: Vec<String>,
    pub call_timeout_secs: u64,
}

/// GET /api/config/defaults
pub async fn defaults<G: FleetGateway + 'static>(State(state): State<AppState<G>>) -> Json<Defaults> {
    Json(Defaults {
        default_distro_series: state.config.default_distro.clone(),
        pools: state.config.pools.clone(),
        call_timeout_secs: state.config.call_timeout().as_secs(),
    })
}

//! HTTP API.
//!
//! - `provision`: job submission, status and listing, identifier resolution
//! - `fleet`: machine, tag, pool and boot image listings, single-machine deploys
//! - `preview`: redacted cloud-config previews
//! - `settings`: configuration echoes

mod error;
mod fleet;
mod preview;
mod provision;
mod settings;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProvisionerConfig;
use crate::maas::FleetGateway;
use crate::orchestrator::Provisioner;

/// Shared state handed to every handler.
pub struct AppState<G> {
    pub provisioner: Provisioner<G>,
    pub config: Arc<ProvisionerConfig>,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            provisioner: self.provisioner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router<G: FleetGateway + 'static>(state: AppState<G>) -> Router {
    Router::new()
        // Provisioning jobs
        .route(
            "/api/provision",
            post(provision::create_job::<G>).get(provision::list_jobs::<G>),
        )
        .route("/api/provision/:job_id", get(provision::get_job::<G>))
        // Fleet
        .route("/api/machines", get(fleet::list_machines::<G>))
        .route("/api/machines/resolve", post(provision::resolve::<G>))
        .route("/api/machines/:id/status", get(fleet::machine_status::<G>))
        .route("/api/machines/:id/deploy", post(fleet::deploy_machine::<G>))
        .route("/api/tags", get(fleet::list_tags::<G>))
        .route("/api/pools", get(fleet::list_pools::<G>))
        .route("/api/boot-sources", get(fleet::list_boot_sources::<G>))
        .route("/api/boot-resources", get(fleet::list_boot_resources::<G>))
        .route("/api/deployments/recent", get(fleet::recent_deployments::<G>))
        // Rendering
        .route("/api/cloud-init/preview", post(preview::preview::<G>))
        // Configuration
        .route("/api/config/status", get(settings::config_status::<G>))
        .route("/api/config/defaults", get(settings::defaults::<G>))
        .route("/api/user/config", get(settings::user_config::<G>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

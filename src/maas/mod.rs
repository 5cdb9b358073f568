pub mod client;
pub mod error;
pub mod types;

use std::future::Future;

pub use client::MaasClient;
pub use error::GatewayError;
pub use types::{
    BootResource, BootSource, DEFAULT_POOL, DeployRequest, Machine, MachineStatus, Pool, Tag,
};

/// Read and deploy operations the provisioner needs from the fleet controller.
///
/// Futures are `Send` so job execution can run on spawned tokio tasks.
pub trait FleetGateway: Send + Sync {
    fn list_machines(&self) -> impl Future<Output = Result<Vec<Machine>, GatewayError>> + Send;

    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>, GatewayError>> + Send;

    fn list_pools(&self) -> impl Future<Output = Result<Vec<Pool>, GatewayError>> + Send;

    /// Image sources the controller syncs from.
    fn list_boot_sources(
        &self,
    ) -> impl Future<Output = Result<Vec<BootSource>, GatewayError>> + Send;

    /// Images available for deployment.
    fn list_boot_resources(
        &self,
    ) -> impl Future<Output = Result<Vec<BootResource>, GatewayError>> + Send;

    fn deploy(
        &self,
        system_id: &str,
        request: &DeployRequest,
    ) -> impl Future<Output = Result<serde_json::Value, GatewayError>> + Send;
}

//! Wire types for the MAAS 2.0 API.
//!
//! Only the fields the provisioner reads are modelled; everything else in the
//! controller's JSON is ignored during deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pool a machine lives in when the controller reports none.
pub const DEFAULT_POOL: &str = "default";

/// A machine as reported by `GET machines/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub system_id: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub fqdn: Option<String>,
    pub status_name: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub deployment_progress: Option<u32>,
    #[serde(default)]
    pub pool: Option<PoolRef>,
    #[serde(default)]
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub cpu_count: Option<u32>,
    /// Memory in MiB.
    #[serde(default)]
    pub memory: Option<u64>,
}

/// Pool reference embedded in a machine record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRef {
    pub name: String,
}

impl Machine {
    /// Hostname, then FQDN, then the system id.
    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .or(self.fqdn.as_deref().filter(|f| !f.is_empty()))
            .unwrap_or(&self.system_id)
    }

    pub fn pool_name(&self) -> &str {
        self.pool.as_ref().map(|p| p.name.as_str()).unwrap_or(DEFAULT_POOL)
    }

    pub fn status(&self) -> MachineStatus {
        MachineStatus::from(self.status_name.as_str())
    }

    /// Idle and eligible for a new deployment.
    pub fn is_ready(&self) -> bool {
        self.status() == MachineStatus::Ready
    }
}

/// Lifecycle status of a machine, parsed from MAAS `status_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineStatus {
    New,
    Commissioning,
    Ready,
    Allocated,
    Deploying,
    Deployed,
    FailedDeployment,
    Other(String),
}

impl From<&str> for MachineStatus {
    fn from(s: &str) -> Self {
        match s {
            "New" => MachineStatus::New,
            "Commissioning" => MachineStatus::Commissioning,
            "Ready" => MachineStatus::Ready,
            "Allocated" => MachineStatus::Allocated,
            "Deploying" => MachineStatus::Deploying,
            "Deployed" => MachineStatus::Deployed,
            "Failed deployment" => MachineStatus::FailedDeployment,
            other => MachineStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::New => write!(f, "New"),
            MachineStatus::Commissioning => write!(f, "Commissioning"),
            MachineStatus::Ready => write!(f, "Ready"),
            MachineStatus::Allocated => write!(f, "Allocated"),
            MachineStatus::Deploying => write!(f, "Deploying"),
            MachineStatus::Deployed => write!(f, "Deployed"),
            MachineStatus::FailedDeployment => write!(f, "Failed deployment"),
            MachineStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An image source the controller syncs from, as reported by `GET boot-sources/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootSource {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub keyring_filename: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

/// An installable image, as reported by `GET boot-resources/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootResource {
    pub id: u64,
    /// `ubuntu/jammy`, `rocky/9` and the like.
    pub name: String,
    pub architecture: String,
    /// Synced, Uploaded or Generated.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subarches: Option<String>,
}

/// Parameters of a `deploy` operation.
#[derive(Debug, Clone, Serialize)]
pub struct DeployRequest {
    pub distro_series: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_deserialize_from_api_format() {
        let json = r#"{
            "system_id": "ht3nrd",
            "hostname": "wekapoc1",
            "fqdn": "wekapoc1.maas",
            "status_name": "Ready",
            "pool": {"name": "lab", "id": 2},
            "tag_names": ["high-cpu", "virtual"],
            "architecture": "amd64/generic",
            "cpu_count": 64,
            "memory": 262144,
            "power_state": "off"
        }"#;
        let m: Machine = serde_json::from_str(json).unwrap();
        assert_eq!(m.system_id, "ht3nrd");
        assert_eq!(m.pool_name(), "lab");
        assert!(m.is_ready());
        assert_eq!(m.tag_names, vec!["high-cpu", "virtual"]);
        assert_eq!(m.memory, Some(262144));
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let m: Machine =
            serde_json::from_str(r#"{"system_id": "abc123", "status_name": "Deployed"}"#)
                .unwrap();
        assert_eq!(m.pool_name(), DEFAULT_POOL);
        assert_eq!(m.display_name(), "abc123");
        assert!(m.tag_names.is_empty());
        assert_eq!(m.status(), MachineStatus::Deployed);
    }

    #[test]
    fn display_name_prefers_hostname_then_fqdn() {
        let mut m: Machine = serde_json::from_str(
            r#"{"system_id": "abc123", "fqdn": "node.maas", "status_name": "Ready"}"#,
        )
        .unwrap();
        assert_eq!(m.display_name(), "node.maas");
        m.hostname = Some("node".into());
        assert_eq!(m.display_name(), "node");
    }

    #[test]
    fn boot_resource_reads_type_field() {
        let r: BootResource = serde_json::from_str(
            r#"{"id": 7, "type": "Synced", "name": "ubuntu/jammy",
                "architecture": "amd64/ga-22.04", "resource_uri": "/MAAS/api/2.0/boot-resources/7/"}"#,
        )
        .unwrap();
        assert_eq!(r.name, "ubuntu/jammy");
        assert_eq!(r.kind.as_deref(), Some("Synced"));
        assert!(r.subarches.is_none());
    }

    #[test]
    fn status_parsing_keeps_unknown_values() {
        assert_eq!(
            MachineStatus::from("Failed deployment"),
            MachineStatus::FailedDeployment
        );
        let other = MachineStatus::from("Rescue mode");
        assert_eq!(other, MachineStatus::Other("Rescue mode".into()));
        assert_eq!(other.to_string(), "Rescue mode");
    }

    #[test]
    fn deploy_request_omits_missing_user_data() {
        let req = DeployRequest {
            distro_series: "jammy".into(),
            user_data: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"distro_series":"jammy"}"#);
    }
}

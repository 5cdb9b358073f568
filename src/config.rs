//! Provisioner configuration loaded from `provisioner.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! `MAAS_URL` and `MAAS_API_KEY` take precedence over the file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cloud_init::Credential;
use crate::maas::DEFAULT_POOL;
use crate::orchestrator::ProvisionSettings;

pub const DEFAULT_CONFIG_PATH: &str = "provisioner.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerConfig {
    /// Region controller URL, e.g. `http://maas.lab:5240/MAAS`.
    #[serde(default)]
    pub maas_url: String,

    /// `consumer_key:token:secret`.
    #[serde(default)]
    pub api_key: String,

    /// Pools the provisioner may select from and list.
    #[serde(default = "default_pools")]
    pub pools: Vec<String>,

    #[serde(default = "default_distro")]
    pub default_distro: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Jobs kept in memory before the oldest finished ones are dropped.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Account created on deployed machines.
    #[serde(default)]
    pub user: Option<UserConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_pools() -> Vec<String> {
    vec![DEFAULT_POOL.to_string()]
}

fn default_distro() -> String {
    "jammy".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_max_jobs() -> usize {
    500
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            maas_url: String::new(),
            api_key: String::new(),
            pools: default_pools(),
            default_distro: default_distro(),
            bind_addr: default_bind_addr(),
            call_timeout_secs: default_call_timeout_secs(),
            max_jobs: default_max_jobs(),
            user: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub configured: bool,
    pub url: Option<String>,
    pub pools: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub configured: bool,
    pub username: Option<String>,
    pub has_password: bool,
}

impl ProvisionerConfig {
    /// Loads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<ProvisionerConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.pools.retain(|p| !p.trim().is_empty());
        if config.pools.is_empty() {
            config.pools = default_pools();
        }
        Ok(config)
    }

    /// Non-empty values from `lookup` replace the URL and API key.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MAAS_URL").filter(|v| !v.is_empty()) {
            self.maas_url = url;
        }
        if let Some(key) = lookup("MAAS_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.maas_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    /// The deploy account, when both name and password are set.
    pub fn credential(&self) -> Option<Credential> {
        self.user
            .as_ref()
            .filter(|u| !u.username.is_empty() && !u.password.is_empty())
            .map(|u| Credential::new(u.username.clone(), u.password.clone()))
    }

    pub fn settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            pools: self.pools.clone(),
            default_distro: self.default_distro.clone(),
            call_timeout: self.call_timeout(),
            credential: self.credential(),
        }
    }

    pub fn config_status(&self) -> ConfigStatus {
        ConfigStatus {
            configured: self.is_configured(),
            url: Some(self.maas_url.clone()).filter(|u| !u.is_empty()),
            pools: self.pools.clone(),
        }
    }

    /// Never includes the password itself.
    pub fn user_status(&self) -> UserStatus {
        let user = self.user.as_ref();
        UserStatus {
            configured: self.credential().is_some(),
            username: user.map(|u| u.username.clone()).filter(|n| !n.is_empty()),
            has_password: user.is_some_and(|u| !u.password.is_empty()),
        }
    }
}

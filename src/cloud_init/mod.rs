//! First-boot configuration (cloud-config) generation.
//!
//! A machine's document is composed from independent pieces, in order:
//! machine preamble and OS-family base segment ([`base`]), every matching
//! enhancement rule ([`rules`]), filtered user commands ([`overrides`]) and a
//! fixed completion epilogue. The typed [`document::ConfigDocument`] is serialized once
//! at the end by [`render`].

pub mod base;
pub mod document;
pub mod overrides;
pub mod render;
pub mod rules;
mod shell;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use render::{BatchRendering, RenderInput, render_batch, render_machine};

/// Replaces credential secrets in display renderings.
pub const REDACTION_MARKER: &str = "<hidden>";

/// Coarse OS classification driving package and service names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Debian,
    RedHat,
}

impl OsFamily {
    /// Rocky, RHEL and CentOS series map to `RedHat`; anything else is `Debian`.
    pub fn from_distro(distro_series: &str) -> Self {
        let lower = distro_series.to_lowercase();
        if ["rocky", "rhel", "centos"].iter().any(|k| lower.contains(k)) {
            OsFamily::RedHat
        } else {
            OsFamily::Debian
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OsFamily::Debian => "Ubuntu",
            OsFamily::RedHat => "Rocky Linux",
        }
    }

    /// Group granting sudo rights.
    pub fn admin_group(self) -> &'static str {
        match self {
            OsFamily::Debian => "sudo",
            OsFamily::RedHat => "wheel",
        }
    }

    pub fn ssh_service(self) -> &'static str {
        match self {
            OsFamily::Debian => "ssh",
            OsFamily::RedHat => "sshd",
        }
    }

    pub fn kdump_service(self) -> &'static str {
        match self {
            OsFamily::Debian => "kdump-tools",
            OsFamily::RedHat => "kdump",
        }
    }

    /// Packages needed to build out-of-tree kernel drivers.
    pub fn driver_toolchain(self) -> &'static [&'static str] {
        match self {
            OsFamily::Debian => &["build-essential", "linux-headers-generic"],
            OsFamily::RedHat => &["gcc", "kernel-devel", "kernel-headers"],
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsFamily::Debian => write!(f, "debian"),
            OsFamily::RedHat => write!(f, "redhat"),
        }
    }
}

/// Account created on every deployed machine.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Same account with the secret replaced by [`REDACTION_MARKER`].
    pub fn redacted(&self) -> Self {
        Self::new(self.username.clone(), REDACTION_MARKER)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &REDACTION_MARKER)
            .finish()
    }
}

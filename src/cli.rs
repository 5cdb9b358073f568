//! Command line interface built on clap.
//!
//! Defines [`Cli`] with the [`Command`] subcommands (serve, provision, render,
//! resolve) and the global flags (`--config`, `--verbose`).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::selection::{ProvisionRequest, TagMatchMode};

/// Tag-aware bare-metal provisioning for MAAS fleets.
#[derive(Debug, Parser)]
#[command(name = "fleet-provision", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// How requested tags must match, as accepted on the command line.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum MatchModeArg {
    /// Every tag must be present.
    #[default]
    All,
    /// At least one tag must be present.
    Any,
}

impl From<MatchModeArg> for TagMatchMode {
    fn from(arg: MatchModeArg) -> Self {
        match arg {
            MatchModeArg::All => TagMatchMode::All,
            MatchModeArg::Any => TagMatchMode::Any,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the HTTP API.
    Serve {
        /// Listen address; overrides `bind_addr` from the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Deploys machines and follows the job until it finishes.
    Provision {
        /// Hostnames or system IDs. Leave empty to select by tags.
        machines: Vec<String>,

        /// Required tags (repeat or comma-separate).
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        #[arg(long, value_enum, default_value_t = MatchModeArg::All)]
        match_mode: MatchModeArg,

        /// Restrict to one resource pool.
        #[arg(long)]
        pool: Option<String>,

        /// Number of machines to select, or the cap for an explicit list.
        #[arg(long)]
        count: Option<i64>,

        /// Operating system series, e.g. `jammy` or `rocky9`.
        #[arg(long)]
        distro: Option<String>,

        /// File with extra cloud-config commands.
        #[arg(long)]
        user_data: Option<PathBuf>,
    },

    /// Prints the redacted cloud-config a machine would receive.
    Render {
        /// Hostname or system ID.
        machine: String,

        #[arg(long)]
        distro: Option<String>,

        #[arg(long)]
        user_data: Option<PathBuf>,
    },

    /// Maps hostnames or system IDs to system IDs.
    Resolve {
        #[arg(required = true)]
        machines: Vec<String>,
    },
}

/// Builds the request a `provision` invocation describes.
pub fn provision_request(
    machines: Vec<String>,
    tags: Vec<String>,
    match_mode: MatchModeArg,
    pool: Option<String>,
    count: Option<i64>,
    distro: Option<String>,
    user_data: Option<String>,
) -> ProvisionRequest {
    ProvisionRequest {
        auto_select: machines.is_empty() && !tags.is_empty(),
        machines,
        distro_series: distro,
        user_data,
        tags,
        pool,
        count,
        tag_match_mode: match_mode.into(),
    }
}

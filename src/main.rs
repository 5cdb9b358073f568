mod api;
mod cli;
mod cloud_init;
mod config;
mod error;
mod maas;
mod orchestrator;
mod selection;
mod state_machine;
mod store;
#[cfg(test)]
mod testing;
mod ui;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use api::AppState;
use cli::{Cli, Command};
use config::ProvisionerConfig;
use maas::MaasClient;
use orchestrator::Provisioner;
use state_machine::JobStatus;
use ui::JobProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}

fn read_user_data(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).with_context(|| format!("reading user data from {}", p.display()))
    })
    .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ProvisionerConfig::load(&cli.config)?;
    if !config.is_configured() {
        return Err(error::ProvisionError::Config(format!(
            "MAAS is not configured: set maas_url and api_key in {} or export MAAS_URL and MAAS_API_KEY",
            cli.config.display()
        ))
        .into());
    }
    let client = MaasClient::new(&config.maas_url, &config.api_key, config.call_timeout())?;
    let provisioner = Provisioner::new(Arc::new(client), config.settings(), config.max_jobs);
    tracing::debug!(url = %config.maas_url, pools = ?config.pools, "configuration loaded");

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
            let app = api::create_router(AppState {
                provisioner,
                config: Arc::new(config),
            });
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            tracing::info!(addr = %bind, "API listening");
            axum::serve(listener, app).await?;
        }
        Command::Provision {
            machines,
            tags,
            match_mode,
            pool,
            count,
            distro,
            user_data,
        } => {
            let user_data = read_user_data(user_data.as_deref())?;
            let request =
                cli::provision_request(machines, tags, match_mode, pool, count, distro, user_data);
            let response = provisioner.submit(request).await?;
            if let Some(summary) = &response.auto_selection {
                println!(
                    "Auto-selected {} of {} ready machines: {}",
                    summary.selected_machines,
                    summary.available_count,
                    response.selected_machines.as_deref().unwrap_or_default().join(", ")
                );
            }

            let mut progress = JobProgress::start(&response.job_id, response.machines_to_deploy);
            let job = loop {
                let job = provisioner.job(&response.job_id).await?;
                if job.status.is_terminal() {
                    break job;
                }
                progress.update(&job);
                tokio::time::sleep(POLL_INTERVAL).await;
            };
            progress.complete(&job);
            if job.status != JobStatus::Completed {
                bail!("job {} finished as {}", job.id, job.status);
            }
        }
        Command::Render {
            machine,
            distro,
            user_data,
        } => {
            let user_data = read_user_data(user_data.as_deref())?;
            let batch = provisioner
                .preview(&[machine], distro.as_deref(), user_data.as_deref())
                .await?;
            let rendered = batch
                .machines
                .first()
                .context("no machine was rendered")?;
            print!("{}", rendered.display_config);
        }
        Command::Resolve { machines } => {
            let ids = provisioner.resolve_identifiers(&machines).await?;
            for (token, id) in machines.iter().zip(&ids) {
                println!("{token}\t{id}");
            }
        }
    }

    Ok(())
}

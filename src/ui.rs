//! Terminal output: spinner and colored job reports.
//!
//! Uses `indicatif` for the progress spinner and `console` for colors.
//! [`JobProgress`] follows a provisioning job while it runs.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{JobStatus, MachineOutcome, ProvisioningJob};

/// Visual progress for one provisioning job.
///
/// Shows a spinner while machines are processed, then one colored line per
/// machine: deployed (green), skipped (yellow), failed (red).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    reported: usize,
}

impl JobProgress {
    pub fn start(job_id: &str, machines: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{job_id}: pending ({machines} machines)"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            reported: 0,
        }
    }

    /// Prints results that arrived since the last call and refreshes the
    /// spinner message.
    pub fn update(&mut self, job: &ProvisioningJob) {
        for result in job.results.iter().skip(self.reported) {
            let (mark, style) = match result.outcome {
                MachineOutcome::Deployed => ("✓", &self.green),
                MachineOutcome::Skipped => ("-", &self.yellow),
                MachineOutcome::Failed => ("✗", &self.red),
            };
            let reason = result
                .reason
                .as_deref()
                .map(|r| format!(": {r}"))
                .unwrap_or_default();
            self.pb.println(format!(
                "  {} {} ({}){reason}",
                style.apply_to(mark),
                result.hostname,
                result.machine_id
            ));
        }
        self.reported = job.results.len();
        self.pb.set_message(format!(
            "{}: {} ({}/{} processed)",
            job.id,
            job.status,
            job.processed_count(),
            job.total_machines
        ));
    }

    /// Stops the spinner and prints the final summary.
    pub fn complete(&mut self, job: &ProvisioningJob) {
        self.update(job);
        self.pb.finish_and_clear();
        let style = match job.status {
            JobStatus::Completed => &self.green,
            JobStatus::Failed => &self.red,
            _ => &self.yellow,
        };
        println!(
            "  {} Job {} {}: {} deployed, {} failed, {} skipped",
            style.apply_to("●"),
            job.id,
            style.apply_to(job.status),
            job.successful_deployments,
            job.failed_deployments,
            job.skipped_machines
        );
        if let Some(error) = &job.error {
            println!("  {} {error}", self.red.apply_to("✗"));
        }
    }
}

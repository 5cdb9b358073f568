use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{MachineResult, ProvisioningJob};

/// Lifecycle status of a provisioning job.
///
/// Each job flows through: PENDING → RUNNING → one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithErrors | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "completed_with_errors" => Ok(JobStatus::CompletedWithErrors),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Something that happened to a job's execution task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The background task picked the job up.
    Started,
    /// Every target was processed.
    Finished,
    /// Execution stopped before the targets could be processed.
    Aborted(String),
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEvent::Started => write!(f, "start"),
            JobEvent::Finished => write!(f, "finish"),
            JobEvent::Aborted(_) => write!(f, "abort"),
        }
    }
}

/// The result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Advance to a non-terminal status.
    Next(JobStatus),
    /// The job reached a terminal status.
    Complete(JobStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {event} a job that is {from}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub event: String,
}

/// Drives a [`ProvisioningJob`] through its statuses.
pub struct StateMachine;

impl StateMachine {
    /// Applies `event` to `job`, or leaves it untouched and returns an error
    /// when the event is not valid in the job's current status.
    ///
    /// - `Started` moves `pending` to `running`.
    /// - `Finished` moves `running` to `completed`, or to
    ///   `completed_with_errors` when any result failed.
    /// - `Aborted` moves `pending` or `running` to `failed`, recording every
    ///   unprocessed target as failed so the counters add up.
    pub fn next(job: &mut ProvisioningJob, event: JobEvent) -> Result<Transition, InvalidTransition> {
        let transition = match (&event, job.status) {
            (JobEvent::Started, JobStatus::Pending) => Transition::Next(JobStatus::Running),
            (JobEvent::Finished, JobStatus::Running) => {
                if job.failed_deployments == 0 && job.unprocessed().is_empty() {
                    Transition::Complete(JobStatus::Completed)
                } else {
                    Transition::Complete(JobStatus::CompletedWithErrors)
                }
            }
            (JobEvent::Aborted(_), JobStatus::Pending | JobStatus::Running) => {
                Transition::Complete(JobStatus::Failed)
            }
            (_, from) => {
                return Err(InvalidTransition {
                    from,
                    event: event.to_string(),
                });
            }
        };

        let now = Utc::now();
        match transition {
            Transition::Next(status) => job.status = status,
            Transition::Complete(status) => {
                let reason = match &event {
                    JobEvent::Aborted(reason) => {
                        job.error = Some(reason.clone());
                        reason.clone()
                    }
                    _ => "not processed".to_string(),
                };
                let remaining = job.unprocessed().to_vec();
                for target in &remaining {
                    job.record(MachineResult::failed(target, reason.clone()));
                }
                job.status = status;
                job.completed_at = Some(now);
            }
        }
        job.updated_at = now;

        Ok(transition)
    }
}

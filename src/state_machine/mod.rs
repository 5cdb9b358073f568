mod job;
mod state;

pub use job::{JobConfig, MachineOutcome, MachineResult, ProvisioningJob, TargetMachine};
pub use state::{InvalidTransition, JobEvent, JobStatus, StateMachine, Transition};

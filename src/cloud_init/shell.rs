// Helpers for the logged shell lines that make up `runcmd`.

pub const USERDATA_LOG: &str = "/var/log/cloud-init-userdata.log";
pub const DEPLOYMENT_LOG: &str = "/var/log/fleet-deployment.log";

/// `echo` into the user-data log.
pub fn log(message: &str) -> String {
    format!("echo \"{message}\" | tee -a {USERDATA_LOG}")
}

/// `echo` into both the user-data and deployment logs.
pub fn log_both(message: &str) -> String {
    format!("echo \"{message}\" | tee -a {USERDATA_LOG} {DEPLOYMENT_LOG}")
}

/// Run `command`, capturing its output in the user-data log.
pub fn logged(command: &str) -> String {
    format!("{command} 2>&1 | tee -a {USERDATA_LOG}")
}

/// Like [`logged`], but never fails the script.
pub fn logged_or_true(command: &str) -> String {
    format!("{command} 2>&1 | tee -a {USERDATA_LOG} || true")
}

/// Like [`logged`], printing `error` when the command fails.
pub fn logged_or_report(command: &str, error: &str) -> String {
    format!("{command} 2>&1 | tee -a {USERDATA_LOG} || {}", log(error))
}

//! OS-family base segment: packages, kernel tuning, logging, services and the
//! optional user account.

use super::document::{ConfigDocument, SudoRule, UserAccount, WriteFile};
use super::shell::{DEPLOYMENT_LOG, USERDATA_LOG, log, logged, logged_or_report, logged_or_true};
use super::{Credential, OsFamily};
use crate::maas::Machine;

pub const SYSCTL_PATH: &str = "/etc/sysctl.d/99-provisioning.conf";

const SYSCTL_TUNING: &str = "\
# installed by fleet-provision
kernel.numa_balancing=0
kernel.softlockup_all_cpu_backtrace=1
kernel.panic = 300
net.ipv4.conf.all.arp_announce = 2
net.ipv4.conf.all.arp_filter = 1
net.ipv4.conf.all.arp_ignore = 1
net.ipv4.conf.default.arp_announce = 2
net.ipv4.conf.default.arp_filter = 1
net.ipv4.conf.default.arp_ignore = 1
net.ipv4.conf.all.ignore_routes_with_linkdown = 1
net.ipv4.conf.default.ignore_routes_with_linkdown = 1
";

const COMMON_PACKAGES: &[&str] = &[
    "curl", "wget", "git", "htop", "vim", "net-tools", "openssh-server",
];

const DEBIAN_PACKAGES: &[&str] = &[
    "lldpd", "nvme-cli", "strace", "ltrace", "crash", "kdump-tools", "ibverbs-utils",
    "ibutils", "infiniband-diags", "screen", "tmux", "ipmitool", "rdma-core", "tshark",
    "termshark", "fio", "smartmontools", "iozone3", "atop",
];

const REDHAT_PACKAGES: &[&str] = &[
    "sudo", "tar", "gzip", "lldpd", "nvme-cli", "strace", "ltrace", "crash", "kexec-tools",
    "ibverbs-utils", "infiniband-diags", "screen", "tmux", "ipmitool", "rdma-core",
    "wireshark-cli", "fio", "smartmontools", "atop",
];

const SUDO_ALL: &str = "ALL=(ALL) NOPASSWD:ALL";

/// Hostname written into the document.
pub fn hostname_for(machine: &Machine) -> String {
    if machine.hostname.as_deref().is_some_and(|h| !h.is_empty())
        || machine.fqdn.as_deref().is_some_and(|f| !f.is_empty())
    {
        return machine.display_name().to_string();
    }
    let id = &machine.system_id;
    let start = id.char_indices().rev().nth(7).map(|(i, _)| i).unwrap_or(0);
    format!("maas-{}", &id[start..])
}

/// Memory in whole GiB, rounded up.
pub fn memory_gib(machine: &Machine) -> u64 {
    machine.memory.unwrap_or(0).div_ceil(1024)
}

pub fn packages(family: OsFamily) -> impl Iterator<Item = &'static str> {
    let specific = match family {
        OsFamily::Debian => DEBIAN_PACKAGES,
        OsFamily::RedHat => REDHAT_PACKAGES,
    };
    COMMON_PACKAGES.iter().chain(specific).copied()
}

/// Log lines identifying the machine, emitted first.
pub fn machine_preamble(machine: &Machine) -> Vec<String> {
    let tags = if machine.tag_names.is_empty() {
        "none".to_string()
    } else {
        machine.tag_names.join(", ")
    };
    let both = |m: String| format!("echo \"{m}\" | tee -a {USERDATA_LOG} {DEPLOYMENT_LOG}");
    vec![
        both("=== Machine-Specific Configuration ===".into()),
        both(format!("Machine-specific deployment for {}", machine.display_name())),
        both(format!("System ID: {}", machine.system_id)),
        both(format!(
            "Architecture: {}",
            machine.architecture.as_deref().unwrap_or("unknown")
        )),
        both(format!(
            "CPU Cores: {}",
            machine
                .cpu_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".into())
        )),
        both(format!("Memory: {} GB", memory_gib(machine))),
        both(format!("Machine Tags: {tags}")),
    ]
}

pub fn user_account(family: OsFamily, credential: &Credential) -> UserAccount {
    let admin = family.admin_group().to_string();
    match family {
        OsFamily::Debian => UserAccount {
            name: credential.username.clone(),
            plain_text_passwd: credential.password().to_string(),
            sudo: SudoRule::Single(SUDO_ALL.to_string()),
            shell: "/bin/bash".into(),
            groups: vec![admin, "docker".into()],
            lock_passwd: false,
            create_user_group: None,
        },
        OsFamily::RedHat => UserAccount {
            name: credential.username.clone(),
            plain_text_passwd: credential.password().to_string(),
            sudo: SudoRule::List(vec![SUDO_ALL.to_string()]),
            shell: "/bin/bash".into(),
            groups: vec![admin, "docker".into()],
            lock_passwd: false,
            create_user_group: Some(true),
        },
    }
}

/// Appends the base segment for `family` to `doc`.
pub fn apply(doc: &mut ConfigDocument, family: OsFamily, credential: Option<&Credential>) {
    doc.add_packages(packages(family));
    doc.ssh_pwauth = true;
    doc.disable_root = false;
    doc.write_file(WriteFile::new(SYSCTL_PATH, SYSCTL_TUNING));

    doc.run_all([
        "mkdir -p /var/log".to_string(),
        format!("touch {USERDATA_LOG} {DEPLOYMENT_LOG}"),
        format!("chmod 644 {USERDATA_LOG} {DEPLOYMENT_LOG}"),
        log("=== Cloud-Init Deployment Started at $(date) ==="),
        format!("echo \"Deployment started at $(date)\" | tee {DEPLOYMENT_LOG}"),
        log(&format!("Configuring {} system...", family.label())),
        "# Enable hardware monitoring services".to_string(),
        logged_or_true("systemctl enable lldpd"),
        logged_or_true("systemctl start lldpd"),
        logged_or_true(&format!("systemctl enable {}", family.kdump_service())),
        logged_or_true("systemctl enable smartd"),
        logged_or_true("systemctl start smartd"),
        "# Apply kernel tuning".to_string(),
        logged(&format!("sysctl -p {SYSCTL_PATH}")),
        log("Kernel tuning applied"),
    ]);

    match credential {
        Some(credential) => {
            doc.users = vec![user_account(family, credential)];
            if family == OsFamily::RedHat {
                doc.run_all(manual_account_fallback(credential));
            }
            doc.run_all(ssh_commands(family));
            doc.run_all(account_verification(&credential.username));
            doc.run(log(&format!("{} base configuration completed", family.label())));
        }
        None => {
            doc.users.clear();
            doc.run_all(ssh_commands(family));
            doc.run(log(&format!(
                "{} base configuration completed (no user configured)",
                family.label()
            )));
        }
    }
}

fn ssh_commands(family: OsFamily) -> Vec<String> {
    vec![
        logged(&format!("systemctl enable {}", family.ssh_service())),
        logged(&format!("systemctl start {}", family.ssh_service())),
    ]
}

// cloud-init's own user creation is not guaranteed to have run on RedHat
// images when runcmd executes.
fn manual_account_fallback(credential: &Credential) -> Vec<String> {
    let user = &credential.username;
    let password = credential.password();
    vec![
        format!("# Create {user} manually if cloud-init has not done so"),
        log("=== Account fallback check ==="),
        format!("if ! id {user} >/dev/null 2>&1; then"),
        log(&format!("{user} not found, creating it manually")),
        logged_or_report(
            &format!("useradd -m -s /bin/bash {user}"),
            "ERROR: useradd failed",
        ),
        logged_or_report(
            &format!("echo \"{user}:{password}\" | chpasswd"),
            "ERROR: chpasswd failed",
        ),
        logged_or_report(
            &format!("usermod -aG wheel {user}"),
            "ERROR: usermod wheel failed",
        ),
        format!(
            "getent group docker >/dev/null && usermod -aG docker {user} 2>&1 | tee -a {USERDATA_LOG} || {}",
            log("docker group not present, skipping")
        ),
        log("Manual account creation completed"),
        "else".to_string(),
        log(&format!("{user} already exists, skipping manual creation")),
        "fi".to_string(),
        format!("# Grant wheel passwordless sudo for {user}"),
        "echo \"%wheel ALL=(ALL) NOPASSWD: ALL\" | tee /etc/sudoers.d/wheel".to_string(),
        "chmod 0440 /etc/sudoers.d/wheel".to_string(),
    ]
}

fn account_verification(user: &str) -> Vec<String> {
    vec![
        format!("# Verify {user} exists with the expected groups"),
        logged_or_report(&format!("id {user}"), &format!("WARNING: {user} user not found")),
        logged_or_report(
            &format!("groups {user}"),
            &format!("WARNING: cannot check {user} user groups"),
        ),
    ]
}

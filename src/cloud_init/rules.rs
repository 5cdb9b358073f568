//! Tag-driven enhancement rules.
//!
//! Each rule is an independent predicate over the machine's tags and OS family
//! with a fixed effect. Every matching rule fires, in table order, and its
//! effect is appended to the document; rules never replace each other's output.

use super::OsFamily;
use super::document::{ConfigDocument, WriteFile};
use super::shell::{log, log_both, logged, logged_or_true};

const DOCA_SCRIPT_PATH: &str = "/tmp/install_doca.sh";
const DOCA_SCRIPT: &str = include_str!("scripts/install_doca.sh");

/// Packages, commands and files contributed by one rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effect {
    pub packages: Vec<String>,
    pub commands: Vec<String>,
    pub files: Vec<WriteFile>,
}

impl Effect {
    fn new() -> Self {
        Self::default()
    }

    fn packages(mut self, names: &[&str]) -> Self {
        self.packages.extend(names.iter().map(|n| n.to_string()));
        self
    }

    fn commands(mut self, commands: Vec<String>) -> Self {
        self.commands.extend(commands);
        self
    }

    fn file(mut self, file: WriteFile) -> Self {
        self.files.push(file);
        self
    }

    /// Appends this effect to `doc`.
    pub fn apply_to(&self, doc: &mut ConfigDocument) {
        doc.add_packages(self.packages.iter().map(String::as_str));
        doc.run_all(self.commands.iter().cloned());
        for file in &self.files {
            doc.write_file(file.clone());
        }
    }
}

pub struct EnhancementRule {
    pub name: &'static str,
    pub description: &'static str,
    matches: fn(&[String], OsFamily) -> bool,
    effect: fn(OsFamily) -> Effect,
}

impl EnhancementRule {
    pub fn matches(&self, tags: &[String], family: OsFamily) -> bool {
        (self.matches)(tags, family)
    }

    pub fn effect(&self, family: OsFamily) -> Effect {
        (self.effect)(family)
    }
}

impl std::fmt::Debug for EnhancementRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancementRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn has(tags: &[String], tag: &str) -> bool {
    tags.iter().any(|t| t == tag)
}

fn any_contains(tags: &[String], needle: &str) -> bool {
    tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Declaration order is application order.
pub static RULES: &[EnhancementRule] = &[
    EnhancementRule {
        name: "high-cpu",
        description: "CPU performance optimizations (performance governor)",
        matches: |tags, _| has(tags, "high-cpu"),
        effect: |family| {
            let packages: &[&str] = match family {
                OsFamily::Debian => &["cpufrequtils", "linux-tools-generic"],
                OsFamily::RedHat => &["kernel-tools"],
            };
            Effect::new().packages(packages).commands(vec![
                log("=== High-CPU Optimizations ==="),
                logged("echo \"performance\" | tee /sys/devices/system/cpu/cpu*/cpufreq/scaling_governor"),
                log_both("High-CPU optimizations applied"),
            ])
        },
    },
    EnhancementRule {
        name: "high-memory",
        description: "Memory optimizations (swappiness, cache pressure)",
        matches: |tags, _| has(tags, "high-memory"),
        effect: |_| {
            Effect::new().commands(vec![
                log("=== High-Memory Optimizations ==="),
                logged("echo \"vm.swappiness=1\" >> /etc/sysctl.conf"),
                logged("echo \"vm.vfs_cache_pressure=50\" >> /etc/sysctl.conf"),
                log_both("High-memory optimizations applied"),
            ])
        },
    },
    EnhancementRule {
        name: "bcm57508",
        description: "Broadcom BCM57508 network driver configuration",
        matches: |tags, _| has(tags, "bcm57508"),
        effect: |_| {
            Effect::new().packages(&["ethtool"]).commands(vec![
                log("=== Broadcom BCM57508 Configuration ==="),
                logged("modprobe bnxt_en"),
                log_both("Broadcom BCM57508 network driver loaded"),
            ])
        },
    },
    EnhancementRule {
        name: "amd64-arch",
        description: "AMD64 microcode updates",
        matches: |tags, _| has(tags, "amd64-arch"),
        effect: |_| {
            Effect::new().packages(&["amd64-microcode"]).commands(vec![
                log("=== AMD64 Architecture Optimizations ==="),
                log_both("AMD64 microcode updates enabled"),
            ])
        },
    },
    EnhancementRule {
        name: "virtual",
        description: "Virtual machine guest tools",
        matches: |tags, _| has(tags, "virtual"),
        effect: |_| {
            Effect::new()
                .packages(&["qemu-guest-agent", "open-vm-tools"])
                .commands(vec![
                    log("=== Virtual Machine Configuration ==="),
                    logged("systemctl enable qemu-guest-agent"),
                    log_both("Virtual machine tools configured"),
                ])
        },
    },
    EnhancementRule {
        name: "serial-console",
        description: "Serial console access configuration",
        matches: |tags, _| has(tags, "serial_console") || has(tags, "needs_serial_console_deploy"),
        effect: |_| {
            Effect::new().commands(vec![
                log("=== Serial Console Configuration ==="),
                logged("systemctl enable serial-getty@ttyS0.service"),
                logged("systemctl start serial-getty@ttyS0.service"),
                log_both("Serial console configured"),
            ])
        },
    },
    EnhancementRule {
        name: "nvme-core",
        description: "NVME multipath configuration",
        matches: |tags, _| has(tags, "nvme_core"),
        effect: |_| {
            Effect::new()
                .file(WriteFile::new("/etc/modprobe.d/nvme.conf", "nvme_core.multipath=N\n"))
                .commands(vec![
                    log("=== NVME Configuration ==="),
                    log_both("NVME multipath disabled as configured"),
                ])
        },
    },
    EnhancementRule {
        name: "connectx",
        description: "ConnectX NIC driver loading (mlx5_core, mlx5_ib)",
        matches: |tags, _| any_contains(tags, "connectx") || any_contains(tags, "mellanox"),
        effect: |_| {
            Effect::new().commands(vec![
                log("=== ConnectX NIC Driver Loading ==="),
                logged_or_true("modprobe mlx5_core"),
                logged_or_true("modprobe mlx5_ib"),
                log_both("ConnectX NIC drivers loaded"),
            ])
        },
    },
    EnhancementRule {
        name: "doca",
        description: "DOCA installation (doca-all for Ubuntu, doca-ofed for Rocky/RHEL)",
        matches: |tags, _| any_contains(tags, "doca"),
        effect: |family| {
            let packaging: &[&str] = match family {
                OsFamily::Debian => &["wget", "python3-pip", "curl"],
                OsFamily::RedHat => &["wget", "python3-pip", "curl", "rpm-build"],
            };
            Effect::new()
                .packages(family.driver_toolchain())
                .packages(packaging)
                .file(WriteFile::new(DOCA_SCRIPT_PATH, DOCA_SCRIPT).executable())
                .commands(vec![
                    log("=== DOCA Installation ==="),
                    logged(&format!("chmod +x {DOCA_SCRIPT_PATH}")),
                    logged(DOCA_SCRIPT_PATH),
                ])
        },
    },
    EnhancementRule {
        name: "intel-nic",
        description: "Intel NIC driver optimization",
        matches: |tags, _| {
            tags.iter().map(|t| t.to_lowercase()).any(|t| {
                t.contains("intel") && (t.contains("nic") || t.contains("ethernet"))
            })
        },
        effect: |family| {
            let mut commands = vec![log("=== Intel NIC Drivers Installation ===")];
            for module in ["e1000e", "igb", "ixgbe", "i40e", "ice"] {
                commands.push(logged_or_true(&format!("modprobe {module}")));
            }
            commands.push(log_both("Intel NIC drivers loaded"));
            Effect::new()
                .packages(family.driver_toolchain())
                .commands(commands)
        },
    },
    EnhancementRule {
        name: "broadcom-nic",
        description: "Enhanced Broadcom NIC driver support",
        matches: |tags, _| has(tags, "bcm57508") || any_contains(tags, "broadcom"),
        effect: |family| {
            Effect::new()
                .packages(&["ethtool"])
                .packages(family.driver_toolchain())
                .commands(vec![
                    log("=== Broadcom NIC Drivers Installation ==="),
                    logged("modprobe bnxt_en"),
                    logged_or_true("modprobe tg3"),
                    log_both("Broadcom NIC drivers loaded"),
                ])
        },
    },
];

/// Rules matching `tags`, in declaration order.
pub fn matching(tags: &[String], family: OsFamily) -> Vec<&'static EnhancementRule> {
    RULES.iter().filter(|r| r.matches(tags, family)).collect()
}

/// Applies every matching rule to `doc` and returns the rules that fired.
pub fn apply(
    doc: &mut ConfigDocument,
    tags: &[String],
    family: OsFamily,
) -> Vec<&'static EnhancementRule> {
    let fired = matching(tags, family);
    for rule in &fired {
        rule.effect(family).apply_to(doc);
    }
    fired
}

/// Human-readable summary of what `tags` will trigger.
pub fn describe_enhancements(tags: &[String]) -> Vec<&'static str> {
    // Descriptions are family-independent; any family works for matching.
    let descriptions: Vec<&'static str> = matching(tags, OsFamily::Debian)
        .into_iter()
        .map(|r| r.description)
        .collect();
    if descriptions.is_empty() {
        vec!["Standard configuration only"]
    } else {
        descriptions
    }
}

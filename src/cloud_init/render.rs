use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::base::{self, hostname_for, memory_gib};
use super::document::{ConfigDocument, UserAccount};
use super::overrides::UserOverrides;
use super::rules::{self, EnhancementRule};
use super::shell::{DEPLOYMENT_LOG, USERDATA_LOG, log, log_both};
use super::{Credential, OsFamily, REDACTION_MARKER};
use crate::maas::Machine;

/// Inputs shared by every machine of one rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub distro_series: &'a str,
    pub user_data: Option<&'a str>,
    pub credential: Option<&'a Credential>,
}

/// One machine's rendered cloud-config.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedConfig {
    pub system_id: String,
    pub hostname: String,
    pub os_family: OsFamily,
    /// Deployable rendering; carries the secret, never serialized.
    #[serde(skip_serializing)]
    pub config: String,
    pub display_config: String,
    pub tags: Vec<String>,
    pub enhancements: Vec<&'static str>,
    pub has_enhancements: bool,
}

/// Per-machine renderings plus a display-only summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRendering {
    pub machines: Vec<RenderedConfig>,
    /// Never deployed to any machine.
    pub summary: String,
    pub tags: Vec<String>,
    pub has_enhancements: bool,
}

/// Builds the typed document for one machine.
pub fn build_document(
    machine: &Machine,
    family: OsFamily,
    user_data: Option<&str>,
    credential: Option<&Credential>,
) -> (ConfigDocument, Vec<&'static EnhancementRule>) {
    let mut doc = ConfigDocument::new(hostname_for(machine));
    doc.run_all(base::machine_preamble(machine));
    base::apply(&mut doc, family, credential);
    let fired = rules::apply(&mut doc, &machine.tag_names, family);
    if let Some(snippet) = user_data {
        UserOverrides::parse(snippet).apply_to(&mut doc);
    }
    epilogue(&mut doc, credential);
    (doc, fired)
}

fn epilogue(doc: &mut ConfigDocument, credential: Option<&Credential>) {
    doc.run(log_both("=== Cloud-Init Deployment Completed at $(date) ==="));
    doc.run(format!(
        "echo \"All user-data logs saved to {USERDATA_LOG}\" | tee -a {DEPLOYMENT_LOG}"
    ));
    doc.run(log("Final user verification:"));
    match credential {
        Some(c) => {
            let user = &c.username;
            doc.run(format!(
                "id {user} | tee -a {USERDATA_LOG} || {}",
                log(&format!("ERROR: {user} user not created!"))
            ));
        }
        None => doc.run(log("No user configured for this deployment")),
    }
    doc.final_message = format!("Deployment completed successfully for {}", doc.hostname);
}

fn header(machine: &Machine, generated_at: DateTime<Utc>) -> String {
    let tags = if machine.tag_names.is_empty() {
        "none".to_string()
    } else {
        machine.tag_names.join(", ")
    };
    let cpus = machine
        .cpu_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".into());
    format!(
        "#cloud-config\n\
         # Auto-generated first-boot configuration\n\
         # Machine: {}\n\
         # System ID: {}\n\
         # Architecture: {}\n\
         # CPU: {cpus} cores, Memory: {} GB\n\
         # Machine tags: {tags}\n\
         # Generated at: {}\n\n",
        machine.display_name(),
        machine.system_id,
        machine.architecture.as_deref().unwrap_or("unknown"),
        memory_gib(machine),
        generated_at.to_rfc3339(),
    )
}

fn trailer(fired: &[&'static EnhancementRule]) -> String {
    let mut out = String::from("\n# Applied enhancements:\n");
    if fired.is_empty() {
        out.push_str("#   - Standard configuration only\n");
    }
    for rule in fired {
        out.push_str(&format!("#   - {}: {}\n", rule.name, rule.description));
    }
    out
}

/// Replaces the secret inside the serialized deploy body, touching only the
/// lines that differ from the redacted serialization `reference`.
///
/// Quoting chosen for the secret is kept, so the result differs from `body`
/// only at the secret. `None` when the two serializations do not line up.
fn redact_in_place(body: &str, reference: &str, secret: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let lines: Vec<&str> = body.split_inclusive('\n').collect();
    let reference: Vec<&str> = reference.split_inclusive('\n').collect();
    if lines.len() != reference.len() {
        return None;
    }

    // Forms the emitter may use: plain, single-quoted and double-quoted.
    let mut forms = vec![secret.to_string(), secret.replace('\'', "''")];
    if let Ok(json) = serde_json::to_string(secret) {
        forms.push(json[1..json.len() - 1].to_string());
    }
    forms.sort_by_key(|f| std::cmp::Reverse(f.len()));
    forms.dedup();

    let mut out = String::with_capacity(body.len());
    for (line, expected) in lines.iter().zip(&reference) {
        if line == expected {
            out.push_str(line);
            continue;
        }
        let mut redacted = line.to_string();
        for form in &forms {
            redacted = redacted.replace(form.as_str(), REDACTION_MARKER);
        }
        out.push_str(&redacted);
    }
    Some(out)
}

/// Whether `text` parses to exactly `doc`.
fn describes(text: &str, doc: &ConfigDocument) -> bool {
    match (
        serde_yaml::from_str::<serde_yaml::Value>(text),
        serde_yaml::to_value(doc),
    ) {
        (Ok(parsed), Ok(expected)) => parsed == expected,
        _ => false,
    }
}

/// Renders `machine`'s deploy and display configurations.
///
/// Both share `generated_at`, and the display text is derived from the
/// deploy text, so they differ only where the credential secret is replaced
/// by [`REDACTION_MARKER`].
pub fn render_machine(
    machine: &Machine,
    input: &RenderInput<'_>,
    generated_at: DateTime<Utc>,
) -> Result<RenderedConfig, serde_yaml::Error> {
    let family = OsFamily::from_distro(input.distro_series);
    let (doc, fired) = build_document(machine, family, input.user_data, input.credential);

    let header = header(machine, generated_at);
    let trailer = trailer(&fired);
    let body = doc.to_yaml()?;
    let config = format!("{header}{body}{trailer}");

    let display_config = match input.credential {
        Some(credential) => {
            let redacted = credential.redacted();
            let (display_doc, _) =
                build_document(machine, family, input.user_data, Some(&redacted));
            let reference = display_doc.to_yaml()?;
            let display_body = redact_in_place(&body, &reference, credential.password())
                .filter(|text| describes(text, &display_doc))
                .unwrap_or(reference);
            format!("{header}{display_body}{trailer}")
        }
        None => config.clone(),
    };

    Ok(RenderedConfig {
        system_id: machine.system_id.clone(),
        hostname: doc.hostname.clone(),
        os_family: family,
        config,
        display_config,
        tags: machine.tag_names.clone(),
        enhancements: fired.iter().map(|r| r.name).collect(),
        has_enhancements: !fired.is_empty(),
    })
}

#[derive(Serialize)]
struct SummaryBody {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    users: Vec<UserAccount>,
    final_message: String,
}

/// Renders every machine separately and adds a display-only summary.
pub fn render_batch(
    machines: &[Machine],
    input: &RenderInput<'_>,
    generated_at: DateTime<Utc>,
) -> Result<BatchRendering, serde_yaml::Error> {
    let rendered = machines
        .iter()
        .map(|m| render_machine(m, input, generated_at))
        .collect::<Result<Vec<_>, _>>()?;

    let tags: BTreeSet<&str> = machines
        .iter()
        .flat_map(|m| m.tag_names.iter().map(String::as_str))
        .collect();
    let tag_list = if tags.is_empty() {
        "none".to_string()
    } else {
        tags.iter().copied().collect::<Vec<_>>().join(", ")
    };

    let family = OsFamily::from_distro(input.distro_series);
    let mut summary = format!(
        "#cloud-config\n\
         # Multi-machine deployment summary (display only, not deployed)\n\
         # Target OS: {} ({})\n\
         # Machines: {}\n\
         # Union of tags: {tag_list}\n\
         # Generated at: {}\n",
        input.distro_series,
        family.label(),
        machines.len(),
        generated_at.to_rfc3339(),
    );
    for machine in machines {
        let enhancements = rules::describe_enhancements(&machine.tag_names).join("; ");
        summary.push_str(&format!(
            "#   - {} ({}): {enhancements}\n",
            machine.display_name(),
            machine.system_id
        ));
    }
    summary.push_str(
        "# Each machine receives its own configuration based on its tags.\n\n",
    );
    if input.credential.is_none() {
        summary.push_str("# No user configuration - machines will use default system access\n");
    }
    let body = SummaryBody {
        users: input
            .credential
            .map(|c| vec![base::user_account(family, &c.redacted())])
            .unwrap_or_default(),
        final_message: format!(
            "Deployment completed for {} machines with individualized configurations",
            machines.len()
        ),
    };
    summary.push_str(&serde_yaml::to_string(&body)?);

    Ok(BatchRendering {
        has_enhancements: rendered.iter().any(|r| r.has_enhancements),
        machines: rendered,
        summary,
        tags: tags.into_iter().map(String::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::machine;

    // Same length as the marker, so line layout cannot shift.
    const SECRET: &str = "pw-s3cr3";

    fn input<'a>(distro: &'a str, credential: Option<&'a Credential>) -> RenderInput<'a> {
        RenderInput {
            distro_series: distro,
            user_data: None,
            credential,
        }
    }

    #[test]
    fn rendering_starts_with_cloud_config_header() {
        let mut m = machine("ht3nrd", "Ready", &["high-cpu"]);
        m.architecture = Some("amd64/generic".into());
        m.cpu_count = Some(32);
        m.memory = Some(65537);
        let out = render_machine(&m, &input("jammy", None), Utc::now()).unwrap();

        assert!(out.config.starts_with("#cloud-config\n"));
        assert!(out.config.contains("# System ID: ht3nrd"));
        assert!(out.config.contains("# CPU: 32 cores, Memory: 65 GB"));
        assert!(out.config.contains("# Machine tags: high-cpu"));
        assert!(out.config.contains("#   - high-cpu: CPU performance"));
        assert_eq!(out.enhancements, vec!["high-cpu"]);
        assert!(out.has_enhancements);
    }

    #[test]
    fn rendered_body_is_valid_yaml() {
        let m = machine("ht3nrd", "Ready", &["doca", "nvme_core"]);
        let cred = Credential::new("ops", SECRET);
        let out = render_machine(&m, &input("rocky9", Some(&cred)), Utc::now()).unwrap();

        let parsed: serde_yaml::Value = serde_yaml::from_str(&out.config).unwrap();
        assert_eq!(parsed["hostname"], serde_yaml::Value::String(out.hostname.clone()));
        assert_eq!(parsed["users"][0]["name"], serde_yaml::Value::String("ops".into()));
        assert_eq!(parsed["write_files"].as_sequence().unwrap().len(), 3);
        assert!(parsed["packages"]
            .as_sequence()
            .unwrap()
            .contains(&serde_yaml::Value::String("kernel-devel".into())));
    }

    #[test]
    fn display_differs_only_at_secret() {
        let m = machine("ht3nrd", "Ready", &["virtual"]);
        let cred = Credential::new("ops", SECRET);
        for distro in ["jammy", "rocky9"] {
            let out = render_machine(&m, &input(distro, Some(&cred)), Utc::now()).unwrap();
            assert!(out.config.contains(SECRET));
            assert!(!out.display_config.contains(SECRET));
            assert_eq!(out.display_config, out.config.replace(SECRET, REDACTION_MARKER));
        }
    }

    #[test]
    fn display_keeps_quoting_of_secrets_yaml_would_misread() {
        let m = machine("ht3nrd", "Ready", &[]);
        for secret in ["12345678", "true", "pa:ss #1"] {
            let cred = Credential::new("ops", secret);
            let out = render_machine(&m, &input("jammy", Some(&cred)), Utc::now()).unwrap();

            let config: Vec<&str> = out.config.lines().collect();
            let display: Vec<&str> = out.display_config.lines().collect();
            assert_eq!(config.len(), display.len(), "secret {secret:?}");
            let changed: Vec<(&str, &str)> = config
                .iter()
                .zip(&display)
                .filter(|(c, d)| c != d)
                .map(|(c, d)| (*c, *d))
                .collect();
            assert_eq!(changed.len(), 1, "secret {secret:?}");
            let (config_line, display_line) = changed[0];
            assert_eq!(config_line, format!("  plain_text_passwd: '{secret}'"));
            assert_eq!(display_line, "  plain_text_passwd: '<hidden>'");

            let parsed: serde_yaml::Value = serde_yaml::from_str(&out.display_config).unwrap();
            assert_eq!(
                parsed["users"][0]["plain_text_passwd"],
                serde_yaml::Value::String(REDACTION_MARKER.into())
            );
        }
    }

    #[test]
    fn display_redacts_in_place_on_red_hat_fallback_commands() {
        let m = machine("ht3nrd", "Ready", &[]);
        let cred = Credential::new("ops", "12345678");
        let out = render_machine(&m, &input("rocky9", Some(&cred)), Utc::now()).unwrap();
        assert!(out.config.contains("ops:12345678"));
        assert_eq!(out.display_config, out.config.replace("12345678", REDACTION_MARKER));
    }

    #[test]
    fn display_equals_config_without_credentials() {
        let m = machine("ht3nrd", "Ready", &[]);
        let out = render_machine(&m, &input("jammy", None), Utc::now()).unwrap();
        assert_eq!(out.config, out.display_config);
        assert!(!out.has_enhancements);
        assert!(out.config.contains("#   - Standard configuration only"));
    }

    #[test]
    fn segments_are_ordered_base_rules_user_epilogue() {
        let m = machine("ht3nrd", "Ready", &["virtual"]);
        let (doc, _) = build_document(&m, OsFamily::Debian, Some("- touch /ok"), None);
        let pos = |needle: &str| doc.runcmd.iter().position(|c| c.contains(needle)).unwrap();

        assert_eq!(pos("Machine-Specific Configuration"), 0);
        assert!(pos("mkdir -p /var/log") < pos("Virtual Machine Configuration"));
        assert!(pos("Virtual Machine Configuration") < pos("touch /ok"));
        assert!(pos("touch /ok") < pos("Deployment Completed"));
        assert_eq!(doc.final_message, "Deployment completed successfully for ht3nrd-host");
    }

    #[test]
    fn combined_tags_contain_each_rule_segment() {
        let family = OsFamily::Debian;
        let m_a = machine("a", "Ready", &["high-cpu"]);
        let m_b = machine("a", "Ready", &["virtual"]);
        let m_ab = machine("a", "Ready", &["high-cpu", "virtual"]);
        let (base_doc, _) = build_document(&machine("a", "Ready", &[]), family, None, None);
        let (doc_a, _) = build_document(&m_a, family, None, None);
        let (doc_b, _) = build_document(&m_b, family, None, None);
        let (doc_ab, _) = build_document(&m_ab, family, None, None);

        // Rule segments start right after the base commands; preamble tag lines differ.
        let base_len = base_doc.runcmd.len() - 4;
        let seg = |d: &ConfigDocument| d.runcmd[base_len..d.runcmd.len() - 4].to_vec();
        let mut expected = seg(&doc_a);
        expected.extend(seg(&doc_b));
        assert_eq!(seg(&doc_ab), expected);
        for p in doc_a.packages.iter().chain(&doc_b.packages) {
            assert!(doc_ab.packages.contains(p));
        }
    }

    #[test]
    fn batch_renders_one_document_per_machine() {
        let machines = vec![
            machine("aaa", "Ready", &["high-cpu", "gpu"]),
            machine("bbb", "Ready", &["gpu", "virtual"]),
        ];
        let cred = Credential::new("ops", SECRET);
        let batch = render_batch(&machines, &input("jammy", Some(&cred)), Utc::now()).unwrap();

        assert_eq!(batch.machines.len(), 2);
        assert_eq!(batch.machines[0].system_id, "aaa");
        assert!(batch.machines[0].config.contains("hostname: aaa-host"));
        assert!(batch.machines[1].config.contains("hostname: bbb-host"));
        assert_eq!(batch.tags, vec!["gpu", "high-cpu", "virtual"]);
        assert!(batch.has_enhancements);
        assert!(batch.summary.contains("display only"));
        assert!(batch.summary.contains(REDACTION_MARKER));
        assert!(!batch.summary.contains(SECRET));
    }

    #[test]
    fn serialized_rendering_never_exposes_secret() {
        let m = machine("ht3nrd", "Ready", &[]);
        let cred = Credential::new("ops", SECRET);
        let out = render_machine(&m, &input("jammy", Some(&cred)), Utc::now()).unwrap();
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains(SECRET));
        assert!(json.contains("display_config"));
    }
}

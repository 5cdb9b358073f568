use serde::Serialize;

/// Typed cloud-config document. Field order is emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigDocument {
    pub packages: Vec<String>,
    pub ssh_pwauth: bool,
    pub disable_root: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserAccount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub write_files: Vec<WriteFile>,
    pub runcmd: Vec<String>,
    pub hostname: String,
    pub final_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAccount {
    pub name: String,
    pub plain_text_passwd: String,
    pub sudo: SudoRule,
    pub shell: String,
    pub groups: Vec<String>,
    pub lock_passwd: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_user_group: Option<bool>,
}

/// cloud-init accepts either form; RedHat images only honour the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SudoRule {
    Single(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFile {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl WriteFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            permissions: None,
        }
    }

    pub fn executable(mut self) -> Self {
        self.permissions = Some("0755".to_string());
        self
    }
}

impl ConfigDocument {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            ssh_pwauth: true,
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Appends a package unless it is already listed.
    pub fn add_package(&mut self, name: &str) {
        if !self.packages.iter().any(|p| p == name) {
            self.packages.push(name.to_string());
        }
    }

    pub fn add_packages<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.add_package(name);
        }
    }

    /// A later write to the same path replaces the content in place.
    pub fn write_file(&mut self, file: WriteFile) {
        match self.write_files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => *existing = file,
            None => self.write_files.push(file),
        }
    }

    pub fn run(&mut self, command: impl Into<String>) {
        self.runcmd.push(command.into());
    }

    pub fn run_all(&mut self, commands: impl IntoIterator<Item = String>) {
        self.runcmd.extend(commands);
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packages_keep_first_position_and_skip_duplicates() {
        let mut doc = ConfigDocument::new("node");
        doc.add_packages(["curl", "wget", "curl", "ethtool", "wget"]);
        assert_eq!(doc.packages, vec!["curl", "wget", "ethtool"]);
    }

    #[test]
    fn write_file_last_write_wins() {
        let mut doc = ConfigDocument::new("node");
        doc.write_file(WriteFile::new("/etc/a.conf", "one"));
        doc.write_file(WriteFile::new("/etc/b.conf", "two"));
        doc.write_file(WriteFile::new("/etc/a.conf", "three"));
        assert_eq!(doc.write_files.len(), 2);
        assert_eq!(doc.write_files[0].path, "/etc/a.conf");
        assert_eq!(doc.write_files[0].content, "three");
    }

    #[test]
    fn yaml_emits_sections_in_declared_order() {
        let mut doc = ConfigDocument::new("node-7");
        doc.add_package("curl");
        doc.run("mkdir -p /var/log");
        doc.final_message = "done".into();
        let yaml = doc.to_yaml().unwrap();

        let packages = yaml.find("packages:").unwrap();
        let runcmd = yaml.find("runcmd:").unwrap();
        let hostname = yaml.find("hostname: node-7").unwrap();
        assert!(packages < runcmd && runcmd < hostname);
        assert!(!yaml.contains("users:"));
        assert!(!yaml.contains("write_files:"));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed["ssh_pwauth"], serde_yaml::Value::Bool(true));
        assert_eq!(parsed["disable_root"], serde_yaml::Value::Bool(false));
    }

    #[test]
    fn sudo_rule_serializes_untagged() {
        let single = serde_yaml::to_string(&SudoRule::Single("ALL=(ALL) NOPASSWD:ALL".into())).unwrap();
        assert_eq!(single.trim(), "ALL=(ALL) NOPASSWD:ALL");
        let list = serde_yaml::to_string(&SudoRule::List(vec!["x".into()])).unwrap();
        assert_eq!(list.trim(), "- x");
    }
}

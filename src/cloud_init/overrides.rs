//! User-supplied overrides.
//!
//! The snippet is not parsed as YAML. Only lines shaped like list items
//! (`- cmd`) that do not log or control services are appended as commands;
//! every other line is dropped and counted in a single comment.

use super::document::ConfigDocument;

const USER_COMMANDS_MARKER: &str = "# User-provided commands:";
const RESERVED_TOKENS: &[&str] = &["echo", "systemctl"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserOverrides {
    pub commands: Vec<String>,
    pub ignored: usize,
}

impl UserOverrides {
    pub fn parse(snippet: &str) -> Self {
        let mut overrides = Self::default();
        for line in snippet.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.strip_prefix("- ") {
                Some(command)
                    if !command.trim().is_empty()
                        && !RESERVED_TOKENS.iter().any(|t| line.contains(t)) =>
                {
                    overrides.commands.push(command.trim().to_string());
                }
                _ => overrides.ignored += 1,
            }
        }
        overrides
    }

    pub fn apply_to(&self, doc: &mut ConfigDocument) {
        if !self.commands.is_empty() {
            doc.run(USER_COMMANDS_MARKER);
            doc.run_all(self.commands.iter().cloned());
        }
        if self.ignored > 0 {
            doc.run(format!(
                "# {} user-data line(s) ignored: only list items without echo/systemctl are applied",
                self.ignored
            ));
        }
    }
}

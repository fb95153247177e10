//! Completion gate.
//!
//! Runs the project's test workflow when the agent asks to stop and vetoes
//! the stop while it fails. Projects that declare no scripts are left alone.

use std::path::Path;
use std::time::Duration;

use crate::manifest::ScriptManifest;
use crate::process::{CommandSpec, ProcessOutcome, run_bounded};
use crate::settings::{CompletionSettings, ManifestSettings, Settings};

/// Progress of one completion check.
///
/// `Checking` is the only non-terminal state and is left exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// No declared test workflow.
    NotApplicable,
    Checking,
    Pass,
    Fail,
    /// The gate itself failed; treated as pass.
    GateError,
}

impl CompletionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Checking)
    }

    pub fn allows_stop(&self) -> bool {
        !matches!(self, Self::Fail)
    }
}

/// One test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunResult {
    pub success: bool,
    pub timed_out: bool,
    pub combined_output: String,
    pub command_used: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub state: CompletionState,
    pub run: Option<TestRunResult>,
    /// Set exactly when `state` is `Fail`.
    pub reason: Option<String>,
}

impl CompletionOutcome {
    fn terminal(state: CompletionState) -> Self {
        Self {
            state,
            run: None,
            reason: None,
        }
    }
}

pub struct CompletionGate {
    settings: CompletionSettings,
    manifest: ManifestSettings,
}

impl CompletionGate {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.completion.clone(),
            manifest: settings.manifest.clone(),
        }
    }

    /// Decide whether the agent may stop working in `project_dir`.
    pub async fn evaluate(&self, project_dir: &Path) -> CompletionOutcome {
        if !self.settings.enabled {
            return CompletionOutcome::terminal(CompletionState::NotApplicable);
        }

        let manifest = match ScriptManifest::load(project_dir, &self.manifest) {
            Ok(Some(m)) if !m.is_empty() => m,
            Ok(_) => {
                tracing::debug!("No declared scripts, completion gate not applicable");
                return CompletionOutcome::terminal(CompletionState::NotApplicable);
            }
            Err(e) => {
                tracing::warn!("Completion gate not applicable: {}", e);
                return CompletionOutcome::terminal(CompletionState::NotApplicable);
            }
        };

        let command = resolve_test_command(&manifest, &self.settings);
        let mut state = CompletionState::Checking;
        tracing::debug!(command = %command, ?state, "Running test workflow");

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let outcome = match run_bounded(&CommandSpec::shell(&command), project_dir, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Completion gate error, allowing stop: {}", e);
                state = CompletionState::GateError;
                return CompletionOutcome::terminal(state);
            }
        };

        let run = TestRunResult {
            success: matches!(outcome, ProcessOutcome::Completed { success: true, .. }),
            timed_out: outcome == ProcessOutcome::TimedOut,
            combined_output: outcome.combined_output(),
            command_used: command,
        };

        let reason = if run.success {
            state = CompletionState::Pass;
            None
        } else {
            state = CompletionState::Fail;
            let reason = self.block_reason(&run);
            tracing::info!(
                target: "audit",
                completion_gate = "block",
                command = %run.command_used,
                timed_out = run.timed_out,
            );
            Some(reason)
        };

        CompletionOutcome {
            state,
            run: Some(run),
            reason,
        }
    }

    fn block_reason(&self, run: &TestRunResult) -> String {
        if run.timed_out {
            return format!(
                "Tests did not finish within {} seconds, so completion could not be verified.\n\n\
                 Test command: {}\n\n\
                 Check for hanging tests or infinite loops before stopping.",
                self.settings.timeout_secs, run.command_used
            );
        }

        let (output, cut) = tail(&run.combined_output, self.settings.max_output_length);
        let marker = if cut { "[earlier output truncated]\n" } else { "" };
        format!(
            "Tests are still failing. You must fix all test failures before stopping.\n\n\
             Test command: {}\n\n\
             Output:\n{}{}",
            run.command_used,
            marker,
            output.trim_end()
        )
    }
}

/// The command that runs the project's tests.
///
/// `test` wins; then the first fallback script present; then the
/// configured default.
pub fn resolve_test_command(manifest: &ScriptManifest, settings: &CompletionSettings) -> String {
    if manifest.contains("test") {
        return format!("{} test", settings.runner);
    }
    settings
        .fallback_scripts
        .iter()
        .find(|name| manifest.contains(name))
        .map(|name| format!("{} run {}", settings.runner, name))
        .unwrap_or_else(|| settings.default_command.clone())
}

/// Last `max` bytes of `s` on a char boundary, and whether anything was cut.
fn tail(s: &str, max: usize) -> (&str, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    (&s[start..], true)
}

//! Command guard for blocking destructive shell commands.
//!
//! Evaluation is two-phase and stops at the first hit:
//! 1. **Danger packs**: the compiled [`PatternLibrary`] is scanned in its
//!    fixed category order. The first matching rule decides the category, so
//!    a command is never reported twice.
//! 2. **Protected resources**: only when no pack matched, the substring
//!    heuristic in [`ProtectedResources`] runs.
//!
//! The guard only reads the command text. It never runs it.

use crate::decision::{Decision, Veto};
use crate::error::GateError;
use crate::settings::SafetySettings;

use super::patterns::{Category, PatternLibrary};
use super::protected::ProtectedResources;

/// Evaluates shell commands for destructive patterns.
///
/// Designed to be created once (at startup) and called on every shell command.
pub struct CommandGuard {
    enabled: bool,
    library: PatternLibrary,
    protected: ProtectedResources,
}

impl CommandGuard {
    /// Create a command guard with the built-in packs.
    pub fn new(settings: &SafetySettings) -> Result<Self, GateError> {
        Ok(Self {
            enabled: settings.enabled,
            library: PatternLibrary::builtin()?,
            protected: ProtectedResources::new(&settings.protected_resources)?,
        })
    }

    /// Evaluate a shell command.
    ///
    /// Returns `Allow` for safe commands and `Deny` for dangerous ones.
    pub fn check(&self, command: &str) -> Decision {
        if !self.enabled || command.trim().is_empty() {
            return Decision::Allow;
        }

        if let Some(rule) = self.library.first_match(command) {
            tracing::info!(
                target: "audit",
                command_guard = "block",
                category = %rule.category,
                pattern = rule.name,
                severity = %rule.severity,
                command = truncate(command, 120),
            );
            return Decision::Deny(Veto {
                category: rule.category.as_str().to_string(),
                reason: rule.reason.to_string(),
                suggestion: rule.suggestion.map(String::from),
            });
        }

        if let Some(name) = self.protected.find_targeted(command) {
            tracing::info!(
                target: "audit",
                command_guard = "block",
                category = %Category::ProtectedResource,
                resource = name,
                command = truncate(command, 120),
            );
            return Decision::deny(
                Category::ProtectedResource.as_str(),
                format!("Cannot modify/delete '{}' - this file is protected", name),
            );
        }

        tracing::debug!(command = truncate(command, 80), "Command guard allowed");
        Decision::Allow
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }
}

/// Truncate a string for log/display purposes.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let end = s
            .char_indices()
            .nth(max)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..end]
    }
}

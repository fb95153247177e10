//! Command validator.
//!
//! Rejects commands that cannot do what they claim before they run:
//! - `npm run <script>` (and friends) naming a script the manifest lacks
//! - forced pushes that name a protected branch
//! - `rm` / `mv` / `cp` whose primary target does not exist
//!
//! Checks run in that order and the first failing check wins. Only the
//! manifest and the filesystem are read; nothing is written.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::decision::{Decision, Veto};
use crate::error::GateError;
use crate::manifest::ScriptManifest;
use crate::safety::truncate;
use crate::settings::{ManifestSettings, Settings, ValidatorSettings};

/// File operations whose primary target must exist, in check order.
const FILE_OPERATIONS: [(&str, &str); 3] = [("rm", "remove"), ("mv", "move"), ("cp", "copy")];

pub struct CommandValidator {
    settings: ValidatorSettings,
    manifest: ManifestSettings,
    script_re: Regex,
    push_re: Regex,
    file_ops: Vec<(Regex, &'static str)>,
}

impl CommandValidator {
    pub fn new(settings: &Settings) -> Result<Self, GateError> {
        let runners = settings
            .validator
            .script_runners
            .iter()
            .map(|r| regex::escape(r))
            .collect::<Vec<_>>()
            .join("|");
        let script_re = compile(&format!(
            r#"(?m)(?:\b(?:{runners})\s+run(?:-script)?|^\s*run)\s+(?:-{{1,2}}[\w-]+(?:=\S*)?\s+)*['"]?([^\s;&|<>()'"]+)"#
        ))?;
        let push_re = compile(r"\bgit\s+push\b([^;&|\n]*)")?;
        let file_ops = FILE_OPERATIONS
            .iter()
            .map(|(cmd, op)| {
                compile(&format!(r"(?m)(?:^|[;&|(])\s*(?:sudo\s+)?{cmd}\s+([^;&|\n]*)"))
                    .map(|re| (re, *op))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            settings: settings.validator.clone(),
            manifest: settings.manifest.clone(),
            script_re,
            push_re,
            file_ops,
        })
    }

    /// Validate `command` as if run from `cwd`.
    pub fn check(&self, command: &str, cwd: &Path) -> Decision {
        if !self.settings.enabled || command.trim().is_empty() {
            return Decision::Allow;
        }

        let veto = self
            .check_scripts(command, cwd)
            .or_else(|| self.check_force_push(command))
            .or_else(|| self.check_paths(command, cwd));

        match veto {
            Some(veto) => {
                tracing::info!(
                    target: "audit",
                    validator = "block",
                    category = %veto.category,
                    reason = %veto.reason,
                    command = truncate(command, 120),
                );
                Decision::Deny(veto)
            }
            None => Decision::Allow,
        }
    }

    fn check_scripts(&self, command: &str, cwd: &Path) -> Option<Veto> {
        let mut names = self
            .script_re
            .captures_iter(command)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .peekable();
        names.peek()?;

        let manifest = match ScriptManifest::load(cwd, &self.manifest) {
            Ok(m) => m,
            Err(e) => {
                warn!("Treating manifest as declaring no scripts: {}", e);
                None
            }
        };
        let file = &self.manifest.file;

        for name in names {
            let Some(manifest) = manifest.as_ref().filter(|m| !m.is_empty()) else {
                return Some(veto(
                    "missing-script",
                    format!(
                        "Script '{}' does not exist: {} not found or has no scripts section.",
                        name, file
                    ),
                ));
            };
            if manifest.contains(name) {
                debug!(script = name, "Script reference ok");
                continue;
            }

            let max = self.settings.max_listed_scripts;
            let available: Vec<&str> = manifest.names().collect();
            let more = if available.len() > max { "..." } else { "" };
            let listed = available
                .iter()
                .take(max)
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            return Some(veto(
                "missing-script",
                format!(
                    "Script '{}' does not exist in {}. Available scripts: {}{}",
                    name, file, listed, more
                ),
            ));
        }
        None
    }

    fn check_force_push(&self, command: &str) -> Option<Veto> {
        for caps in self.push_re.captures_iter(command) {
            let args = words(caps.get(1).map_or("", |m| m.as_str()));
            if !args.iter().any(|a| is_force_flag(a)) {
                continue;
            }
            let protected = args
                .iter()
                .filter(|a| !a.starts_with('-'))
                .flat_map(|a| refspec_branches(a))
                .find(|b| self.settings.protected_branches.iter().any(|p| p == b));
            if let Some(branch) = protected {
                return Some(Veto {
                    category: "git-history-rewrite".to_string(),
                    reason: format!(
                        "Force push to protected branch '{}' is blocked for safety.",
                        branch
                    ),
                    suggestion: Some(
                        "Use a regular push or create a pull request.".to_string(),
                    ),
                });
            }
        }
        None
    }

    fn check_paths(&self, command: &str, cwd: &Path) -> Option<Veto> {
        for (re, operation) in &self.file_ops {
            for caps in re.captures_iter(command) {
                let args = words(caps.get(1).map_or("", |m| m.as_str()));
                let Some(target) = primary_operand(&args) else {
                    continue;
                };
                if self.is_exempt(target) {
                    debug!(path = target, operation, "Path exempt from existence check");
                    continue;
                }
                if !resolve(target, cwd).is_some_and(|p| std::fs::symlink_metadata(p).is_ok()) {
                    return Some(veto(
                        "missing-path",
                        format!(
                            "Cannot {} '{}': file or directory does not exist.",
                            operation, target
                        ),
                    ));
                }
            }
        }
        None
    }

    fn is_exempt(&self, target: &str) -> bool {
        target.contains(['*', '?', '[', '$', '`'])
            || self
                .settings
                .ephemeral_dirs
                .iter()
                .any(|dir| target.starts_with(dir.as_str()))
    }
}

fn veto(category: &str, reason: String) -> Veto {
    Veto {
        category: category.to_string(),
        reason,
        suggestion: None,
    }
}

fn compile(pattern: &str) -> Result<Regex, GateError> {
    Regex::new(pattern).map_err(|source| GateError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// `--force`, `--force-with-lease`, `-f`, `-uf`, or a `+refspec`.
fn is_force_flag(arg: &str) -> bool {
    if let Some(long) = arg.strip_prefix("--") {
        return long.starts_with("force");
    }
    if let Some(short) = arg.strip_prefix('-') {
        return short.contains('f');
    }
    arg.starts_with('+')
}

/// Branch names a push argument refers to: `+src:dst` yields `src` and `dst`.
fn refspec_branches(arg: &str) -> impl Iterator<Item = &str> {
    arg.trim_start_matches('+')
        .split(':')
        .map(|part| part.strip_prefix("refs/heads/").unwrap_or(part))
        .filter(|part| !part.is_empty())
}

/// First argument after the flags, honoring a `--` terminator.
fn primary_operand(args: &[String]) -> Option<&str> {
    let mut flags_done = false;
    for arg in args {
        if !flags_done && arg == "--" {
            flags_done = true;
            continue;
        }
        if !flags_done && arg.starts_with('-') && arg.len() > 1 {
            continue;
        }
        // Redirections are not operands.
        if arg.starts_with('>') || arg.starts_with('<') || arg.starts_with("2>") {
            continue;
        }
        return Some(arg.as_str());
    }
    None
}

fn resolve(target: &str, cwd: &Path) -> Option<PathBuf> {
    if target == "~" {
        return dirs::home_dir();
    }
    if let Some(rest) = target.strip_prefix("~/") {
        return dirs::home_dir().map(|h| h.join(rest));
    }
    Some(cwd.join(target))
}

/// Split an argument string the way the shell would. Unbalanced quotes fall
/// back to plain whitespace splitting.
fn words(s: &str) -> Vec<String> {
    shell_words::split(s).unwrap_or_else(|e| {
        debug!(args = s, "Falling back to whitespace split: {}", e);
        s.split_whitespace().map(String::from).collect()
    })
}

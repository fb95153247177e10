//! Gate settings.
//!
//! Loaded from JSON with env var > explicit file > project file
//! (`<project>/.hookguard/settings.json`) > user file
//! (`~/.hookguard/settings.json`) > default priority. A missing or malformed
//! file falls back to defaults so a bad config never blocks the agent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory name used for both the project and the user settings file.
const SETTINGS_DIR: &str = ".hookguard";
const SETTINGS_FILE: &str = "settings.json";

/// All gate settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Project manifest location.
    #[serde(default)]
    pub manifest: ManifestSettings,

    /// Command validator (scripts, branches, paths).
    #[serde(default)]
    pub validator: ValidatorSettings,

    /// Safety pattern engine.
    #[serde(default)]
    pub safety: SafetySettings,

    /// Post-execution output classifier.
    #[serde(default)]
    pub classifier: ClassifierSettings,

    /// Completion (stop) gate.
    #[serde(default)]
    pub completion: CompletionSettings,

    /// Post-write lint relay.
    #[serde(default)]
    pub lint: LintSettings,
}

/// Where the name → command scripts map lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSettings {
    /// Manifest file name, relative to the project directory.
    #[serde(default = "default_manifest_file")]
    pub file: String,

    /// Top-level key holding the scripts object.
    #[serde(default = "default_scripts_key")]
    pub scripts_key: String,
}

fn default_manifest_file() -> String {
    "package.json".to_string()
}

fn default_scripts_key() -> String {
    "scripts".to_string()
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            file: default_manifest_file(),
            scripts_key: default_scripts_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Programs whose `run <name>` form must reference a declared script.
    #[serde(default = "default_script_runners")]
    pub script_runners: Vec<String>,

    /// Branches a forced push may never name explicitly.
    #[serde(default = "default_protected_branches")]
    pub protected_branches: Vec<String>,

    /// Path prefixes exempt from the existence check.
    #[serde(default = "default_ephemeral_dirs")]
    pub ephemeral_dirs: Vec<String>,

    /// How many candidate script names a veto lists before truncating.
    #[serde(default = "default_max_listed_scripts")]
    pub max_listed_scripts: usize,
}

fn default_script_runners() -> Vec<String> {
    ["npm", "pnpm", "yarn", "bun"].map(String::from).to_vec()
}

fn default_protected_branches() -> Vec<String> {
    ["main", "master"].map(String::from).to_vec()
}

fn default_ephemeral_dirs() -> Vec<String> {
    ["/tmp/", "/dev/"].map(String::from).to_vec()
}

fn default_max_listed_scripts() -> usize {
    5
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            script_runners: default_script_runners(),
            protected_branches: default_protected_branches(),
            ephemeral_dirs: default_ephemeral_dirs(),
            max_listed_scripts: default_max_listed_scripts(),
        }
    }
}

/// Safety pattern engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetySettings {
    /// Whether the danger-pattern scan runs (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Files and paths that must never be the target of a risky action.
    #[serde(default = "default_protected_resources")]
    pub protected_resources: Vec<String>,
}

fn default_protected_resources() -> Vec<String> {
    [
        // Environment & secrets
        ".env",
        ".env.local",
        ".env.production",
        ".env.development",
        ".env.staging",
        // Git
        ".git",
        ".gitignore",
        ".gitmodules",
        // Lock files
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Cargo.lock",
        "go.sum",
        "poetry.lock",
        "Gemfile.lock",
        "composer.lock",
        "Pipfile.lock",
        // CI/CD & container config
        ".github",
        ".gitlab-ci.yml",
        ".travis.yml",
        "Dockerfile",
        "docker-compose.yml",
        // Agent task state
        "prp.json",
        "progress.txt",
    ]
    .map(String::from)
    .to_vec()
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            protected_resources: default_protected_resources(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output shorter than this (in bytes) is not classified.
    #[serde(default = "default_min_output_len")]
    pub min_output_len: usize,
}

fn default_min_output_len() -> usize {
    10
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_output_len: default_min_output_len(),
        }
    }
}

/// Completion gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Script runner used to invoke manifest test scripts.
    #[serde(default = "default_runner")]
    pub runner: String,

    /// Conventional test-script names tried, in order, when there is no `test` script.
    #[serde(default = "default_fallback_scripts")]
    pub fallback_scripts: Vec<String>,

    /// Command used when the manifest names no test script at all.
    #[serde(default = "default_test_command")]
    pub default_command: String,

    /// Wall-clock bound on the test run.
    #[serde(default = "default_test_timeout")]
    pub timeout_secs: u64,

    /// Maximum bytes of captured output echoed back in a veto.
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,
}

fn default_runner() -> String {
    "npm".to_string()
}

fn default_fallback_scripts() -> Vec<String> {
    ["test:unit", "test:all", "jest", "vitest"]
        .map(String::from)
        .to_vec()
}

fn default_test_command() -> String {
    "npm test".to_string()
}

fn default_test_timeout() -> u64 {
    60
}

fn default_max_output_length() -> usize {
    8 * 1024
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            runner: default_runner(),
            fallback_scripts: default_fallback_scripts(),
            default_command: default_test_command(),
            timeout_secs: default_test_timeout(),
            max_output_length: default_max_output_length(),
        }
    }
}

/// Lint relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Linter executable.
    #[serde(default = "default_lint_program")]
    pub program: String,

    /// Arguments placed before the file path.
    #[serde(default = "default_lint_args")]
    pub args: Vec<String>,

    /// File extensions (without the dot) that get linted.
    #[serde(default = "default_lint_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_lint_timeout")]
    pub timeout_secs: u64,
}

fn default_lint_program() -> String {
    "npx".to_string()
}

fn default_lint_args() -> Vec<String> {
    ["eslint", "--no-error-on-unmatched-pattern"]
        .map(String::from)
        .to_vec()
}

fn default_lint_extensions() -> Vec<String> {
    ["js", "ts", "jsx", "tsx"].map(String::from).to_vec()
}

fn default_lint_timeout() -> u64 {
    30
}

impl Default for LintSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_lint_program(),
            args: default_lint_args(),
            extensions: default_lint_extensions(),
            timeout_secs: default_lint_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Get the user settings file path (~/.hookguard/settings.json).
    pub fn user_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_DIR)
            .join(SETTINGS_FILE)
    }

    /// Get the project settings file path (<project>/.hookguard/settings.json).
    pub fn project_path(project_dir: &Path) -> PathBuf {
        project_dir.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Pick the settings file that applies: explicit path, else the project
    /// file if present, else the user file if present.
    pub fn resolve_path(explicit: Option<&Path>, project_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        [Self::project_path(project_dir), Self::user_path()]
            .into_iter()
            .find(|p| p.is_file())
    }

    /// Resolve, load and apply environment overrides.
    pub fn load(explicit: Option<&Path>, project_dir: &Path) -> Self {
        let mut settings = match Self::resolve_path(explicit, project_dir) {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Load settings from a specific path, returning default if missing or malformed.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Ignoring malformed settings: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Apply `HOOKGUARD_*` overrides through the given lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cmd) = lookup("HOOKGUARD_TEST_COMMAND").filter(|c| !c.trim().is_empty()) {
            self.completion.default_command = cmd;
        }
        if let Some(secs) = lookup("HOOKGUARD_TEST_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.completion.timeout_secs = secs;
        }
        if lookup("HOOKGUARD_LINT_DISABLED").is_some_and(|v| v == "1" || v == "true") {
            self.lint.enabled = false;
        }
    }

    /// Get a setting value by dotted path (e.g., "completion.timeout_secs").
    pub fn get(&self, path: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let pointer = format!("/{}", path.replace('.', "/"));
        json.pointer(&pointer).map(display_value)
    }

    /// Every leaf setting as a (dotted path, value) pair, sorted by path.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut leaves = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            flatten("", &json, &mut leaves);
        }
        leaves.sort();
        leaves
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, leaves: &mut Vec<(String, String)>) {
    let serde_json::Value::Object(section) = value else {
        leaves.push((prefix.to_string(), display_value(value)));
        return;
    };
    for (key, child) in section {
        match prefix {
            "" => flatten(key, child, leaves),
            _ => flatten(&format!("{prefix}.{key}"), child, leaves),
        }
    }
}

/// Strings print bare; everything else prints as JSON.
fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Post-execution output classifier.
//!
//! Sorts the output of a finished command into ENVIRONMENT, CODE or TIMEOUT
//! failures (scanned in that order, first match wins) and pulls out the first
//! source location and error message it can find. Purely advisory: the
//! classifier never blocks anything.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::GateError;
use crate::safety::patterns::compile;
use crate::settings::ClassifierSettings;

/// Failure family of a command's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorType {
    Environment,
    Code,
    Timeout,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "ENVIRONMENT",
            Self::Code => "CODE",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ClassDef {
    error_type: ErrorType,
    pattern: &'static str,
    reason: &'static str,
    suggestion: &'static str,
}

macro_rules! class {
    ($ty:ident, $pattern:literal, $reason:literal, $suggestion:literal) => {
        ClassDef {
            error_type: ErrorType::$ty,
            pattern: $pattern,
            reason: $reason,
            suggestion: $suggestion,
        }
    };
}

static CLASS_RULES: &[ClassDef] = &[
    // Environment
    class!(
        Environment,
        r"npm ERR!.*missing script",
        "npm script missing",
        "Check package.json for available scripts. Use 'npm run' to list all scripts."
    ),
    class!(
        Environment,
        r"ENOENT:? no such file or directory",
        "File or directory not found",
        "Verify the file path exists. Check for typos in the path."
    ),
    class!(
        Environment,
        r"(?:command not found|No such file or directory).*\b(?:npm|node|npx|yarn)\b",
        "Node.js command not found",
        "Ensure Node.js and npm are installed. Check the PATH environment variable."
    ),
    class!(
        Environment,
        r"Cannot find module",
        "Missing Node.js module",
        "Run 'npm install' to install dependencies. Check if the module name is correct."
    ),
    class!(
        Environment,
        r"MODULE_NOT_FOUND",
        "Module not found",
        "Install the missing dependency with 'npm install <package-name>'."
    ),
    class!(
        Environment,
        r"EACCES.*permission denied",
        "Permission denied",
        "Check file permissions. You may need to run with appropriate permissions."
    ),
    class!(
        Environment,
        r"Port \d+ is already in use",
        "Port already in use",
        "Stop the process using that port or use a different port."
    ),
    // Code
    class!(
        Code,
        r"SyntaxError:",
        "JavaScript/TypeScript syntax error",
        "Fix the syntax error. Check for missing brackets, semicolons, or typos."
    ),
    class!(
        Code,
        r"TypeError:",
        "Type error",
        "Check variable types and initialization. Common issue: calling a method on undefined/null."
    ),
    class!(
        Code,
        r"ReferenceError:",
        "Reference error",
        "Variable is not defined. Check if the variable name is correct and in scope."
    ),
    class!(
        Code,
        r"Test (?:failed|failure)",
        "Test failure",
        "Debug the failing test. Check test expectations vs actual behavior."
    ),
    class!(
        Code,
        r"\d+\s+(?:tests?|specs?|checks?)\s+(?:failing|failed)",
        "Tests failed",
        "Review failing tests. Fix code logic to pass tests."
    ),
    class!(
        Code,
        r"^FAIL\s+",
        "Test failure detected",
        "Review the failing tests and fix the code issues."
    ),
    class!(
        Code,
        r"Expected .* but (?:got|received)",
        "Assertion failure",
        "Check test assertions. Actual value doesn't match expected value."
    ),
    class!(
        Code,
        r"ESLint.*error",
        "Linting error",
        "Fix code style issues. Run 'npm run lint:fix' if available."
    ),
    // Timeout
    class!(
        Timeout,
        r"timeout|timed out|ETIMEDOUT",
        "Operation timed out",
        "Check for infinite loops or hanging operations. Increase the timeout if needed."
    ),
    class!(
        Timeout,
        r"killed|SIGTERM|SIGKILL",
        "Process killed",
        "Process was terminated. May be due to timeout or resource limits."
    ),
];

const UNKNOWN_REASON: &str = "Unclassified error";
const UNKNOWN_SUGGESTION: &str = "Review the error output carefully to understand the issue.";

/// Source extensions recognised in `path.ext:line[:column]` locations.
const SOURCE_EXTENSIONS: &str = "tsx|ts|jsx|js|mjs|cjs|rs|py|go|rb|java|kt|cpp|cc|c|hpp|h|cs|php|swift|vue|svelte|json|scss|css|html";

/// Which family an output belongs to, and what to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
    pub error_type: ErrorType,
    pub reason: &'static str,
    pub suggestion: &'static str,
    /// Source of the rule that matched; `None` for `UNKNOWN`.
    pub matched_pattern: Option<&'static str>,
}

/// Location and message pulled out of the output, independently of the family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorDetails {
    /// `file:line[:column]`, when a location was found.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        let line = self.line?;
        Some(match self.column {
            Some(col) => format!("{}:{}:{}", file, line, col),
            None => format!("{}:{}", file, line),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub classification: ErrorClassification,
    pub details: ErrorDetails,
}

impl Classification {
    pub fn error_type(&self) -> ErrorType {
        self.classification.error_type
    }

    /// Multi-line feedback shown to the agent.
    pub fn summary(&self) -> String {
        let c = &self.classification;
        let mut lines = vec![
            format!("Error classified as: {}", c.error_type),
            format!("Reason: {}", c.reason),
        ];
        if let Some(location) = self.details.location() {
            lines.push(format!("Location: {}", location));
        }
        if let Some(message) = &self.details.message {
            lines.push(format!("Message: {}", message));
        }
        lines.push(format!("Suggestion: {}", c.suggestion));
        lines.join("\n")
    }
}

struct ClassRule {
    def: &'static ClassDef,
    regex: Regex,
}

pub struct OutputClassifier {
    enabled: bool,
    min_output_len: usize,
    rules: Vec<ClassRule>,
    file_re: Regex,
    message_re: Regex,
}

impl OutputClassifier {
    pub fn new(settings: &ClassifierSettings) -> Result<Self, GateError> {
        let rules = CLASS_RULES
            .iter()
            .map(|def| compile(def.pattern).map(|regex| ClassRule { def, regex }))
            .collect::<Result<Vec<_>, _>>()?;
        let file_re = exact(&format!(
            r#"([^\s:()\[\]'"]+\.(?:{SOURCE_EXTENSIONS})):(\d+)(?::(\d+))?"#
        ))?;
        let message_re = exact(r"(?:Error|FAIL|ERR!):(.+)")?;

        Ok(Self {
            enabled: settings.enabled,
            min_output_len: settings.min_output_len,
            rules,
            file_re,
            message_re,
        })
    }

    /// Classify command output. `None` when there is nothing worth reporting.
    pub fn classify(&self, output: &str) -> Option<Classification> {
        if !self.enabled || output.len() < self.min_output_len {
            return None;
        }

        let classification = self
            .rules
            .iter()
            .find(|rule| rule.regex.is_match(output))
            .map(|rule| {
                tracing::debug!(pattern = rule.def.pattern, "Output classified");
                ErrorClassification {
                    error_type: rule.def.error_type,
                    reason: rule.def.reason,
                    suggestion: rule.def.suggestion,
                    matched_pattern: Some(rule.def.pattern),
                }
            })
            .unwrap_or(ErrorClassification {
                error_type: ErrorType::Unknown,
                reason: UNKNOWN_REASON,
                suggestion: UNKNOWN_SUGGESTION,
                matched_pattern: None,
            });

        Some(Classification {
            classification,
            details: self.extract_details(output),
        })
    }

    pub fn extract_details(&self, output: &str) -> ErrorDetails {
        let mut details = ErrorDetails::default();

        if let Some(caps) = self.file_re.captures(output) {
            let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
            if line.is_some() {
                details.file = caps.get(1).map(|m| m.as_str().to_string());
                details.line = line;
                details.column = caps.get(3).and_then(|m| m.as_str().parse().ok());
            }
        }

        details.message = self
            .message_re
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|m| !m.is_empty());

        details
    }
}

fn exact(pattern: &str) -> Result<Regex, GateError> {
    Regex::new(pattern).map_err(|source| GateError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Flatten a hook `tool_response` into the text to classify.
///
/// Strings pass through. Objects with `stdout` / `stderr` are joined
/// stdout first. Anything else is serialized as JSON.
pub fn response_text(response: &Value) -> String {
    match response {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) if obj.contains_key("stdout") || obj.contains_key("stderr") => {
            ["stdout", "stderr"]
                .iter()
                .filter_map(|key| obj.get(*key).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> OutputClassifier {
        OutputClassifier::new(&ClassifierSettings::default()).unwrap()
    }

    fn error_type(output: &str) -> Option<ErrorType> {
        classifier().classify(output).map(|c| c.error_type())
    }

    #[test]
    fn test_short_output_not_classified() {
        assert_eq!(classifier().classify("ok"), None);
        assert_eq!(classifier().classify(""), None);
    }

    #[test]
    fn test_type_error_with_location() {
        let result = classifier()
            .classify("TypeError: x is not a function\n    at foo.ts:10:4")
            .unwrap();
        assert_eq!(result.error_type(), ErrorType::Code);
        assert_eq!(result.classification.reason, "Type error");
        assert_eq!(result.details.file.as_deref(), Some("foo.ts"));
        assert_eq!(result.details.line, Some(10));
        assert_eq!(result.details.column, Some(4));
        assert_eq!(result.details.message.as_deref(), Some("x is not a function"));
    }

    #[test]
    fn test_environment_checked_before_code() {
        // Mentions both a missing module and a failing test.
        let output = "Error: Cannot find module 'lodash'\n1 test failed";
        assert_eq!(error_type(output), Some(ErrorType::Environment));
    }

    #[test]
    fn test_code_checked_before_timeout() {
        let output = "FAIL src/app.test.ts\n  Exceeded timeout of 5000 ms";
        assert_eq!(error_type(output), Some(ErrorType::Code));
    }

    #[test]
    fn test_families() {
        assert_eq!(
            error_type("npm ERR! missing script: deploy"),
            Some(ErrorType::Environment)
        );
        assert_eq!(
            error_type("Error: listen EADDRINUSE: Port 3000 is already in use"),
            Some(ErrorType::Environment)
        );
        assert_eq!(
            error_type("Tests: 3 tests failed, 10 passed"),
            Some(ErrorType::Code)
        );
        assert_eq!(
            error_type("Expected 4 but received 5"),
            Some(ErrorType::Code)
        );
        assert_eq!(
            error_type("request to registry failed, reason: ETIMEDOUT"),
            Some(ErrorType::Timeout)
        );
        assert_eq!(
            error_type("the worker was Killed by the OOM reaper"),
            Some(ErrorType::Timeout)
        );
    }

    #[test]
    fn test_unknown_fallback() {
        let result = classifier().classify("something odd happened here").unwrap();
        assert_eq!(result.error_type(), ErrorType::Unknown);
        assert_eq!(result.classification.reason, "Unclassified error");
        assert_eq!(result.classification.matched_pattern, None);
    }

    #[test]
    fn test_fail_only_at_line_start() {
        assert_eq!(
            error_type("build step: FAILED quietly, no details"),
            Some(ErrorType::Unknown)
        );
        assert_eq!(
            error_type("PASS a.test.js\nFAIL b.test.js"),
            Some(ErrorType::Code)
        );
    }

    #[test]
    fn test_location_without_column() {
        let details = classifier().extract_details("error in src/lib.rs:42 here");
        assert_eq!(details.location().as_deref(), Some("src/lib.rs:42"));
        assert_eq!(details.column, None);
    }

    #[test]
    fn test_location_inside_parens() {
        let details = classifier().extract_details("    at run (/app/src/index.tsx:7:13)");
        assert_eq!(details.file.as_deref(), Some("/app/src/index.tsx"));
        assert_eq!(details.location().as_deref(), Some("/app/src/index.tsx:7:13"));
    }

    #[test]
    fn test_message_is_case_sensitive() {
        let details = classifier().extract_details("error: lowercase is ignored");
        assert_eq!(details.message, None);
        let details = classifier().extract_details("npm ERR!: network down\nmore");
        assert_eq!(details.message.as_deref(), Some("network down"));
    }

    #[test]
    fn test_summary_layout() {
        let result = classifier()
            .classify("TypeError: x is not a function\n    at foo.ts:10:4")
            .unwrap();
        assert_eq!(
            result.summary(),
            "Error classified as: CODE\n\
             Reason: Type error\n\
             Location: foo.ts:10:4\n\
             Message: x is not a function\n\
             Suggestion: Check variable types and initialization. \
             Common issue: calling a method on undefined/null."
        );
    }

    #[test]
    fn test_summary_without_details() {
        let result = classifier().classify("something odd happened here").unwrap();
        assert_eq!(
            result.summary(),
            "Error classified as: UNKNOWN\nReason: Unclassified error\n\
             Suggestion: Review the error output carefully to understand the issue."
        );
    }

    #[test]
    fn test_details_serialization_skips_missing() {
        let details = ErrorDetails {
            file: Some("a.ts".into()),
            line: Some(3),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&details).unwrap(),
            json!({"file": "a.ts", "line": 3})
        );
    }

    #[test]
    fn test_disabled_classifier() {
        let settings = ClassifierSettings {
            enabled: false,
            ..Default::default()
        };
        let c = OutputClassifier::new(&settings).unwrap();
        assert_eq!(c.classify("TypeError: boom at a.ts:1"), None);
    }

    #[test]
    fn test_response_text_shapes() {
        assert_eq!(response_text(&json!("plain")), "plain");
        assert_eq!(response_text(&Value::Null), "");
        assert_eq!(
            response_text(&json!({"stdout": "out", "stderr": "err", "interrupted": false})),
            "out\nerr"
        );
        assert_eq!(response_text(&json!({"stdout": "", "stderr": "err"})), "err");
        assert_eq!(response_text(&json!([1, 2])), "[1,2]");
    }
}

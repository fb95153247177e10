//! Hook request/response protocol.
//!
//! One JSON request arrives on stdin per event. The response body goes to
//! stdout; an empty body means allow. Every policy outcome exits 0.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::classifier::Classification;
use crate::error::GateError;

/// Incoming hook request. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HookInput {
    #[serde(alias = "toolName", deserialize_with = "null_as_default")]
    pub tool_name: String,

    #[serde(alias = "toolInput", deserialize_with = "null_as_default")]
    pub tool_input: ToolInput,

    /// Output of the finished tool call (post-execution events only).
    #[serde(alias = "toolResponse")]
    pub tool_response: Value,

    pub cwd: Option<PathBuf>,

    #[serde(alias = "hookEventName", deserialize_with = "null_as_default")]
    pub hook_event_name: String,

    #[serde(alias = "sessionId", deserialize_with = "null_as_default")]
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolInput {
    #[serde(deserialize_with = "null_as_default")]
    pub command: String,

    #[serde(alias = "filePath", deserialize_with = "null_as_default")]
    pub file_path: String,
}

/// An explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl HookInput {
    /// Parse a request body. Blank input is an empty request.
    pub fn parse(body: &str) -> Result<Self, GateError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(body)?)
    }
}

/// Response to one hook event.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutput {
    /// Empty body.
    Allow,
    /// Pre-execution veto.
    Deny { reason: String },
    /// Post-execution classification, advisory.
    Classified(Classification),
    /// Completion veto.
    Block { reason: String },
    /// Advisory context attached to a file write.
    Context { text: String },
}

impl HookOutput {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Response body, `None` for an empty body.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Allow => None,
            Self::Deny { reason } => Some(json!({
                "hookSpecificOutput": {
                    "hookEventName": "PreToolUse",
                    "permissionDecision": "deny",
                    "permissionDecisionReason": reason,
                }
            })),
            Self::Classified(c) => Some(json!({
                "decision": "allow",
                "reason": c.summary(),
                "hookSpecificOutput": {
                    "hookEventName": "PostToolUse",
                    "errorType": c.classification.error_type,
                    "errorReason": c.classification.reason,
                    "suggestion": c.classification.suggestion,
                    "details": c.details,
                }
            })),
            Self::Block { reason } => Some(json!({
                "decision": "block",
                "reason": reason,
            })),
            Self::Context { text } => Some(json!({
                "hookSpecificOutput": {
                    "hookEventName": "PostToolUse",
                    "additionalContext": text,
                }
            })),
        }
    }
}

//! Pre-execution gate decisions.

/// Outcome of a pre-execution gate. Never persisted; recomputed every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The command may run.
    Allow,
    /// The command must not run.
    Deny(Veto),
}

/// A policy veto. `reason` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Veto {
    /// Machine-readable rule family, e.g. `destructive-filesystem` or `missing-script`.
    pub category: String,
    /// Human-readable explanation of what was refused.
    pub reason: String,
    /// Optional safer alternative.
    pub suggestion: Option<String>,
}

impl Decision {
    pub fn deny(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Deny(Veto {
            category: category.into(),
            reason: reason.into(),
            suggestion: None,
        })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    pub fn veto(&self) -> Option<&Veto> {
        match self {
            Self::Allow => None,
            Self::Deny(veto) => Some(veto),
        }
    }

    /// Category of the veto, if any.
    pub fn category(&self) -> Option<&str> {
        self.veto().map(|v| v.category.as_str())
    }
}

impl Veto {
    /// Text shown to the agent as the denial reason.
    pub fn message(&self) -> String {
        let mut message = format!("[{}] {}", self.category, self.reason);
        if let Some(suggestion) = &self.suggestion {
            if !self.reason.ends_with('.') {
                message.push('.');
            }
            message.push(' ');
            message.push_str(suggestion);
        }
        message
    }
}

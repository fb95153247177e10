//! Protected-resource registry.
//!
//! A command is flagged when its text contains both a protected name and a
//! risky-action token. Both tests are plain substring containment (ASCII
//! case-insensitive), not command parsing: `cat notes.env > out` is flagged
//! the same as `rm .env`. Over-approximation is accepted here.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};

use crate::error::GateError;

/// Substrings that indicate removal, overwrite, truncation or relocation.
pub const RISKY_ACTIONS: &[&str] = &["rm ", "rm -", "> ", "truncate ", "shred ", "mv ", "unlink "];

/// Immutable list of names that must never be targeted by a risky action.
#[derive(Debug)]
pub struct ProtectedResources {
    names: Vec<String>,
    name_matcher: AhoCorasick,
    action_matcher: AhoCorasick,
}

impl ProtectedResources {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self, GateError> {
        let names: Vec<String> = names
            .iter()
            .map(|n| n.as_ref().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        let name_matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&names)?;
        let action_matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(RISKY_ACTIONS)?;
        Ok(Self {
            names,
            name_matcher,
            action_matcher,
        })
    }

    /// The first protected name (in registry order) present in a command that
    /// also contains a risky action.
    pub fn find_targeted(&self, command: &str) -> Option<&str> {
        if !self.action_matcher.is_match(command) {
            return None;
        }
        self.name_matcher
            .find_overlapping_iter(command)
            .map(|m| m.pattern().as_usize())
            .min()
            .map(|idx| self.names[idx].as_str())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SafetySettings;

    fn registry() -> ProtectedResources {
        ProtectedResources::new(&SafetySettings::default().protected_resources).unwrap()
    }

    #[test]
    fn test_risky_action_on_protected_name() {
        let r = registry();
        assert_eq!(r.find_targeted("rm package-lock.json"), Some("package-lock.json"));
        assert_eq!(r.find_targeted("mv Cargo.lock Cargo.lock.bak"), Some("Cargo.lock"));
        assert_eq!(r.find_targeted("echo '' > .gitignore"), Some(".git"));
        assert_eq!(r.find_targeted("shred -u .env"), Some(".env"));
    }

    #[test]
    fn test_reports_first_name_in_registry_order() {
        let r = registry();
        // `.env.local` contains `.env`, which is listed first.
        assert_eq!(r.find_targeted("rm .env.local"), Some(".env"));
        // `yarn.lock` appears earlier in the text but later in the registry.
        assert_eq!(
            r.find_targeted("rm yarn.lock package-lock.json"),
            Some("package-lock.json")
        );
    }

    #[test]
    fn test_needs_both_name_and_action() {
        let r = registry();
        assert_eq!(r.find_targeted("cat package-lock.json"), None);
        assert_eq!(r.find_targeted("rm -rf dist"), None);
        assert_eq!(r.find_targeted("git add .gitignore"), None);
    }

    #[test]
    fn test_substring_over_approximation() {
        let r = registry();
        // Action and name are unrelated, still flagged.
        assert_eq!(
            r.find_targeted("ls Dockerfile.dev && rm -rf tmp"),
            Some("Dockerfile")
        );
    }

    #[test]
    fn test_case_insensitive() {
        let r = registry();
        assert_eq!(r.find_targeted("RM dockerfile"), Some("Dockerfile"));
    }

    #[test]
    fn test_custom_registry() {
        let r = ProtectedResources::new(&["secrets.yaml", ""]).unwrap();
        assert_eq!(r.names(), ["secrets.yaml"]);
        assert_eq!(r.find_targeted("unlink secrets.yaml"), Some("secrets.yaml"));
        assert_eq!(r.find_targeted("rm .env"), None);
    }
}

//! Policy gates for command-executing coding agents.
//!
//! Each gate is a hook invoked once per agent event with a JSON request on
//! stdin and a JSON decision (or nothing) on stdout:
//!
//! - **Command validator** ([`validator`]): unknown scripts, forced pushes to
//!   protected branches, file operations on missing paths.
//! - **Safety engine** ([`safety`]): ordered danger packs and the
//!   protected-resource registry.
//! - **Output classifier** ([`classifier`]): advisory ENVIRONMENT / CODE /
//!   TIMEOUT triage of command output.
//! - **Completion gate** ([`completion`]): holds the session open while the
//!   project's tests fail.
//! - **Lint relay** ([`lint`]): reports linter findings on written files.
//!
//! Gate-internal failures never veto. [`gatekeeper::Gatekeeper`] logs them
//! and allows the event.

pub mod classifier;
pub mod completion;
pub mod decision;
pub mod error;
pub mod gatekeeper;
pub mod hook;
pub mod lint;
pub mod manifest;
pub mod process;
pub mod safety;
pub mod settings;
pub mod validator;

pub use decision::{Decision, Veto};
pub use error::{GateError, ManifestError};
pub use gatekeeper::{Gatekeeper, PreGates};
pub use hook::{HookInput, HookOutput};
pub use settings::Settings;

//! Safety pattern engine: ordered danger packs plus the protected-resource check.

mod command_guard;
pub mod patterns;
pub mod protected;

pub use command_guard::CommandGuard;
pub(crate) use command_guard::truncate;
pub use patterns::{Category, DangerPattern, PatternLibrary, Severity};
pub use protected::{ProtectedResources, RISKY_ACTIONS};

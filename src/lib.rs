//! foam-actuator - turn RL agent actions into simulator input edits
//!
//! Two stages per control step:
//! - [`template`]: expand a nested template with `{expression}` placeholders
//!   against the agent's variable bindings
//! - [`patch`]: rewrite the matching `field value;` entries in the target
//!   files under a case directory
//!
//! [`Actuator`] chains both for a fixed [`ActuationConfig`].

pub mod actuator;
pub mod binding;
pub mod config;
pub mod error;
pub mod expr;
pub mod patch;
pub mod template;

pub use actuator::{Actuator, StepReport};
pub use binding::{BindingSet, Scalar};
pub use config::ActuationConfig;
pub use error::{ActuationError, FixSuggestion, Result};
pub use expr::Evaluator;
pub use patch::{
    EntryUpdate, FileReport, KeyedEntryPatcher, Occurrences, PatchOptions, PatchReport,
    RegexTextPatcher, TextPatcher,
};
pub use template::{expand, TemplateExpander};

use std::path::Path;

use serde_json::Value;

/// Patch every group of `resolved` under `base_dir` with default options
///
/// Lenient: missing entries are skipped. Returns the first file failure, if
/// any, after all files have been attempted.
pub fn patch(base_dir: impl AsRef<Path>, resolved: &Value) -> Result<PatchReport> {
    KeyedEntryPatcher::default()
        .patch(base_dir.as_ref(), resolved)?
        .into_result()
}

//! Error types with fix suggestions
//!
//! Error code ranges:
//! - ACT-000-009: Binding set errors
//! - ACT-010-019: Expression / template errors
//! - ACT-020-029: Patch errors
//! - ACT-030-039: Configuration and IO errors

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ActuationError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum ActuationError {
    // ─────────────────────────────────────────────────────────────
    // Binding set (ACT-001 to ACT-003)
    // ─────────────────────────────────────────────────────────────

    #[error("ACT-001: {names} variable names but {values} values")]
    BindingLengthMismatch { names: usize, values: usize },

    #[error("ACT-002: Variable '{name}' is bound more than once")]
    DuplicateBinding { name: String },

    #[error("ACT-003: Invalid variable name '{name}'")]
    InvalidBindingName { name: String },

    // ─────────────────────────────────────────────────────────────
    // Expansion (ACT-010 to ACT-012)
    // ─────────────────────────────────────────────────────────────

    #[error("ACT-010: Unbound variable '{name}' in expression '{expression}'")]
    UnboundVariable { name: String, expression: String },

    #[error("ACT-011: Cannot evaluate '{expression}': {details}")]
    ExpressionEvaluation { expression: String, details: String },

    #[error("ACT-012: Malformed template: {details}")]
    MalformedTemplate { details: String },

    // ─────────────────────────────────────────────────────────────
    // Patching (ACT-020 to ACT-023)
    // ─────────────────────────────────────────────────────────────

    #[error("ACT-020: Malformed value mapping at '{path}': {details}")]
    MalformedMapping { path: String, details: String },

    #[error("ACT-021: Invalid section pattern '{pattern}': {details}")]
    InvalidSectionPattern { pattern: String, details: String },

    #[error("ACT-022: Target file '{}' unavailable: {source}", .path.display())]
    TargetFileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ACT-023: No '{field}' entry under section '{section}' in '{}'", .path.display())]
    MissingEntry {
        path: PathBuf,
        section: String,
        field: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Configuration (ACT-030 to ACT-031)
    // ─────────────────────────────────────────────────────────────

    #[error("ACT-030: Failed to parse configuration: {details}")]
    ConfigParse { details: String },

    #[error("ACT-031: IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActuationError {
    pub(crate) fn evaluation(expression: &str, details: impl Into<String>) -> Self {
        ActuationError::ExpressionEvaluation {
            expression: expression.to_string(),
            details: details.into(),
        }
    }

    pub(crate) fn malformed_template(details: impl Into<String>) -> Self {
        ActuationError::MalformedTemplate {
            details: details.into(),
        }
    }

    pub(crate) fn malformed_mapping(path: impl Into<String>, details: impl Into<String>) -> Self {
        ActuationError::MalformedMapping {
            path: path.into(),
            details: details.into(),
        }
    }

    /// True for errors raised while expanding a template (no file was touched)
    pub fn is_expansion_error(&self) -> bool {
        matches!(
            self,
            ActuationError::UnboundVariable { .. }
                | ActuationError::ExpressionEvaluation { .. }
                | ActuationError::MalformedTemplate { .. }
        )
    }
}

impl FixSuggestion for ActuationError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ActuationError::BindingLengthMismatch { .. } => {
                Some("Pass exactly one action value per declared variable")
            }
            ActuationError::DuplicateBinding { .. } => Some("Use unique variable names"),
            ActuationError::InvalidBindingName { .. } => {
                Some("Variable names must match [A-Za-z_][A-Za-z0-9_]*")
            }
            ActuationError::UnboundVariable { .. } => {
                Some("Declare the variable or fix the typo in the template expression")
            }
            ActuationError::ExpressionEvaluation { .. } => {
                Some("Only + - * / // % ** and parentheses over bound variables are supported")
            }
            ActuationError::MalformedTemplate { .. } => {
                Some("Check for stray '{' or '}' outside of {expression} placeholders")
            }
            ActuationError::MalformedMapping { .. } => {
                Some("Use group -> section -> field -> value nesting with scalar values")
            }
            ActuationError::InvalidSectionPattern { .. } => {
                Some("Section keys are regular expressions: escape special characters")
            }
            ActuationError::TargetFileUnavailable { .. } => {
                Some("Check the base directory and that each group names an existing file")
            }
            ActuationError::MissingEntry { .. } => {
                Some("Fix the section/field name or disable strict mode")
            }
            ActuationError::ConfigParse { .. } => Some("Check YAML/JSON syntax of the config"),
            ActuationError::Io(_) => Some("Check file path and permissions"),
        }
    }
}

impl From<serde_yaml::Error> for ActuationError {
    fn from(err: serde_yaml::Error) -> Self {
        ActuationError::ConfigParse {
            details: err.to_string(),
        }
    }
}

//! Actuation configuration
//!
//! Describes one control setup: where the simulator case lives, which
//! variables the agent controls (in action order), the boundary-condition
//! template and how patching behaves.
//!
//! ```yaml
//! base_dir: case/0
//! variables: [x, y, z]
//! template:
//!   U:
//!     JET1: { value: "({x} 0 0)" }
//!     JET2: { value: "(0 {y} 0)" }
//!   k:
//!     JET1: { value: "{0.5*x}" }
//! patch:
//!   strict: true
//!   occurrences: all
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::is_identifier;
use crate::error::{ActuationError, Result};
use crate::patch::PatchOptions;
use crate::template::TemplateExpander;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuationConfig {
    /// Directory holding the target files (one per template group)
    pub base_dir: PathBuf,
    /// Variable names, in the order the agent emits action values
    pub variables: Vec<String>,
    /// group → section → field → template string
    pub template: Value,
    #[serde(default)]
    pub patch: PatchOptions,
}

impl ActuationConfig {
    pub fn new(base_dir: impl Into<PathBuf>, variables: Vec<String>, template: Value) -> Self {
        Self {
            base_dir: base_dir.into(),
            variables,
            template,
            patch: PatchOptions::default(),
        }
    }

    pub fn with_patch_options(mut self, patch: PatchOptions) -> Self {
        self.patch = patch;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ActuationError::ConfigParse {
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file: `.json` is parsed as JSON, anything else as YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check variable names, template shape and placeholder references
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.variables.len());
        for name in &self.variables {
            if !is_identifier(name) {
                return Err(ActuationError::InvalidBindingName { name: name.clone() });
            }
            if seen.contains(&name) {
                return Err(ActuationError::DuplicateBinding { name: name.clone() });
            }
            seen.push(name);
        }

        let Value::Object(groups) = &self.template else {
            return Err(ActuationError::ConfigParse {
                details: "template must map group names to sections".to_string(),
            });
        };
        if let Some((group, _)) = groups.iter().find(|(_, sections)| !sections.is_object()) {
            return Err(ActuationError::ConfigParse {
                details: format!("template group '{}' must map section keys to fields", group),
            });
        }

        for (expression, ast) in TemplateExpander::new().placeholders(&self.template)? {
            let undeclared = ast
                .variables()
                .into_iter()
                .find(|name| !self.variables.iter().any(|declared| declared == name));
            if let Some(name) = undeclared {
                return Err(ActuationError::UnboundVariable {
                    name: name.to_string(),
                    expression,
                });
            }
        }
        Ok(())
    }
}

//! Actuator - one control step from action values to patched files
//!
//! ```text
//! action values ─▶ BindingSet ─▶ TemplateExpander ─▶ resolved mapping
//!                                                        │
//!                        base_dir/<group> ◀── KeyedEntryPatcher
//! ```

use serde_json::Value;
use tracing::{debug, info};

use crate::binding::{BindingSet, Scalar};
use crate::config::ActuationConfig;
use crate::error::Result;
use crate::patch::{KeyedEntryPatcher, PatchReport};
use crate::template::TemplateExpander;

/// Result of one control step
#[derive(Debug)]
pub struct StepReport {
    /// The mapping that was written
    pub resolved: Value,
    pub patch: PatchReport,
}

/// Drives expansion and patching for a fixed configuration
#[derive(Debug)]
pub struct Actuator {
    config: ActuationConfig,
    expander: TemplateExpander,
    patcher: KeyedEntryPatcher,
}

impl Actuator {
    pub fn new(config: ActuationConfig) -> Result<Self> {
        config.validate()?;
        let patcher = KeyedEntryPatcher::new(config.patch.clone());
        Ok(Self {
            config,
            expander: TemplateExpander::new(),
            patcher,
        })
    }

    pub fn config(&self) -> &ActuationConfig {
        &self.config
    }

    /// Bind `values` to the configured variable names, in order
    pub fn bindings<V>(&self, values: &[V]) -> Result<BindingSet>
    where
        V: Clone + Into<Scalar>,
    {
        BindingSet::from_pairs(&self.config.variables, values)
    }

    /// Expand the template without touching any file
    pub fn resolve<V>(&self, values: &[V]) -> Result<Value>
    where
        V: Clone + Into<Scalar>,
    {
        let bindings = self.bindings(values)?;
        self.expander.expand(&self.config.template, &bindings)
    }

    /// Expand the template and patch every target file
    ///
    /// Expansion errors abort before any file is opened. File-level failures
    /// are collected in the returned report.
    pub fn step<V>(&self, values: &[V]) -> Result<StepReport>
    where
        V: Clone + Into<Scalar>,
    {
        let resolved = self.resolve(values)?;
        debug!(resolved = %resolved, "resolved action mapping");

        let patch = self.patcher.patch(&self.config.base_dir, &resolved)?;
        info!(
            base_dir = %self.config.base_dir.display(),
            summary = %patch,
            "applied control step"
        );
        Ok(StepReport { resolved, patch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActuationError;
    use serde_json::json;

    fn config() -> ActuationConfig {
        ActuationConfig::new(
            "does/not/exist",
            vec!["x".to_string(), "y".to_string()],
            json!({"U": {"JET1": {"value": "({x} {y} 0)"}}}),
        )
    }

    #[test]
    fn resolve_is_a_dry_run() {
        let actuator = Actuator::new(config()).unwrap();
        let resolved = actuator.resolve(&[0.25, -1.0]).unwrap();
        assert_eq!(resolved, json!({"U": {"JET1": {"value": "(0.25 -1.0 0)"}}}));
    }

    #[test]
    fn wrong_action_count_is_rejected() {
        let actuator = Actuator::new(config()).unwrap();
        let err = actuator.step(&[1.0]).unwrap_err();
        assert!(matches!(err, ActuationError::BindingLengthMismatch { names: 2, values: 1 }));
    }

    #[test]
    fn missing_files_are_reported_not_raised() {
        let actuator = Actuator::new(config()).unwrap();
        let report = actuator.step(&[1, 2]).unwrap();
        assert!(!report.patch.is_success());
        assert!(matches!(
            report.patch.failures[0].1,
            ActuationError::TargetFileUnavailable { .. }
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config();
        bad.variables.push("x".to_string());
        assert!(Actuator::new(bad).is_err());
    }
}

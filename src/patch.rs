//! Keyed-entry patching of simulator input files
//!
//! Rewrites `field value;` entries inside named blocks of free-form text
//! without parsing the file grammar:
//!
//! ```text
//! JET1                              JET1
//! {                                 {
//!     type  fixedValue;     ──▶         type  fixedValue;
//!     value uniform (0 0 0);            value uniform (1 0 0);
//! }                                 }
//! ```
//!
//! Matching lives behind [`TextPatcher`] so a structured parser can replace
//! the regex strategy without touching expansion or file handling.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ActuationError, Result};

/// Field patched when a section maps straight to a value
pub const DEFAULT_FIELD: &str = "value";

/// How many matches of one (section, field) pair get rewritten
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurrences {
    /// Only the first match in the file
    #[default]
    First,
    /// Every non-overlapping match, e.g. a `JET(4|5)` disjunction
    All,
}

/// Patch behavior knobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOptions {
    /// Report a missing (section, field) pair instead of skipping it
    pub strict: bool,
    /// Write through a temp file + rename instead of truncating in place
    pub atomic: bool,
    pub occurrences: Occurrences,
}

/// One value to write: `field` under `section`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryUpdate {
    /// Section key, a regular expression (may be a disjunction)
    pub section: String,
    /// Literal field key
    pub field: String,
    /// Replacement text placed before the terminating `;`
    pub value: String,
}

impl EntryUpdate {
    pub fn new(section: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Flatten one group's `section → field → value` mapping into updates
///
/// A section mapped directly to a scalar is shorthand for its `value` field.
pub fn entry_updates(group: &str, sections: &Value) -> Result<Vec<EntryUpdate>> {
    let Value::Object(sections) = sections else {
        return Err(ActuationError::malformed_mapping(
            group,
            format!("expected section mapping, found {}", kind_of(sections)),
        ));
    };

    let mut updates = Vec::new();
    for (section, fields) in sections {
        match fields {
            Value::Object(fields) => {
                for (field, value) in fields {
                    let rendered = render_value(value)
                        .ok_or_else(|| mapping_error(group, section, Some(field), value))?;
                    updates.push(EntryUpdate::new(section, field, rendered));
                }
            }
            scalar => {
                let rendered =
                    render_value(scalar).ok_or_else(|| mapping_error(group, section, None, scalar))?;
                updates.push(EntryUpdate::new(section, DEFAULT_FIELD, rendered));
            }
        }
    }
    Ok(updates)
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn mapping_error(group: &str, section: &str, field: Option<&str>, value: &Value) -> ActuationError {
    let path = match field {
        Some(field) => format!("{}.{}.{}", group, section, field),
        None => format!("{}.{}", group, section),
    };
    ActuationError::malformed_mapping(path, format!("expected a scalar value, found {}", kind_of(value)))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text-level strategy for rewriting one entry
pub trait TextPatcher {
    /// Rewrite `update` in `content`, returning the new text and the number
    /// of replacements (0 when the entry was not found)
    fn patch_entry(&self, content: &str, update: &EntryUpdate) -> Result<(String, usize)>;
}

/// Regex strategy: `section` at a line end, any lines, then `field`,
/// whitespace, value, `;`
///
/// A leading `uniform` / `nonuniform` qualifier in the old value is kept
/// unless the new value brings its own.
#[derive(Debug, Default)]
pub struct RegexTextPatcher {
    occurrences: Occurrences,
    /// Compiled patterns keyed by (section, field)
    cache: DashMap<(String, String), Arc<Regex>>,
}

impl RegexTextPatcher {
    pub fn new(occurrences: Occurrences) -> Self {
        Self {
            occurrences,
            cache: DashMap::new(),
        }
    }

    /// Compile (with caching) the pattern for one (section, field) pair
    pub fn pattern(&self, section: &str, field: &str) -> Result<Arc<Regex>> {
        let key = (section.to_string(), field.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Arc::clone(&cached));
        }

        Regex::new(section).map_err(|e| ActuationError::InvalidSectionPattern {
            pattern: section.to_string(),
            details: e.to_string(),
        })?;

        let boundary = if field.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            r"\b"
        } else {
            ""
        };
        let source = format!(
            r"(?P<head>(?:{section})(?:\n.*?)*{boundary}{field}\s+)(?P<qualifier>(?:non)?uniform\s+)?(?P<old>.*);",
            section = section,
            boundary = boundary,
            field = regex::escape(field),
        );
        let regex = Regex::new(&source).map_err(|e| ActuationError::InvalidSectionPattern {
            pattern: section.to_string(),
            details: e.to_string(),
        })?;

        let regex = Arc::new(regex);
        self.cache.insert(key, Arc::clone(&regex));
        Ok(regex)
    }
}

fn has_qualifier(value: &str) -> bool {
    let value = value.trim_start();
    ["uniform", "nonuniform"].iter().any(|q| {
        value
            .strip_prefix(q)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })
}

impl TextPatcher for RegexTextPatcher {
    fn patch_entry(&self, content: &str, update: &EntryUpdate) -> Result<(String, usize)> {
        let regex = self.pattern(&update.section, &update.field)?;
        let keep_qualifier = !has_qualifier(&update.value);
        let limit = match self.occurrences {
            Occurrences::First => 1,
            Occurrences::All => 0,
        };

        let mut count = 0;
        let patched = regex.replacen(content, limit, |caps: &Captures| {
            count += 1;
            let qualifier = match caps.name("qualifier") {
                Some(q) if keep_qualifier => q.as_str(),
                _ => "",
            };
            format!("{}{}{};", &caps["head"], qualifier, update.value)
        });

        Ok((patched.into_owned(), count))
    }
}

/// Outcome for one (section, field) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub section: String,
    pub field: String,
    /// Number of replacements made (0 = not found, content untouched)
    pub replacements: usize,
}

/// What happened to one target file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub entries: Vec<EntryOutcome>,
}

impl FileReport {
    /// Entries that were rewritten at least once
    pub fn applied(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| e.replacements > 0)
    }

    /// Entries that matched nothing
    pub fn missing(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| e.replacements == 0)
    }

    pub fn is_complete(&self) -> bool {
        self.missing().next().is_none()
    }
}

/// Outcome of patching every group of a resolved mapping
#[derive(Debug, Default)]
pub struct PatchReport {
    pub files: Vec<FileReport>,
    /// Files that could not be patched; other files are unaffected
    pub failures: Vec<(PathBuf, ActuationError)>,
}

impl PatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn the first file failure into an error
    pub fn into_result(mut self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(self.failures.remove(0).1)
        }
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let applied: usize = self.files.iter().map(|r| r.applied().count()).sum();
        let missing: usize = self.files.iter().map(|r| r.missing().count()).sum();
        write!(
            f,
            "{} files patched, {} entries applied, {} missing, {} files failed",
            self.files.len(),
            applied,
            missing,
            self.failures.len()
        )
    }
}

/// Applies resolved value mappings to target files
#[derive(Debug)]
pub struct KeyedEntryPatcher<T: TextPatcher = RegexTextPatcher> {
    options: PatchOptions,
    text: T,
}

impl KeyedEntryPatcher {
    pub fn new(options: PatchOptions) -> Self {
        let text = RegexTextPatcher::new(options.occurrences);
        Self { options, text }
    }
}

impl Default for KeyedEntryPatcher {
    fn default() -> Self {
        Self::new(PatchOptions::default())
    }
}

impl<T: TextPatcher> KeyedEntryPatcher<T> {
    /// Use a custom text strategy
    pub fn with_text_patcher(options: PatchOptions, text: T) -> Self {
        Self { options, text }
    }

    pub fn options(&self) -> &PatchOptions {
        &self.options
    }

    /// Patch every group of `resolved` under `base_dir`
    ///
    /// Each top-level key names a file (`base_dir/<group>`). A failing file
    /// is recorded in the report and does not stop the others; only a
    /// non-mapping `resolved` fails the whole call.
    pub fn patch(&self, base_dir: &Path, resolved: &Value) -> Result<PatchReport> {
        let Value::Object(groups) = resolved else {
            return Err(ActuationError::malformed_mapping(
                "<root>",
                format!("expected group mapping, found {}", kind_of(resolved)),
            ));
        };

        let mut report = PatchReport::default();
        for (group, sections) in groups {
            let path = base_dir.join(group);
            let outcome = entry_updates(group, sections).and_then(|updates| self.patch_file(&path, &updates));
            match outcome {
                Ok(file) => report.files.push(file),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "target file not patched");
                    report.failures.push((path, err));
                }
            }
        }
        Ok(report)
    }

    /// Read `path`, apply `updates`, and write the whole content back
    ///
    /// In strict mode a missing entry aborts before anything is written.
    pub fn patch_file(&self, path: &Path, updates: &[EntryUpdate]) -> Result<FileReport> {
        let content = fs::read_to_string(path).map_err(|source| ActuationError::TargetFileUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

        let (patched, entries) = self.patch_content(&content, updates)?;
        let report = FileReport {
            path: path.to_path_buf(),
            entries,
        };

        if let Some(missing) = report.missing().next() {
            if self.options.strict {
                return Err(ActuationError::MissingEntry {
                    path: path.to_path_buf(),
                    section: missing.section.clone(),
                    field: missing.field.clone(),
                });
            }
            for entry in report.missing() {
                warn!(
                    path = %path.display(),
                    section = %entry.section,
                    field = %entry.field,
                    "entry not found, left unchanged"
                );
            }
        }

        self.write(path, &patched)?;
        info!(
            path = %path.display(),
            applied = report.applied().count(),
            missing = report.missing().count(),
            "patched target file"
        );
        Ok(report)
    }

    /// Apply `updates` to in-memory text, in order
    pub fn patch_content(&self, content: &str, updates: &[EntryUpdate]) -> Result<(String, Vec<EntryOutcome>)> {
        let mut current = content.to_string();
        let mut outcomes = Vec::with_capacity(updates.len());

        for update in updates {
            let (patched, replacements) = self.text.patch_entry(&current, update)?;
            debug!(
                section = %update.section,
                field = %update.field,
                replacements,
                "patched entry"
            );
            current = patched;
            outcomes.push(EntryOutcome {
                section: update.section.clone(),
                field: update.field.clone(),
                replacements,
            });
        }

        Ok((current, outcomes))
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        let unavailable = |source: std::io::Error| ActuationError::TargetFileUnavailable {
            path: path.to_path_buf(),
            source,
        };

        if !self.options.atomic {
            return fs::write(path, content).map_err(unavailable);
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(unavailable)?;
        tmp.write_all(content.as_bytes()).map_err(unavailable)?;
        tmp.as_file().sync_all().map_err(unavailable)?;
        tmp.persist(path).map_err(|e| unavailable(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JET_BLOCKS: &str = "\
inlet
{
    type            fixedValue;
    value           uniform (1 0 0);
}
JET1
{
    type            fixedValue;
    value           uniform (0 0 0);
}
JET4
{
    type            fixedValue;
    value           uniform 0;
}
JET5
{
    type            fixedValue;
    value           uniform 0;
}
";

    fn patch_str(patcher: &KeyedEntryPatcher, content: &str, updates: &[EntryUpdate]) -> (String, Vec<EntryOutcome>) {
        patcher.patch_content(content, updates).unwrap()
    }

    #[test]
    fn replaces_value_keeping_qualifier() {
        let patcher = KeyedEntryPatcher::default();
        let content = "JET1\n{\n  value uniform (0 0 0);\n}";
        let (patched, outcomes) = patch_str(&patcher, content, &[EntryUpdate::new("JET1", "value", "1")]);
        assert_eq!(patched, "JET1\n{\n  value uniform 1;\n}");
        assert_eq!(outcomes[0].replacements, 1);
    }

    #[test]
    fn new_qualifier_replaces_old_one() {
        let patcher = KeyedEntryPatcher::default();
        let content = "JET1\n{\n  value uniform (0 0 0);\n}";
        let (patched, _) = patch_str(
            &patcher,
            content,
            &[EntryUpdate::new("JET1", "value", "nonuniform List<scalar> 0()")],
        );
        assert_eq!(patched, "JET1\n{\n  value nonuniform List<scalar> 0();\n}");
    }

    #[test]
    fn only_target_block_changes() {
        let patcher = KeyedEntryPatcher::default();
        let (patched, _) = patch_str(&patcher, JET_BLOCKS, &[EntryUpdate::new("JET1", "value", "(2 0 0)")]);
        let expected = JET_BLOCKS.replacen("uniform (0 0 0)", "uniform (2 0 0)", 1);
        assert_eq!(patched, expected);
    }

    #[test]
    fn section_must_end_its_line() {
        let patcher = KeyedEntryPatcher::default();
        let content = "JET10\n{\n    value uniform 0;\n}\n";
        let (patched, outcomes) = patch_str(&patcher, content, &[EntryUpdate::new("JET1", "value", "5")]);
        assert_eq!(patched, content);
        assert_eq!(outcomes[0].replacements, 0);
    }

    #[test]
    fn field_key_needs_word_boundary() {
        let patcher = KeyedEntryPatcher::default();
        let content = "JET1\n{\n    Xvalue 3;\n    value 4;\n}\n";
        let (patched, _) = patch_str(&patcher, content, &[EntryUpdate::new("JET1", "value", "7")]);
        assert_eq!(patched, "JET1\n{\n    Xvalue 3;\n    value 7;\n}\n");
    }

    #[test]
    fn missing_pair_leaves_content_unchanged() {
        let patcher = KeyedEntryPatcher::default();
        let (patched, outcomes) = patch_str(&patcher, JET_BLOCKS, &[EntryUpdate::new("JET9", "value", "1")]);
        assert_eq!(patched, JET_BLOCKS);
        assert_eq!(outcomes[0].replacements, 0);
    }

    #[test]
    fn disjunction_patches_first_or_all() {
        let first = KeyedEntryPatcher::default();
        let (patched, outcomes) = patch_str(&first, JET_BLOCKS, &[EntryUpdate::new("JET(4|5)", "value", "6")]);
        assert_eq!(outcomes[0].replacements, 1);
        assert_eq!(patched.matches("uniform 6;").count(), 1);

        let all = KeyedEntryPatcher::new(PatchOptions {
            occurrences: Occurrences::All,
            ..PatchOptions::default()
        });
        let (patched, outcomes) = patch_str(&all, JET_BLOCKS, &[EntryUpdate::new("JET(4|5)", "value", "6")]);
        assert_eq!(outcomes[0].replacements, 2);
        assert_eq!(patched.matches("uniform 6;").count(), 2);
        assert!(patched.contains("uniform (0 0 0);"));
    }

    #[test]
    fn replacement_text_is_literal() {
        let patcher = KeyedEntryPatcher::default();
        let content = "JET1\n{\n    value uniform 0;\n}\n";
        let (patched, _) = patch_str(&patcher, content, &[EntryUpdate::new("JET1", "value", "$head \\1")]);
        assert!(patched.contains("value uniform $head \\1;"));
    }

    #[test]
    fn invalid_section_pattern() {
        let patcher = KeyedEntryPatcher::default();
        let err = patcher
            .patch_content(JET_BLOCKS, &[EntryUpdate::new("JET(4", "value", "1")])
            .unwrap_err();
        assert!(matches!(err, ActuationError::InvalidSectionPattern { .. }));
    }

    #[test]
    fn pattern_cache_reuses_compiled_regex() {
        let text = RegexTextPatcher::default();
        let a = text.pattern("JET1", "value").unwrap();
        let b = text.pattern("JET1", "value").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn entry_updates_flatten_sections() {
        let updates = entry_updates(
            "U",
            &json!({"JET1": {"value": "(1 0 0)", "gradient": 0.5}, "JET2": "(0 2 0)", "JET3": {"on": true}}),
        )
        .unwrap();
        assert_eq!(
            updates,
            vec![
                EntryUpdate::new("JET1", "value", "(1 0 0)"),
                EntryUpdate::new("JET1", "gradient", "0.5"),
                EntryUpdate::new("JET2", "value", "(0 2 0)"),
                EntryUpdate::new("JET3", "on", "true"),
            ]
        );
    }

    #[test]
    fn entry_updates_reject_nested_values() {
        let err = entry_updates("U", &json!({"JET1": {"value": [1, 2]}})).unwrap_err();
        assert!(matches!(err, ActuationError::MalformedMapping { path, .. } if path == "U.JET1.value"));
        assert!(entry_updates("U", &json!("flat")).is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: PatchOptions = serde_json::from_str(r#"{"occurrences": "all"}"#).unwrap();
        assert_eq!(
            options,
            PatchOptions {
                strict: false,
                atomic: false,
                occurrences: Occurrences::All
            }
        );
    }
}

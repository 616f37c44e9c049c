//! Template expansion - nested template + bindings → resolved value mapping
//!
//! A template is a nested JSON mapping whose string leaves may carry
//! `{expression}` placeholders:
//!
//! ```text
//! {"U": {"JET1": {"value": "({x} 0 0)"}, "JET(4|5)": {"value": "{x+y+z}"}}}
//! ```
//!
//! Expansion is a single text pass over the serialized template:
//! 1. serialize to pretty JSON
//! 2. double every structural brace (block delimiters at line boundaries)
//! 3. render: `{{`/`}}` collapse to literal braces, `{expr}` is evaluated
//! 4. parse the rendered text back into a mapping

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use tracing::debug;

use crate::binding::{pad_exponent, BindingSet, Scalar};
use crate::error::{ActuationError, Result};
use crate::expr::{parse, Evaluator, Expr};

/// Structural braces in pretty JSON: `{}` (empty object), `{` or `}` ending a
/// line, `}` before a comma, `}` ending the text
static STRUCTURAL_BRACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\}|\{\n|\}\n|\},|\}$").unwrap());

/// Escape for JSON string context (quotes stripped from serde_json's output)
fn escape_for_json(s: &str) -> Result<String> {
    let quoted = serde_json::to_string(s).map_err(|e| ActuationError::malformed_template(e.to_string()))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// Undo JSON string escaping inside a placeholder (`\"` → `"`)
fn unescape_json(raw: &str) -> Result<Cow<'_, str>> {
    if !raw.contains('\\') {
        return Ok(Cow::Borrowed(raw));
    }
    serde_json::from_str::<String>(&format!("\"{}\"", raw))
        .map(Cow::Owned)
        .map_err(|e| ActuationError::malformed_template(format!("bad escape in '{{{}}}': {}", raw, e)))
}

/// Serialize with 4-space indentation, keeping key order
fn to_pretty_json(template: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    template
        .serialize(&mut serializer)
        .map_err(|e| ActuationError::malformed_template(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ActuationError::malformed_template(e.to_string()))
}

/// Double every structural brace, leaving placeholder braces single
pub fn escape_structural_braces(text: &str) -> Cow<'_, str> {
    STRUCTURAL_BRACE_RE.replace_all(text, |caps: &Captures| {
        caps[0].replace('{', "{{").replace('}', "}}")
    })
}

/// Apply a placeholder format spec (`.3f`, `.2e`) to a value
fn apply_format_spec(value: &Scalar, spec: &str, expression: &str) -> Result<String> {
    let bad_spec = || ActuationError::evaluation(expression, format!("unsupported format spec ':{}'", spec));

    let Some(rest) = spec.strip_prefix('.') else {
        return Err(bad_spec());
    };
    let Some(kind) = rest.chars().last() else {
        return Err(bad_spec());
    };
    let precision: usize = rest[..rest.len() - kind.len_utf8()]
        .parse()
        .map_err(|_| bad_spec())?;
    let number = value.as_f64().ok_or_else(|| {
        ActuationError::evaluation(
            expression,
            format!("format spec ':{}' needs a number, got '{}'", spec, value.type_name()),
        )
    })?;

    match kind {
        'f' => Ok(format!("{:.*}", precision, number)),
        'e' => Ok(pad_exponent(&format!("{:.*e}", precision, number))),
        _ => Err(bad_spec()),
    }
}

/// Template expander
///
/// Stateless: each call takes the binding set explicitly, so one expander can
/// serve every control step.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExpander;

impl TemplateExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand `template` against `bindings` into a resolved value mapping
    ///
    /// Fails without returning partial results on the first unbound
    /// variable, bad expression, or unparsable rendered text.
    pub fn expand(&self, template: &Value, bindings: &BindingSet) -> Result<Value> {
        let serialized = to_pretty_json(template)?;
        let escaped = escape_structural_braces(&serialized);
        let evaluator = Evaluator::new(bindings);
        let rendered = render(&escaped, true, |source| evaluate_placeholder(&evaluator, source))?;

        let resolved: Value = serde_json::from_str(&rendered).map_err(|e| {
            ActuationError::malformed_template(format!("expanded text is not a valid mapping: {}", e))
        })?;

        debug!(
            variables = bindings.len(),
            bytes = rendered.len(),
            "expanded template"
        );
        Ok(resolved)
    }

    /// Render one template string (`"({x} 0 0)"` → `"(1 0 0)"`)
    ///
    /// `{{` and `}}` produce literal braces.
    pub fn expand_str(&self, template: &str, bindings: &BindingSet) -> Result<String> {
        let evaluator = Evaluator::new(bindings);
        render(template, false, |source| evaluate_placeholder(&evaluator, source))
    }

    /// Parse every placeholder of `template` without evaluating it
    ///
    /// Returns `(expression, ast)` pairs in template order, format specs
    /// stripped.
    pub fn placeholders(&self, template: &Value) -> Result<Vec<(String, Expr)>> {
        let serialized = to_pretty_json(template)?;
        let escaped = escape_structural_braces(&serialized);
        let mut found = Vec::new();
        render(&escaped, true, |source| {
            let (expression, _) = split_format_spec(source);
            let ast = parse(expression).map_err(|details| ActuationError::evaluation(expression, details))?;
            found.push((expression.to_string(), ast));
            Ok(String::new())
        })?;
        Ok(found)
    }
}

/// Walk `text`, collapsing `{{`/`}}` and replacing each `{placeholder}` with
/// the output of `on_placeholder`
fn render<F>(text: &str, json_context: bool, mut on_placeholder: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    // Early return when nothing needs evaluating
    if !text.contains(['{', '}']) {
        return Ok(text.to_string());
    }

    let mut result = String::with_capacity(text.len() + 64);
    let mut rest = text;

    while let Some(pos) = rest.find(['{', '}']) {
        result.push_str(&rest[..pos]);
        let brace = rest.as_bytes()[pos];
        let after = &rest[pos + 1..];

        if brace == b'}' {
            let Some(tail) = after.strip_prefix('}') else {
                return Err(ActuationError::malformed_template(format!(
                    "single '}}' at byte {}",
                    text.len() - rest.len() + pos
                )));
            };
            result.push('}');
            rest = tail;
            continue;
        }

        if let Some(tail) = after.strip_prefix('{') {
            result.push('{');
            rest = tail;
            continue;
        }

        let Some(end) = after.find('}') else {
            return Err(ActuationError::malformed_template(format!(
                "unterminated placeholder '{{{}'",
                after
            )));
        };
        let raw = &after[..end];
        // Placeholders live inside one JSON string, which never spans lines
        if json_context && raw.contains('\n') {
            return Err(ActuationError::malformed_template(format!(
                "unterminated placeholder '{{{}'",
                raw.lines().next().unwrap_or_default()
            )));
        }

        if json_context {
            let source = unescape_json(raw)?;
            result.push_str(&escape_for_json(&on_placeholder(source.as_ref())?)?);
        } else {
            result.push_str(&on_placeholder(raw)?);
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Split `expr:spec` at the last `:` outside string literals
fn split_format_spec(source: &str) -> (&str, Option<&str>) {
    let mut quote = None;
    let mut escaped = false;
    let mut split = None;

    for (i, c) in source.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ':' => split = Some(i),
            None => {}
        }
    }

    match split {
        Some(i) => (&source[..i], Some(source[i + 1..].trim())),
        None => (source, None),
    }
}

/// Evaluate `expr` or `expr:spec`
fn evaluate_placeholder(evaluator: &Evaluator<'_>, source: &str) -> Result<String> {
    let (expression, spec) = split_format_spec(source);
    let value = evaluator.evaluate(expression)?;
    match spec {
        Some(spec) => apply_format_spec(&value, spec, source),
        None => Ok(value.to_string()),
    }
}

/// Expand `template` with bindings built from parallel name / value sequences
///
/// Convenience wrapper around [`BindingSet::from_pairs`] and
/// [`TemplateExpander::expand`].
pub fn expand<N, V>(template: &Value, variable_names: &[N], variable_values: &[V]) -> Result<Value>
where
    N: AsRef<str>,
    V: Clone + Into<Scalar>,
{
    let bindings = BindingSet::from_pairs(variable_names, variable_values)?;
    TemplateExpander::new().expand(template, &bindings)
}

//! Binding set - one control step's variable values
//!
//! A `BindingSet` pairs variable names with the action values chosen by the
//! agent. It is built once per control step from two parallel sequences and
//! is the only namespace template expressions can see.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ActuationError, Result};

/// Scalar value bound to a variable or produced by an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Type name used in evaluation error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "str",
        }
    }

    /// Numeric view (ints widen to f64)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(_) => None,
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(i64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float(f64::from(v))
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => f.write_str(&format_float(*x)),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Render a float the way simulation inputs expect it
///
/// Shortest round-trip digits, always with a fractional part (`2.0`), and
/// exponent notation with a signed two-digit exponent outside `[1e-4, 1e16)`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let abs = x.abs();
    if (1e-4..1e16).contains(&abs) {
        let plain = format!("{}", x);
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        pad_exponent(&format!("{:e}", x))
    }
}

/// Rewrite Rust's `1.5e-7` exponent form as `1.5e-07`
pub(crate) fn pad_exponent(sci: &str) -> String {
    match sci.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => sci.to_string(),
    }
}

/// Check a variable name against `[A-Za-z_][A-Za-z0-9_]*` without regex
pub fn is_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Ordered variable name → value pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingSet {
    entries: Vec<(String, Scalar)>,
}

impl BindingSet {
    /// Create empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Build bindings from parallel name / value sequences
    ///
    /// Fails when the lengths differ, a name repeats, or a name is not a
    /// valid identifier.
    pub fn from_pairs<N, V>(names: &[N], values: &[V]) -> Result<Self>
    where
        N: AsRef<str>,
        V: Clone + Into<Scalar>,
    {
        if names.len() != values.len() {
            return Err(ActuationError::BindingLengthMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let mut bindings = Self::new();
        for (name, value) in names.iter().zip(values) {
            bindings.insert(name.as_ref(), value.clone().into())?;
        }
        Ok(bindings)
    }

    /// Add one binding, rejecting duplicates and invalid names
    pub fn insert(&mut self, name: impl Into<String>, value: Scalar) -> Result<()> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(ActuationError::InvalidBindingName { name });
        }
        if self.get(&name).is_some() {
            return Err(ActuationError::DuplicateBinding { name });
        }
        self.entries.push((name, value));
        Ok(())
    }

    /// Get a bound value
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.entries
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
    }

    /// Names in binding order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_keeps_order() {
        let bindings = BindingSet::from_pairs(&["x", "y", "z"], &[1, 2, 3]).unwrap();
        assert_eq!(bindings.names().collect::<Vec<_>>(), vec!["x", "y", "z"]);
        assert_eq!(bindings.get("y"), Some(&Scalar::Int(2)));
        assert_eq!(bindings.get("w"), None);
    }

    #[test]
    fn from_pairs_rejects_length_mismatch() {
        let err = BindingSet::from_pairs(&["x", "y"], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ActuationError::BindingLengthMismatch { names: 2, values: 1 }
        ));
    }

    #[test]
    fn from_pairs_rejects_duplicates() {
        let err = BindingSet::from_pairs(&["x", "x"], &[1, 2]).unwrap_err();
        assert!(matches!(err, ActuationError::DuplicateBinding { name } if name == "x"));
    }

    #[test]
    fn insert_rejects_bad_names() {
        let mut bindings = BindingSet::new();
        for bad in ["", "1x", "a-b", "a.b", "__import__('os')"] {
            assert!(bindings.insert(bad, Scalar::Int(0)).is_err(), "{bad:?} accepted");
        }
        assert!(bindings.insert("_jet_1", Scalar::Int(0)).is_ok());
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn scalar_deserializes_untagged() {
        let values: Vec<Scalar> = serde_json::from_str(r#"[1, 0.5, "on"]"#).unwrap();
        assert_eq!(
            values,
            vec![Scalar::Int(1), Scalar::Float(0.5), Scalar::Text("on".into())]
        );
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(-3.25), "-3.25");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn scalar_display() {
        assert_eq!(Scalar::Int(6).to_string(), "6");
        assert_eq!(Scalar::Float(6.0).to_string(), "6.0");
        assert_eq!(Scalar::Text("(1 0 0)".into()).to_string(), "(1 0 0)");
    }
}

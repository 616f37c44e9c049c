//! Safe placeholder expression evaluation
//!
//! Expressions are parsed into a small arithmetic AST and evaluated against a
//! [`BindingSet`]. Nothing outside the binding set is reachable: there are no
//! builtins, calls, attributes or indexing.
//!
//! ```text
//! {x}            → value of x
//! {0.5*y*y}      → float arithmetic
//! {2*z**0.5}     → power binds tighter than *
//! {'(' + s + ')'} → string concatenation
//! ```

mod parser;

pub use parser::{parse, tokenize, BinaryOp, Expr, Token, UnaryOp};

use crate::binding::{BindingSet, Scalar};
use crate::error::{ActuationError, Result};

/// Longest string a placeholder may produce (1 MiB)
const MAX_TEXT_LEN: usize = 1 << 20;

/// Stateless evaluator borrowing one control step's bindings
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    bindings: &'a BindingSet,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a BindingSet) -> Self {
        Self { bindings }
    }

    /// Parse and evaluate `source`
    pub fn evaluate(&self, source: &str) -> Result<Scalar> {
        let expr = parse(source).map_err(|details| ActuationError::evaluation(source, details))?;
        self.eval(&expr, source)
    }

    /// Evaluate a parsed expression; `source` is only used in error messages
    pub fn eval(&self, expr: &Expr, source: &str) -> Result<Scalar> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => {
                self.bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ActuationError::UnboundVariable {
                        name: name.clone(),
                        expression: source.to_string(),
                    })
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, source)?;
                unary(*op, value).map_err(|details| ActuationError::evaluation(source, details))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, source)?;
                let rhs = self.eval(rhs, source)?;
                binary(*op, lhs, rhs).map_err(|details| ActuationError::evaluation(source, details))
            }
        }
    }
}

fn unary(op: UnaryOp, value: Scalar) -> std::result::Result<Scalar, String> {
    match (op, value) {
        (UnaryOp::Plus, v @ (Scalar::Int(_) | Scalar::Float(_))) => Ok(v),
        (UnaryOp::Neg, Scalar::Int(i)) => i
            .checked_neg()
            .map(Scalar::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (UnaryOp::Neg, Scalar::Float(f)) => Ok(Scalar::Float(-f)),
        (op, v) => Err(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        )),
    }
}

fn binary(op: BinaryOp, lhs: Scalar, rhs: Scalar) -> std::result::Result<Scalar, String> {
    use Scalar::{Float, Int, Text};

    match (op, lhs, rhs) {
        (_, Int(a), Int(b)) => int_op(op, a, b),
        (BinaryOp::Add, Text(a), Text(b)) => Ok(Text(a + &b)),
        (BinaryOp::Mul, Text(s), Int(n)) | (BinaryOp::Mul, Int(n), Text(s)) => repeat(&s, n),
        (op, a @ (Int(_) | Float(_)), b @ (Int(_) | Float(_))) => {
            // At least one side is a float here
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            float_op(op, a, b)
        }
        (op, a, b) => Err(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )),
    }
}

fn repeat(s: &str, n: i64) -> std::result::Result<Scalar, String> {
    let count = usize::try_from(n).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_TEXT_LEN => Ok(Scalar::Text(s.repeat(count))),
        _ => Err("repeated string too long".to_string()),
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> std::result::Result<Scalar, String> {
    let overflow = || "integer overflow".to_string();
    let value = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div => {
            if b == 0 {
                return Err("division by zero".to_string());
            }
            return Ok(Scalar::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err("integer division by zero".to_string());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && (a < 0) != (b < 0) {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err("integer modulo by zero".to_string());
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && (r < 0) != (b < 0) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err("zero cannot be raised to a negative power".to_string());
                }
                return Ok(Scalar::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Scalar::Int(value))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> std::result::Result<Scalar, String> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err("float division by zero".to_string());
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err("float floor division by zero".to_string());
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err("float modulo by zero".to_string());
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err("zero cannot be raised to a negative power".to_string());
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err("negative number raised to a fractional power".to_string());
            }
            let value = a.powf(b);
            if a.is_finite() && b.is_finite() && !value.is_finite() {
                return Err("numerical result out of range".to_string());
            }
            value
        }
    };
    Ok(Scalar::Float(value))
}

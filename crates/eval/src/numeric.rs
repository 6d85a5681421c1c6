//! Comparison and arithmetic over report values.
//!
//! Int and Decimal operands mix freely: Int is promoted to Decimal whenever
//! the other side is Decimal. All arithmetic is checked; overflow and
//! division by zero are errors, never panics. No `f64` anywhere.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use tabulon_model::{CompareOp, ScalarKind, Value, ValueKind};

use crate::error::EvalError;

// ──────────────────────────────────────────────
// Comparison
// ──────────────────────────────────────────────

/// Compare two values.
///
/// Null compares equal only to Null and supports only `=` and `!=`. Bool,
/// Text and Identifier support only `=` and `!=`; numbers, dates and
/// date-times support all operators.
pub fn compare(left: &Value, right: &Value, op: CompareOp) -> Result<bool, EvalError> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => {
            equality_only(left.is_null() && right.is_null(), op, "Null")
        }
        (Value::Int(l), Value::Int(r)) => Ok(ordered(l.cmp(r), op)),
        (Value::Decimal(l), Value::Decimal(r)) => Ok(ordered(l.cmp(r), op)),
        (Value::Int(l), Value::Decimal(r)) => Ok(ordered(Decimal::from(*l).cmp(r), op)),
        (Value::Decimal(l), Value::Int(r)) => Ok(ordered(l.cmp(&Decimal::from(*r)), op)),
        (Value::Date(l), Value::Date(r)) => Ok(ordered(l.cmp(r), op)),
        (Value::DateTime(l), Value::DateTime(r)) => Ok(ordered(l.cmp(r), op)),
        (Value::Bool(l), Value::Bool(r)) => equality_only(l == r, op, "Bool"),
        (Value::Text(l), Value::Text(r)) => equality_only(l == r, op, "Text"),
        (Value::Identifier(l), Value::Identifier(r)) => equality_only(l == r, op, "Identifier"),
        _ => Err(EvalError::InvalidOperation {
            message: format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            ),
        }),
    }
}

fn ordered(ordering: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn equality_only(equal: bool, op: CompareOp, type_name: &str) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => Ok(equal),
        CompareOp::Ne => Ok(!equal),
        other => Err(EvalError::InvalidOperation {
            message: format!(
                "operator '{}' not defined for {}; {} supports only = and !=",
                other.symbol(),
                type_name,
                type_name
            ),
        }),
    }
}

// ──────────────────────────────────────────────
// Arithmetic
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "addition",
            ArithOp::Subtract => "subtraction",
            ArithOp::Multiply => "multiplication",
            ArithOp::Divide => "division",
        }
    }
}

/// Apply `op` to two non-null numbers.
///
/// Int with Int stays Int (division truncates toward zero); any Decimal
/// operand makes the result Decimal.
pub fn apply(op: ArithOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => int_op(op, *l, *r).map(Value::Int),
        (Value::Decimal(l), Value::Decimal(r)) => decimal_op(op, *l, *r).map(Value::Decimal),
        (Value::Int(l), Value::Decimal(r)) => {
            decimal_op(op, Decimal::from(*l), *r).map(Value::Decimal)
        }
        (Value::Decimal(l), Value::Int(r)) => {
            decimal_op(op, *l, Decimal::from(*r)).map(Value::Decimal)
        }
        _ => Err(EvalError::InvalidOperation {
            message: format!(
                "{} not defined for {} and {}",
                op.name(),
                left.type_name(),
                right.type_name()
            ),
        }),
    }
}

fn int_op(op: ArithOp, l: i64, r: i64) -> Result<i64, EvalError> {
    let result = match op {
        ArithOp::Add => l.checked_add(r),
        ArithOp::Subtract => l.checked_sub(r),
        ArithOp::Multiply => l.checked_mul(r),
        ArithOp::Divide => {
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            l.checked_div(r)
        }
    };
    result.ok_or_else(|| EvalError::Overflow {
        message: format!("integer {} overflow", op.name()),
    })
}

fn decimal_op(op: ArithOp, l: Decimal, r: Decimal) -> Result<Decimal, EvalError> {
    let result = match op {
        ArithOp::Add => l.checked_add(r),
        ArithOp::Subtract => l.checked_sub(r),
        ArithOp::Multiply => l.checked_mul(r),
        ArithOp::Divide => {
            if r.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            l.checked_div(r)
        }
    };
    result.ok_or_else(|| EvalError::Overflow {
        message: format!("decimal {} overflow", op.name()),
    })
}

/// Fold an n-ary Sum or Multiply.
///
/// Null operands are skipped. With no non-null operand the result is Null
/// for an optional kind and the identity (0 or 1) otherwise.
pub fn fold(op: ArithOp, operands: &[Value], kind: &ValueKind) -> Result<Value, EvalError> {
    let mut acc: Option<Value> = None;
    for value in operands.iter().filter(|v| !v.is_null()) {
        acc = Some(match acc {
            None => value.clone(),
            Some(current) => apply(op, &current, value)?,
        });
    }
    match acc {
        Some(value) => conform(value, kind),
        None if kind.is_optional() => Ok(Value::Null),
        None => {
            let identity = if op == ArithOp::Multiply { 1 } else { 0 };
            conform(Value::Int(identity), kind)
        }
    }
}

/// Binary Subtract or Divide. A Null operand makes the result Null; the
/// Subtract and Divide protocols only allow that for optional kinds.
pub fn binary(
    op: ArithOp,
    left: &Value,
    right: &Value,
    kind: &ValueKind,
) -> Result<Value, EvalError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    conform(apply(op, left, right)?, kind)
}

/// Promote an Int result to Decimal when the declared kind is Decimal.
pub fn conform(value: Value, kind: &ValueKind) -> Result<Value, EvalError> {
    match (value, kind.scalar()) {
        (Value::Int(i), Some(ScalarKind::Decimal)) => Ok(Value::Decimal(Decimal::from(i))),
        (value, _) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn int_decimal_promotion_in_comparison() {
        assert!(compare(&Value::Int(2), &Value::Decimal(dec("2.0")), CompareOp::Eq).unwrap());
        assert!(compare(&Value::Decimal(dec("1.5")), &Value::Int(2), CompareOp::Lt).unwrap());
    }

    #[test]
    fn null_supports_only_equality() {
        assert!(compare(&Value::Null, &Value::Null, CompareOp::Eq).unwrap());
        assert!(compare(&Value::Null, &Value::Int(1), CompareOp::Ne).unwrap());
        assert!(compare(&Value::Null, &Value::Int(1), CompareOp::Lt).is_err());
    }

    #[test]
    fn text_rejects_ordering() {
        let a = Value::Text("a".into());
        let b = Value::Text("b".into());
        assert!(compare(&a, &b, CompareOp::Ne).unwrap());
        assert!(compare(&a, &b, CompareOp::Lt).is_err());
    }

    #[test]
    fn mismatched_types_cannot_compare() {
        assert!(compare(&Value::Int(1), &Value::Text("1".into()), CompareOp::Eq).is_err());
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(
            apply(ArithOp::Add, &Value::Int(2), &Value::Decimal(dec("0.5"))).unwrap(),
            Value::Decimal(dec("2.5"))
        );
        assert_eq!(
            apply(ArithOp::Divide, &Value::Int(7), &Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            apply(ArithOp::Divide, &Value::Decimal(dec("1")), &Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
        assert!(matches!(
            apply(ArithOp::Multiply, &Value::Int(i64::MAX), &Value::Int(2)),
            Err(EvalError::Overflow { .. })
        ));
    }

    #[test]
    fn fold_skips_nulls() {
        let kind = ValueKind::Optional(ScalarKind::Decimal);
        let values = vec![Value::Decimal(dec("1.25")), Value::Null, Value::Int(2)];
        assert_eq!(
            fold(ArithOp::Add, &values, &kind).unwrap(),
            Value::Decimal(dec("3.25"))
        );
        assert_eq!(
            fold(ArithOp::Add, &[Value::Null, Value::Null], &kind).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn empty_fold_is_identity_for_plain_kinds() {
        assert_eq!(fold(ArithOp::Add, &[], &ValueKind::INT).unwrap(), Value::Int(0));
        assert_eq!(
            fold(ArithOp::Multiply, &[], &ValueKind::DECIMAL).unwrap(),
            Value::Decimal(Decimal::ONE)
        );
    }

    #[test]
    fn binary_null_is_null() {
        let kind = ValueKind::Optional(ScalarKind::Int);
        assert_eq!(
            binary(ArithOp::Subtract, &Value::Int(3), &Value::Null, &kind).unwrap(),
            Value::Null
        );
        assert_eq!(
            binary(ArithOp::Subtract, &Value::Int(3), &Value::Int(5), &kind).unwrap(),
            Value::Int(-2)
        );
    }
}

//! Built-in protocols.
//!
//! One immutable [`ProtocolFactory`] per supported value kind, built on
//! first use and shared process-wide. Which operation tags a kind gets
//! depends on the kind: every kind can be a constant, a cell read, a
//! conditional or a signal; Bool gets logic and comparison; numeric kinds
//! get arithmetic; the structural kinds get the rule-chain operations.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tabulon_model::{Operation, OperationTag, ScalarKind, Value, ValueKind};

use super::{Protocol, ProtocolFactory};
use crate::context::{EvalContext, Phase};
use crate::error::EvalError;
use crate::numeric::{self, ArithOp};
use crate::rules;

static BUILTINS: OnceLock<DashMap<ValueKind, Arc<ProtocolFactory>>> = OnceLock::new();

/// The built-in factory for `kind`, built once per process.
pub fn factory_for(kind: &ValueKind) -> Arc<ProtocolFactory> {
    let cache = BUILTINS.get_or_init(DashMap::new);
    if let Some(factory) = cache.get(kind) {
        return Arc::clone(factory.value());
    }
    let entry = cache
        .entry(kind.clone())
        .or_insert_with(|| Arc::new(build_for(kind)));
    Arc::clone(entry.value())
}

fn build_for(kind: &ValueKind) -> ProtocolFactory {
    let mut builder = ProtocolFactory::builder(format!("builtin:{}", kind))
        .register_tags(&[OperationTag::GetConst], kind, Arc::new(Const))
        .register_tags(&[OperationTag::GetCellValue], kind, Arc::new(CellValue))
        .register_tags(&[OperationTag::IfThenElse], kind, Arc::new(Conditional))
        .register_tags(
            &[OperationTag::Abort, OperationTag::DeemNotApplicable],
            kind,
            Arc::new(Signal),
        );

    if *kind == ValueKind::BOOL {
        builder = builder
            .register_tags(&[OperationTag::HasCellValue], kind, Arc::new(HasValue))
            .register_tags(&[OperationTag::AndAlso, OperationTag::OrElse], kind, Arc::new(Logic))
            .register_tags(&[OperationTag::Not], kind, Arc::new(Not))
            .register_tags(&[OperationTag::Compare], kind, Arc::new(Compare));
    }

    if matches!(
        kind,
        ValueKind::Scalar(ScalarKind::Int | ScalarKind::Decimal)
            | ValueKind::Optional(ScalarKind::Int | ScalarKind::Decimal)
    ) {
        builder = builder.register_tags(
            &[
                OperationTag::Sum,
                OperationTag::Subtract,
                OperationTag::Multiply,
                OperationTag::Divide,
            ],
            kind,
            Arc::new(Arithmetic),
        );
    }

    match kind {
        ValueKind::BoolWithMessage => {
            builder = builder.register_tags(&[OperationTag::WithMessage], kind, Arc::new(WithMessage));
        }
        ValueKind::Validity => {
            builder = builder
                .register_tags(&[OperationTag::Validate], kind, Arc::new(Validate))
                .register_tags(&[OperationTag::GetValidity], kind, Arc::new(GetValidity));
        }
        ValueKind::Availability => {
            builder = builder
                .register_tags(&[OperationTag::CheckAvailability], kind, Arc::new(CheckAvailability))
                .register_tags(&[OperationTag::GetAvailability], kind, Arc::new(GetAvailability));
        }
        _ => {}
    }

    builder.build()
}

// ──────────────────────────────────────────────
// Value coercion
// ──────────────────────────────────────────────

pub(crate) fn expect_bool(value: Value, context: &str) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch {
            expected: ValueKind::BOOL,
            actual: other.type_name(),
            context: context.to_string(),
        }),
    }
}

/// Text, or `None` for a null message.
pub(crate) fn expect_text(value: Value, context: &str) -> Result<Option<String>, EvalError> {
    match value {
        Value::Text(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => Err(EvalError::TypeMismatch {
            expected: ValueKind::Optional(ScalarKind::Text),
            actual: other.type_name(),
            context: context.to_string(),
        }),
    }
}

fn unexpected(protocol: &str, op: &Operation) -> EvalError {
    EvalError::InvalidOperation {
        message: format!("{} protocol cannot evaluate {}", protocol, op.tag()),
    }
}

// ──────────────────────────────────────────────
// Leaves
// ──────────────────────────────────────────────

struct Const;

impl Protocol for Const {
    fn execute(&self, op: &Operation, _cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match op {
            Operation::GetConst { value, .. } => Ok(value.clone()),
            other => Err(unexpected("const", other)),
        }
    }
}

struct Signal;

impl Protocol for Signal {
    fn execute(&self, op: &Operation, _cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match op {
            Operation::Abort { message, .. } => Err(EvalError::Aborted(message.clone())),
            Operation::DeemNotApplicable { message, .. } => {
                Err(EvalError::NotApplicable(message.clone()))
            }
            other => Err(unexpected("signal", other)),
        }
    }
}

// ──────────────────────────────────────────────
// Cell access
// ──────────────────────────────────────────────

struct CellValue;

#[async_trait]
impl Protocol for CellValue {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match op {
            Operation::GetCellValue { locator, kind } => cx.get_value(locator, kind),
            other => Err(unexpected("cell value", other)),
        }
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        match op {
            Operation::GetCellValue { locator, kind } => cx.get_value_async(locator, kind).await,
            other => Err(unexpected("cell value", other)),
        }
    }
}

struct HasValue;

#[async_trait]
impl Protocol for HasValue {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match op {
            Operation::HasCellValue { locator } => cx.has_value(locator).map(Value::Bool),
            other => Err(unexpected("has value", other)),
        }
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        match op {
            Operation::HasCellValue { locator } => {
                cx.has_value_async(locator).await.map(Value::Bool)
            }
            other => Err(unexpected("has value", other)),
        }
    }
}

struct GetValidity;

#[async_trait]
impl Protocol for GetValidity {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::GetValidity { locator } = op else {
            return Err(unexpected("get validity", op));
        };
        cx.require_phase(
            op,
            &[Phase::Validation, Phase::AvailabilityCheck],
            "Validation or AvailabilityCheck",
        )?;
        cx.validity_of(locator).map(Value::Validity)
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::GetValidity { locator } = op else {
            return Err(unexpected("get validity", op));
        };
        cx.require_phase(
            op,
            &[Phase::Validation, Phase::AvailabilityCheck],
            "Validation or AvailabilityCheck",
        )?;
        cx.validity_of_async(locator).await.map(Value::Validity)
    }
}

struct GetAvailability;

#[async_trait]
impl Protocol for GetAvailability {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::GetAvailability { locator } = op else {
            return Err(unexpected("get availability", op));
        };
        cx.require_phase(op, &[Phase::AvailabilityCheck], "AvailabilityCheck")?;
        cx.availability_of(locator).map(Value::Availability)
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::GetAvailability { locator } = op else {
            return Err(unexpected("get availability", op));
        };
        cx.require_phase(op, &[Phase::AvailabilityCheck], "AvailabilityCheck")?;
        cx.availability_of_async(locator).await.map(Value::Availability)
    }
}

// ──────────────────────────────────────────────
// Control flow and logic
// ──────────────────────────────────────────────

struct Conditional;

#[async_trait]
impl Protocol for Conditional {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::IfThenElse {
            condition,
            then,
            otherwise,
            ..
        } = op
        else {
            return Err(unexpected("conditional", op));
        };
        if expect_bool(cx.evaluate(condition)?, "if condition")? {
            cx.evaluate(then)
        } else {
            cx.evaluate(otherwise)
        }
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::IfThenElse {
            condition,
            then,
            otherwise,
            ..
        } = op
        else {
            return Err(unexpected("conditional", op));
        };
        if expect_bool(cx.evaluate_async(condition).await?, "if condition")? {
            cx.evaluate_async(then).await
        } else {
            cx.evaluate_async(otherwise).await
        }
    }
}

/// AndAlso and OrElse, left to right with short-circuit. An empty AndAlso
/// is true and an empty OrElse is false.
struct Logic;

impl Logic {
    fn operands(op: &Operation) -> Result<(&[Operation], bool), EvalError> {
        match op {
            Operation::AndAlso(operands) => Ok((operands.as_slice(), false)),
            Operation::OrElse(operands) => Ok((operands.as_slice(), true)),
            other => Err(unexpected("logic", other)),
        }
    }
}

#[async_trait]
impl Protocol for Logic {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        // `decisive` is the operand value that settles the whole expression.
        let (operands, decisive) = Logic::operands(op)?;
        for operand in operands {
            if expect_bool(cx.evaluate(operand)?, "logical operand")? == decisive {
                return Ok(Value::Bool(decisive));
            }
        }
        Ok(Value::Bool(!decisive))
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let (operands, decisive) = Logic::operands(op)?;
        for operand in operands {
            if expect_bool(cx.evaluate_async(operand).await?, "logical operand")? == decisive {
                return Ok(Value::Bool(decisive));
            }
        }
        Ok(Value::Bool(!decisive))
    }
}

struct Not;

#[async_trait]
impl Protocol for Not {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::Not(operand) = op else {
            return Err(unexpected("not", op));
        };
        Ok(Value::Bool(!expect_bool(cx.evaluate(operand)?, "not operand")?))
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::Not(operand) = op else {
            return Err(unexpected("not", op));
        };
        let value = cx.evaluate_async(operand).await?;
        Ok(Value::Bool(!expect_bool(value, "not operand")?))
    }
}

struct Compare;

#[async_trait]
impl Protocol for Compare {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::Compare { left, op: cmp, right } = op else {
            return Err(unexpected("compare", op));
        };
        let left = cx.evaluate(left)?;
        let right = cx.evaluate(right)?;
        numeric::compare(&left, &right, *cmp).map(Value::Bool)
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::Compare { left, op: cmp, right } = op else {
            return Err(unexpected("compare", op));
        };
        let left = cx.evaluate_async(left).await?;
        let right = cx.evaluate_async(right).await?;
        numeric::compare(&left, &right, *cmp).map(Value::Bool)
    }
}

struct WithMessage;

#[async_trait]
impl Protocol for WithMessage {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::WithMessage { condition, message } = op else {
            return Err(unexpected("with message", op));
        };
        let value = expect_bool(cx.evaluate(condition)?, "message condition")?;
        let message = match message {
            Some(m) => expect_text(cx.evaluate(m)?, "message")?,
            None => None,
        };
        Ok(Value::BoolWithMessage { value, message })
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::WithMessage { condition, message } = op else {
            return Err(unexpected("with message", op));
        };
        let value = expect_bool(cx.evaluate_async(condition).await?, "message condition")?;
        let message = match message {
            Some(m) => expect_text(cx.evaluate_async(m).await?, "message")?,
            None => None,
        };
        Ok(Value::BoolWithMessage { value, message })
    }
}

// ──────────────────────────────────────────────
// Arithmetic
// ──────────────────────────────────────────────

enum Shape<'o> {
    Fold(ArithOp, &'o [Operation]),
    Binary(ArithOp, &'o Operation, &'o Operation),
}

struct Arithmetic;

impl Arithmetic {
    fn shape(op: &Operation) -> Result<(Shape<'_>, &ValueKind), EvalError> {
        match op {
            Operation::Sum { operands, kind } => Ok((Shape::Fold(ArithOp::Add, operands), kind)),
            Operation::Multiply { operands, kind } => {
                Ok((Shape::Fold(ArithOp::Multiply, operands), kind))
            }
            Operation::Subtract {
                minuend,
                subtrahend,
                kind,
            } => Ok((Shape::Binary(ArithOp::Subtract, minuend, subtrahend), kind)),
            Operation::Divide {
                numerator,
                denominator,
                kind,
            } => Ok((Shape::Binary(ArithOp::Divide, numerator, denominator), kind)),
            other => Err(unexpected("arithmetic", other)),
        }
    }

    /// A null operand leaves an optional result empty and a plain one
    /// missing.
    fn binary(
        cx: &EvalContext<'_>,
        arith: ArithOp,
        left: &Value,
        right: &Value,
        kind: &ValueKind,
    ) -> Result<Value, EvalError> {
        if (left.is_null() || right.is_null()) && !kind.is_optional() {
            return Err(EvalError::ValueMissing {
                cell: cx.current().map_or("<anonymous>", |c| c.label()).to_string(),
                reason: format!("{} of a null operand", arith.name()),
            });
        }
        numeric::binary(arith, left, right, kind)
    }
}

#[async_trait]
impl Protocol for Arithmetic {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match Arithmetic::shape(op)? {
            (Shape::Fold(arith, operands), kind) => {
                let values = operands
                    .iter()
                    .map(|o| cx.evaluate(o))
                    .collect::<Result<Vec<_>, _>>()?;
                numeric::fold(arith, &values, kind)
            }
            (Shape::Binary(arith, left, right), kind) => {
                let left = cx.evaluate(left)?;
                let right = cx.evaluate(right)?;
                Arithmetic::binary(cx, arith, &left, &right, kind)
            }
        }
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        match Arithmetic::shape(op)? {
            (Shape::Fold(arith, operands), kind) => {
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    values.push(cx.evaluate_async(operand).await?);
                }
                numeric::fold(arith, &values, kind)
            }
            (Shape::Binary(arith, left, right), kind) => {
                let left = cx.evaluate_async(left).await?;
                let right = cx.evaluate_async(right).await?;
                Arithmetic::binary(cx, arith, &left, &right, kind)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Rule chains
// ──────────────────────────────────────────────

struct Validate;

#[async_trait]
impl Protocol for Validate {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::Validate(chain) = op else {
            return Err(unexpected("validate", op));
        };
        rules::validate(chain, cx).map(Value::Validity)
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::Validate(chain) = op else {
            return Err(unexpected("validate", op));
        };
        rules::validate_async(chain, cx).await.map(Value::Validity)
    }
}

struct CheckAvailability;

#[async_trait]
impl Protocol for CheckAvailability {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::CheckAvailability(chain) = op else {
            return Err(unexpected("check availability", op));
        };
        rules::check_availability(chain, cx).map(Value::Availability)
    }

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Operation::CheckAvailability(chain) = op else {
            return Err(unexpected("check availability", op));
        };
        rules::check_availability_async(chain, cx)
            .await
            .map(Value::Availability)
    }
}

//! The operation AST.
//!
//! An `Operation` is an immutable tree describing a computation. Built-in
//! node kinds form a closed enum; `Custom` carries host-defined kinds that
//! are evaluated by protocols the host registers. Each node declares the
//! `ValueKind` it produces, and its `OperationTag` is what the dispatch
//! registry is keyed on.

use std::fmt;

use crate::chain::{AvailabilityCheckChain, ValidationChain};
use crate::locator::CellLocator;
use crate::value::{ReportValue, Value, ValueKind};

/// Comparison operators supported by `Operation::Compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Dispatch kind of an operation node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationTag {
    GetConst,
    GetCellValue,
    HasCellValue,
    IfThenElse,
    AndAlso,
    OrElse,
    Not,
    Compare,
    Sum,
    Subtract,
    Multiply,
    Divide,
    WithMessage,
    Validate,
    CheckAvailability,
    GetValidity,
    GetAvailability,
    Abort,
    DeemNotApplicable,
    Custom(String),
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationTag::Custom(name) => write!(f, "Custom({})", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A host-defined operation kind.
///
/// The engine treats it as opaque: the protocol registered for
/// `OperationTag::Custom(name)` interprets `args` and `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomOperation {
    pub name: String,
    pub result: ValueKind,
    pub args: Vec<Operation>,
    pub payload: serde_json::Value,
}

impl CustomOperation {
    pub fn new(name: impl Into<String>, result: ValueKind) -> Self {
        CustomOperation {
            name: name.into(),
            result,
            args: Vec::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_args(mut self, args: Vec<Operation>) -> Self {
        self.args = args;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetConst {
        value: Value,
        kind: ValueKind,
    },
    GetCellValue {
        locator: CellLocator,
        kind: ValueKind,
    },
    HasCellValue {
        locator: CellLocator,
    },
    IfThenElse {
        condition: Box<Operation>,
        then: Box<Operation>,
        otherwise: Box<Operation>,
        kind: ValueKind,
    },
    AndAlso(Vec<Operation>),
    OrElse(Vec<Operation>),
    Not(Box<Operation>),
    Compare {
        left: Box<Operation>,
        op: CompareOp,
        right: Box<Operation>,
    },
    Sum {
        operands: Vec<Operation>,
        kind: ValueKind,
    },
    Subtract {
        minuend: Box<Operation>,
        subtrahend: Box<Operation>,
        kind: ValueKind,
    },
    Multiply {
        operands: Vec<Operation>,
        kind: ValueKind,
    },
    Divide {
        numerator: Box<Operation>,
        denominator: Box<Operation>,
        kind: ValueKind,
    },
    /// Pairs a Bool condition with an optional Text message.
    WithMessage {
        condition: Box<Operation>,
        message: Option<Box<Operation>>,
    },
    Validate(Box<ValidationChain>),
    CheckAvailability(Box<AvailabilityCheckChain>),
    /// Another cell's validity. Only legal once validation is under way.
    GetValidity {
        locator: CellLocator,
    },
    /// Another cell's availability. Only legal during the availability phase.
    GetAvailability {
        locator: CellLocator,
    },
    Abort {
        message: Option<String>,
        kind: ValueKind,
    },
    DeemNotApplicable {
        message: Option<String>,
        kind: ValueKind,
    },
    Custom(CustomOperation),
}

impl Operation {
    pub fn tag(&self) -> OperationTag {
        match self {
            Operation::GetConst { .. } => OperationTag::GetConst,
            Operation::GetCellValue { .. } => OperationTag::GetCellValue,
            Operation::HasCellValue { .. } => OperationTag::HasCellValue,
            Operation::IfThenElse { .. } => OperationTag::IfThenElse,
            Operation::AndAlso(_) => OperationTag::AndAlso,
            Operation::OrElse(_) => OperationTag::OrElse,
            Operation::Not(_) => OperationTag::Not,
            Operation::Compare { .. } => OperationTag::Compare,
            Operation::Sum { .. } => OperationTag::Sum,
            Operation::Subtract { .. } => OperationTag::Subtract,
            Operation::Multiply { .. } => OperationTag::Multiply,
            Operation::Divide { .. } => OperationTag::Divide,
            Operation::WithMessage { .. } => OperationTag::WithMessage,
            Operation::Validate(_) => OperationTag::Validate,
            Operation::CheckAvailability(_) => OperationTag::CheckAvailability,
            Operation::GetValidity { .. } => OperationTag::GetValidity,
            Operation::GetAvailability { .. } => OperationTag::GetAvailability,
            Operation::Abort { .. } => OperationTag::Abort,
            Operation::DeemNotApplicable { .. } => OperationTag::DeemNotApplicable,
            Operation::Custom(c) => OperationTag::Custom(c.name.clone()),
        }
    }

    /// The kind of value this node produces.
    pub fn result_kind(&self) -> ValueKind {
        match self {
            Operation::GetConst { kind, .. }
            | Operation::GetCellValue { kind, .. }
            | Operation::IfThenElse { kind, .. }
            | Operation::Sum { kind, .. }
            | Operation::Subtract { kind, .. }
            | Operation::Multiply { kind, .. }
            | Operation::Divide { kind, .. }
            | Operation::Abort { kind, .. }
            | Operation::DeemNotApplicable { kind, .. } => kind.clone(),
            Operation::HasCellValue { .. }
            | Operation::AndAlso(_)
            | Operation::OrElse(_)
            | Operation::Not(_)
            | Operation::Compare { .. } => ValueKind::BOOL,
            Operation::WithMessage { .. } => ValueKind::BoolWithMessage,
            Operation::Validate(_) | Operation::GetValidity { .. } => ValueKind::Validity,
            Operation::CheckAvailability(_) | Operation::GetAvailability { .. } => {
                ValueKind::Availability
            }
            Operation::Custom(c) => c.result.clone(),
        }
    }

    // ── Constructors ─────────────────────────────

    pub fn constant<T: ReportValue>(value: T) -> Self {
        Operation::GetConst {
            value: value.into_value(),
            kind: T::kind(),
        }
    }

    pub fn literal(value: Value, kind: ValueKind) -> Self {
        Operation::GetConst { value, kind }
    }

    pub fn cell_value<T: ReportValue>(locator: CellLocator) -> Self {
        Operation::GetCellValue {
            locator,
            kind: T::kind(),
        }
    }

    pub fn cell_value_of(locator: CellLocator, kind: ValueKind) -> Self {
        Operation::GetCellValue { locator, kind }
    }

    pub fn has_value(locator: CellLocator) -> Self {
        Operation::HasCellValue { locator }
    }

    /// The result kind is taken from the `then` branch.
    pub fn if_then_else(condition: Operation, then: Operation, otherwise: Operation) -> Self {
        let kind = then.result_kind();
        Operation::IfThenElse {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
            kind,
        }
    }

    pub fn and_also(operands: Vec<Operation>) -> Self {
        Operation::AndAlso(operands)
    }

    pub fn or_else(operands: Vec<Operation>) -> Self {
        Operation::OrElse(operands)
    }

    pub fn negate(operand: Operation) -> Self {
        Operation::Not(Box::new(operand))
    }

    pub fn compare(left: Operation, op: CompareOp, right: Operation) -> Self {
        Operation::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn sum(kind: ValueKind, operands: Vec<Operation>) -> Self {
        Operation::Sum { operands, kind }
    }

    pub fn subtract(minuend: Operation, subtrahend: Operation) -> Self {
        let kind = minuend.result_kind();
        Operation::Subtract {
            minuend: Box::new(minuend),
            subtrahend: Box::new(subtrahend),
            kind,
        }
    }

    pub fn multiply(kind: ValueKind, operands: Vec<Operation>) -> Self {
        Operation::Multiply { operands, kind }
    }

    pub fn divide(numerator: Operation, denominator: Operation) -> Self {
        let kind = numerator.result_kind();
        Operation::Divide {
            numerator: Box::new(numerator),
            denominator: Box::new(denominator),
            kind,
        }
    }

    pub fn with_message(condition: Operation, message: Option<Operation>) -> Self {
        Operation::WithMessage {
            condition: Box::new(condition),
            message: message.map(Box::new),
        }
    }

    pub fn validate(chain: ValidationChain) -> Self {
        Operation::Validate(Box::new(chain))
    }

    pub fn check_availability(chain: AvailabilityCheckChain) -> Self {
        Operation::CheckAvailability(Box::new(chain))
    }

    pub fn abort<T: ReportValue>(message: Option<&str>) -> Self {
        Operation::Abort {
            message: message.map(str::to_string),
            kind: T::kind(),
        }
    }

    pub fn deem_not_applicable<T: ReportValue>(message: Option<&str>) -> Self {
        Operation::DeemNotApplicable {
            message: message.map(str::to_string),
            kind: T::kind(),
        }
    }

    pub fn custom(op: CustomOperation) -> Self {
        Operation::Custom(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarKind;
    use rust_decimal::Decimal;

    #[test]
    fn typed_constructors_declare_kinds() {
        assert_eq!(Operation::constant(3i64).result_kind(), ValueKind::INT);
        assert_eq!(
            Operation::cell_value::<Option<Decimal>>(CellLocator::in_section("x")).result_kind(),
            ValueKind::Optional(ScalarKind::Decimal)
        );
        assert_eq!(
            Operation::abort::<String>(Some("stop")).result_kind(),
            ValueKind::TEXT
        );
    }

    #[test]
    fn boolean_nodes_produce_bool() {
        let op = Operation::and_also(vec![
            Operation::constant(true),
            Operation::negate(Operation::constant(false)),
        ]);
        assert_eq!(op.tag(), OperationTag::AndAlso);
        assert_eq!(op.result_kind(), ValueKind::BOOL);
    }

    #[test]
    fn if_then_else_takes_kind_from_then_branch() {
        let op = Operation::if_then_else(
            Operation::constant(true),
            Operation::constant(Decimal::ONE),
            Operation::constant(Decimal::ZERO),
        );
        assert_eq!(op.result_kind(), ValueKind::DECIMAL);
    }

    #[test]
    fn custom_tag_carries_name() {
        let op = Operation::custom(CustomOperation::new("lookup_rate", ValueKind::DECIMAL));
        assert_eq!(op.tag(), OperationTag::Custom("lookup_rate".into()));
        assert_eq!(op.tag().to_string(), "Custom(lookup_rate)");
        assert_eq!(op.result_kind(), ValueKind::DECIMAL);
    }
}

//! Runtime values and the value kinds operations declare.
//!
//! Every operation declares the `ValueKind` it produces, and every value a
//! protocol returns is checked against that kind with [`ValueKind::admits`].
//! All numeric values use `rust_decimal::Decimal` or `i64` -- never `f64`.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::chain::{Availability, ValidationResult};

// ──────────────────────────────────────────────
// Kinds
// ──────────────────────────────────────────────

/// The scalar building blocks every composite kind is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    Int,
    Decimal,
    Text,
    Date,
    DateTime,
    Identifier,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 7] = [
        ScalarKind::Bool,
        ScalarKind::Int,
        ScalarKind::Decimal,
        ScalarKind::Text,
        ScalarKind::Date,
        ScalarKind::DateTime,
        ScalarKind::Identifier,
    ];

    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::Decimal)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "Bool",
            ScalarKind::Int => "Int",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Text => "Text",
            ScalarKind::Date => "Date",
            ScalarKind::DateTime => "DateTime",
            ScalarKind::Identifier => "Identifier",
        }
    }
}

/// The static result type of an operation, or the declared type of an
/// input cell.
///
/// This is the small closed set protocols are registered against. Host
/// applications that need a type outside of it use `Custom` and carry the
/// payload as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Scalar(ScalarKind),
    Optional(ScalarKind),
    NamedList(ScalarKind),
    BoolWithMessage,
    Validity,
    Availability,
    Custom(String),
}

impl ValueKind {
    pub const BOOL: ValueKind = ValueKind::Scalar(ScalarKind::Bool);
    pub const INT: ValueKind = ValueKind::Scalar(ScalarKind::Int);
    pub const DECIMAL: ValueKind = ValueKind::Scalar(ScalarKind::Decimal);
    pub const TEXT: ValueKind = ValueKind::Scalar(ScalarKind::Text);

    /// The kinds the engine registers built-in protocols for unless told
    /// otherwise: every scalar, its optional and named-list variants, and
    /// the structural kinds the rule chains produce.
    pub fn default_supported() -> Vec<ValueKind> {
        let mut kinds = Vec::with_capacity(ScalarKind::ALL.len() * 3 + 3);
        for scalar in ScalarKind::ALL {
            kinds.push(ValueKind::Scalar(scalar));
            kinds.push(ValueKind::Optional(scalar));
            kinds.push(ValueKind::NamedList(scalar));
        }
        kinds.push(ValueKind::BoolWithMessage);
        kinds.push(ValueKind::Validity);
        kinds.push(ValueKind::Availability);
        kinds
    }

    /// The underlying scalar for scalar and optional kinds.
    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            ValueKind::Scalar(s) | ValueKind::Optional(s) => Some(*s),
            _ => None,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ValueKind::Optional(_))
    }

    /// Int or Decimal, plain or optional.
    pub fn is_numeric(&self) -> bool {
        self.scalar().is_some_and(ScalarKind::is_numeric)
    }

    /// Whether `value` is a legal value of this kind.
    pub fn admits(&self, value: &Value) -> bool {
        match self {
            ValueKind::Scalar(s) => value.scalar_kind() == Some(*s),
            ValueKind::Optional(s) => value.is_null() || value.scalar_kind() == Some(*s),
            ValueKind::NamedList(s) => match value {
                Value::NamedList(items) => items.iter().all(|i| i.value.scalar_kind() == Some(*s)),
                _ => false,
            },
            ValueKind::BoolWithMessage => matches!(value, Value::BoolWithMessage { .. }),
            ValueKind::Validity => matches!(value, Value::Validity(_)),
            ValueKind::Availability => matches!(value, Value::Availability(_)),
            ValueKind::Custom(name) => {
                matches!(value, Value::Custom { type_name, .. } if type_name == name)
            }
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar(s) => write!(f, "{}", s.name()),
            ValueKind::Optional(s) => write!(f, "{}?", s.name()),
            ValueKind::NamedList(s) => write!(f, "NamedList<{}>", s.name()),
            ValueKind::BoolWithMessage => write!(f, "BoolWithMessage"),
            ValueKind::Validity => write!(f, "Validity"),
            ValueKind::Availability => write!(f, "Availability"),
            ValueKind::Custom(name) => write!(f, "Custom<{}>", name),
        }
    }
}

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// A named entry of a named-value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedValue {
    pub name: String,
    pub value: Value,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        NamedValue {
            name: name.into(),
            value,
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Date(Date),
    DateTime(OffsetDateTime),
    Identifier(String),
    /// The absent value of an optional kind.
    Null,
    NamedList(Vec<NamedValue>),
    BoolWithMessage {
        value: bool,
        message: Option<String>,
    },
    Validity(ValidationResult),
    Availability(Availability),
    Custom {
        type_name: String,
        payload: serde_json::Value,
    },
}

impl Value {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "Null".to_string(),
            Value::NamedList(_) => "NamedList".to_string(),
            Value::BoolWithMessage { .. } => "BoolWithMessage".to_string(),
            Value::Validity(_) => "Validity".to_string(),
            Value::Availability(_) => "Availability".to_string(),
            Value::Custom { type_name, .. } => format!("Custom<{}>", type_name),
            scalar => scalar
                .scalar_kind()
                .map(|s| s.name().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Bool(_) => Some(ScalarKind::Bool),
            Value::Int(_) => Some(ScalarKind::Int),
            Value::Decimal(_) => Some(ScalarKind::Decimal),
            Value::Text(_) => Some(ScalarKind::Text),
            Value::Date(_) => Some(ScalarKind::Date),
            Value::DateTime(_) => Some(ScalarKind::DateTime),
            Value::Identifier(_) => Some(ScalarKind::Identifier),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) | Value::Identifier(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Null => write!(f, "null"),
            Value::NamedList(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", item.name, item.value)?;
                }
                write!(f, "]")
            }
            Value::BoolWithMessage { value, message } => match message {
                Some(m) => write!(f, "{} ({})", value, m),
                None => write!(f, "{}", value),
            },
            Value::Validity(result) => write!(f, "{}", result),
            Value::Availability(a) => write!(f, "{}", a),
            Value::Custom { type_name, payload } => write!(f, "{}({})", type_name, payload),
        }
    }
}

// ──────────────────────────────────────────────
// Typed bridge
// ──────────────────────────────────────────────

/// A Rust type with a fixed `ValueKind`.
///
/// Typed constructors (`Operation::constant`, `Operation::cell_value::<T>`)
/// and typed reads on the agent go through this trait, so the declared
/// kind of an operation is decided at compile time.
pub trait ReportValue: Sized {
    fn kind() -> ValueKind;
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

/// A `ReportValue` whose kind is a plain scalar; these may be wrapped in
/// `Option` or in a named list.
pub trait ScalarValue: ReportValue {
    const SCALAR: ScalarKind;
}

/// Opaque identifier value (e.g. an external record key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(pub String);

macro_rules! scalar_value {
    ($ty:ty, $scalar:ident) => {
        impl ReportValue for $ty {
            fn kind() -> ValueKind {
                ValueKind::Scalar(ScalarKind::$scalar)
            }

            fn into_value(self) -> Value {
                Value::$scalar(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$scalar(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }

        impl ScalarValue for $ty {
            const SCALAR: ScalarKind = ScalarKind::$scalar;
        }
    };
}

scalar_value!(bool, Bool);
scalar_value!(i64, Int);
scalar_value!(Decimal, Decimal);
scalar_value!(String, Text);
scalar_value!(Date, Date);
scalar_value!(OffsetDateTime, DateTime);

impl ReportValue for Identifier {
    fn kind() -> ValueKind {
        ValueKind::Scalar(ScalarKind::Identifier)
    }

    fn into_value(self) -> Value {
        Value::Identifier(self.0)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Identifier(id) => Some(Identifier(id.clone())),
            _ => None,
        }
    }
}

impl ScalarValue for Identifier {
    const SCALAR: ScalarKind = ScalarKind::Identifier;
}

impl<T: ScalarValue> ReportValue for Option<T> {
    fn kind() -> ValueKind {
        ValueKind::Optional(T::SCALAR)
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Typed entry of a named-value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named<T> {
    pub name: String,
    pub value: T,
}

impl<T> Named<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Named {
            name: name.into(),
            value,
        }
    }
}

impl<T: ScalarValue> ReportValue for Vec<Named<T>> {
    fn kind() -> ValueKind {
        ValueKind::NamedList(T::SCALAR)
    }

    fn into_value(self) -> Value {
        Value::NamedList(
            self.into_iter()
                .map(|n| NamedValue::new(n.name, n.value.into_value()))
                .collect(),
        )
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::NamedList(items) => items
                .iter()
                .map(|item| T::from_value(&item.value).map(|v| Named::new(item.name.clone(), v)))
                .collect(),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn optional_admits_null_and_scalar() {
        let kind = ValueKind::Optional(ScalarKind::Int);
        assert!(kind.admits(&Value::Null));
        assert!(kind.admits(&Value::Int(3)));
        assert!(!kind.admits(&Value::Decimal(dec("3"))));
    }

    #[test]
    fn scalar_rejects_null() {
        assert!(!ValueKind::INT.admits(&Value::Null));
        assert!(ValueKind::TEXT.admits(&Value::Text("x".into())));
    }

    #[test]
    fn named_list_checks_every_element() {
        let kind = ValueKind::NamedList(ScalarKind::Decimal);
        let good = Value::NamedList(vec![
            NamedValue::new("a", Value::Decimal(dec("1.5"))),
            NamedValue::new("b", Value::Decimal(dec("2"))),
        ]);
        let bad = Value::NamedList(vec![NamedValue::new("a", Value::Int(1))]);
        assert!(kind.admits(&good));
        assert!(!kind.admits(&bad));
        assert!(kind.admits(&Value::NamedList(vec![])));
    }

    #[test]
    fn custom_kind_matches_type_name() {
        let kind = ValueKind::Custom("Money".into());
        let money = Value::Custom {
            type_name: "Money".into(),
            payload: serde_json::json!({"amount": "1.00", "currency": "EUR"}),
        };
        assert!(kind.admits(&money));
        assert!(!ValueKind::Custom("Other".into()).admits(&money));
    }

    #[test]
    fn default_supported_covers_every_scalar_variant() {
        let kinds = ValueKind::default_supported();
        assert_eq!(kinds.len(), 24);
        for s in ScalarKind::ALL {
            assert!(kinds.contains(&ValueKind::Scalar(s)));
            assert!(kinds.contains(&ValueKind::Optional(s)));
            assert!(kinds.contains(&ValueKind::NamedList(s)));
        }
        assert!(kinds.contains(&ValueKind::Validity));
    }

    #[test]
    fn typed_bridge_round_trips() {
        assert_eq!(<Option<i64>>::kind(), ValueKind::Optional(ScalarKind::Int));
        assert_eq!(Some(4i64).into_value(), Value::Int(4));
        assert_eq!(None::<i64>.into_value(), Value::Null);
        assert_eq!(<Option<i64>>::from_value(&Value::Null), Some(None));
        assert_eq!(bool::from_value(&Value::Int(1)), None);

        let list = vec![Named::new("q1", dec("10")), Named::new("q2", dec("12.5"))];
        let value = list.clone().into_value();
        assert!(<Vec<Named<Decimal>>>::kind().admits(&value));
        assert_eq!(<Vec<Named<Decimal>>>::from_value(&value), Some(list));
    }

    #[test]
    fn kind_display() {
        assert_eq!(ValueKind::Optional(ScalarKind::Decimal).to_string(), "Decimal?");
        assert_eq!(ValueKind::NamedList(ScalarKind::Text).to_string(), "NamedList<Text>");
        assert_eq!(ValueKind::Custom("Money".into()).to_string(), "Custom<Money>");
    }

    #[test]
    fn kind_deserializes_from_snake_case_json() {
        let kind: ValueKind = serde_json::from_value(serde_json::json!({"optional": "decimal"})).unwrap();
        assert_eq!(kind, ValueKind::Optional(ScalarKind::Decimal));
        let custom: ValueKind = serde_json::from_value(serde_json::json!({"custom": "Money"})).unwrap();
        assert_eq!(custom, ValueKind::Custom("Money".into()));
    }
}

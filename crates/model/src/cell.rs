//! Report cells.
//!
//! Const, input and operation cells carry values (and optionally a
//! validation chain and an availability check chain). Null cells only take
//! up space. A slotted cell is a container: it maps slot ids to value
//! cells and designates one of them as the default slot.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::chain::{AvailabilityCheckChain, ValidationChain};
use crate::error::ModelError;
use crate::event::{
    AvailabilityEvent, EventLog, ExecutionEvent, InputEvent, InputEventKind, ValidationEvent,
};
use crate::operation::Operation;
use crate::value::{ReportValue, Value, ValueKind};

pub(crate) const ANONYMOUS: &str = "<anonymous>";

// ──────────────────────────────────────────────
// Rules attached to value cells
// ──────────────────────────────────────────────

/// Validation and availability chains of a value cell, plus the logs the
/// engine writes their outcomes to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellRules {
    validation: Option<ValidationChain>,
    availability: Option<AvailabilityCheckChain>,
    validation_log: EventLog<ValidationEvent>,
    availability_log: EventLog<AvailabilityEvent>,
}

impl CellRules {
    pub fn validation(&self) -> Option<&ValidationChain> {
        self.validation.as_ref()
    }

    pub fn availability(&self) -> Option<&AvailabilityCheckChain> {
        self.availability.as_ref()
    }

    pub fn validation_log(&self) -> &EventLog<ValidationEvent> {
        &self.validation_log
    }

    pub fn availability_log(&self) -> &EventLog<AvailabilityEvent> {
        &self.availability_log
    }
}

// ──────────────────────────────────────────────
// Cell variants
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstCell {
    id: Option<String>,
    span: usize,
    value: Value,
    rules: CellRules,
}

impl ConstCell {
    pub fn new(value: Value) -> Self {
        ConstCell {
            id: None,
            span: 1,
            value,
            rules: CellRules::default(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCell {
    id: Option<String>,
    span: usize,
    kind: ValueKind,
    value: Option<Value>,
    rules: CellRules,
    inputs: EventLog<InputEvent>,
}

impl InputCell {
    pub fn new(kind: ValueKind) -> Self {
        InputCell {
            id: None,
            span: 1,
            kind,
            value: None,
            rules: CellRules::default(),
            inputs: EventLog::new(),
        }
    }

    /// Input cell declared for `T`.
    pub fn of<T: ReportValue>() -> Self {
        Self::new(T::kind())
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn inputs(&self) -> &EventLog<InputEvent> {
        &self.inputs
    }

    /// Clone with `value` in place, checked against the declared kind.
    pub fn with_value(mut self, value: Option<Value>) -> Result<Self, ModelError> {
        self.check_kind(value.as_ref())?;
        self.value = value;
        Ok(self)
    }

    /// Replace the value in place and record the input event.
    pub fn set_value(&mut self, value: Option<Value>, at: OffsetDateTime) -> Result<(), ModelError> {
        self.check_kind(value.as_ref())?;
        self.value = value.clone();
        self.inputs.push(InputEvent {
            at,
            kind: InputEventKind::Applied(value),
        });
        Ok(())
    }

    /// Drop the value, recording why. Returns the previous value.
    pub fn clear_value(&mut self, reason: impl Into<String>, at: OffsetDateTime) -> Option<Value> {
        let previous = self.value.take();
        self.inputs.push(InputEvent {
            at,
            kind: InputEventKind::Cleared {
                reason: reason.into(),
            },
        });
        previous
    }

    fn check_kind(&self, value: Option<&Value>) -> Result<(), ModelError> {
        match value {
            Some(v) if !self.kind.admits(v) => Err(ModelError::KindMismatch {
                expected: self.kind.clone(),
                actual: v.type_name(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCell {
    id: Option<String>,
    span: usize,
    operation: Operation,
    rules: CellRules,
    executions: EventLog<ExecutionEvent>,
}

impl OperationCell {
    pub fn new(operation: Operation) -> Self {
        OperationCell {
            id: None,
            span: 1,
            operation,
            rules: CellRules::default(),
            executions: EventLog::new(),
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn kind(&self) -> ValueKind {
        self.operation.result_kind()
    }

    pub fn executions(&self) -> &EventLog<ExecutionEvent> {
        &self.executions
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullCell {
    id: Option<String>,
    span: usize,
}

impl NullCell {
    pub fn new(span: usize) -> Self {
        NullCell { id: None, span }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlottedCell {
    id: Option<String>,
    span: usize,
    slots: BTreeMap<String, Cell>,
    default_slot: String,
}

impl SlottedCell {
    /// Every slot must hold a non-slotted cell spanning `span` columns, slot
    /// ids must be non-blank, and `default_slot` must be one of them.
    pub fn new(
        id: impl Into<String>,
        span: usize,
        slots: BTreeMap<String, Cell>,
        default_slot: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        let default_slot = default_slot.into();
        if slots.is_empty() {
            return Err(ModelError::EmptySlotMap { cell: id });
        }
        for (slot, cell) in &slots {
            if slot.trim().is_empty() {
                return Err(ModelError::BlankSlotId { cell: id });
            }
            if matches!(cell, Cell::Slotted(_)) {
                return Err(ModelError::NestedSlottedCell {
                    cell: id,
                    slot: slot.clone(),
                });
            }
            if cell.span() != span {
                return Err(ModelError::SlotSpanMismatch {
                    cell: id,
                    slot: slot.clone(),
                    expected: span,
                    actual: cell.span(),
                });
            }
        }
        if !slots.contains_key(&default_slot) {
            return Err(ModelError::DefaultSlotMissing {
                cell: id,
                default_slot,
            });
        }
        Ok(SlottedCell {
            id: Some(id),
            span,
            slots,
            default_slot,
        })
    }

    pub fn slots(&self) -> &BTreeMap<String, Cell> {
        &self.slots
    }

    pub fn slot(&self, slot_id: &str) -> Option<&Cell> {
        self.slots.get(slot_id)
    }

    pub(crate) fn slot_mut(&mut self, slot_id: &str) -> Option<&mut Cell> {
        self.slots.get_mut(slot_id)
    }

    pub fn default_slot(&self) -> &str {
        &self.default_slot
    }

    pub fn default_cell(&self) -> &Cell {
        // Construction guarantees the default slot exists.
        &self.slots[&self.default_slot]
    }
}

// ──────────────────────────────────────────────
// Cell
// ──────────────────────────────────────────────

/// A report cell.
///
/// Only value cells (const, input, operation) carry validation and
/// availability rules. Null and slotted cells have none: `with_validation`
/// and `with_availability` return them unchanged, and `rules()` is `None`.
/// Rules of a slotted cell live on its slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Const(ConstCell),
    Input(InputCell),
    Operation(OperationCell),
    Null(NullCell),
    Slotted(SlottedCell),
}

impl Cell {
    pub fn constant<T: ReportValue>(value: T) -> Self {
        Cell::Const(ConstCell::new(value.into_value()))
    }

    pub fn input<T: ReportValue>() -> Self {
        Cell::Input(InputCell::of::<T>())
    }

    pub fn operation(operation: Operation) -> Self {
        Cell::Operation(OperationCell::new(operation))
    }

    pub fn null(span: usize) -> Self {
        Cell::Null(NullCell::new(span))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Cell::Const(c) => c.id.as_deref(),
            Cell::Input(c) => c.id.as_deref(),
            Cell::Operation(c) => c.id.as_deref(),
            Cell::Null(c) => c.id.as_deref(),
            Cell::Slotted(c) => c.id.as_deref(),
        }
    }

    /// Id for messages; id-less cells are reported as anonymous.
    pub fn label(&self) -> &str {
        self.id().unwrap_or(ANONYMOUS)
    }

    pub fn span(&self) -> usize {
        match self {
            Cell::Const(c) => c.span,
            Cell::Input(c) => c.span,
            Cell::Operation(c) => c.span,
            Cell::Null(c) => c.span,
            Cell::Slotted(c) => c.span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Cell::Const(_) => "const",
            Cell::Input(_) => "input",
            Cell::Operation(_) => "operation",
            Cell::Null(_) => "null",
            Cell::Slotted(_) => "slotted",
        }
    }

    /// Rules of value-bearing cells.
    pub fn rules(&self) -> Option<&CellRules> {
        match self {
            Cell::Const(c) => Some(&c.rules),
            Cell::Input(c) => Some(&c.rules),
            Cell::Operation(c) => Some(&c.rules),
            Cell::Null(_) | Cell::Slotted(_) => None,
        }
    }

    fn rules_mut(&mut self) -> Option<&mut CellRules> {
        match self {
            Cell::Const(c) => Some(&mut c.rules),
            Cell::Input(c) => Some(&mut c.rules),
            Cell::Operation(c) => Some(&mut c.rules),
            Cell::Null(_) | Cell::Slotted(_) => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationChain> {
        self.rules().and_then(CellRules::validation)
    }

    pub fn availability(&self) -> Option<&AvailabilityCheckChain> {
        self.rules().and_then(CellRules::availability)
    }

    pub fn as_operation(&self) -> Option<&OperationCell> {
        match self {
            Cell::Operation(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_input(&self) -> Option<&InputCell> {
        match self {
            Cell::Input(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_input_mut(&mut self) -> Option<&mut InputCell> {
        match self {
            Cell::Input(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_slotted(&self) -> Option<&SlottedCell> {
        match self {
            Cell::Slotted(c) => Some(c),
            _ => None,
        }
    }

    // ── Deep clone with replacement ──────────────

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = Some(id.into());
        match &mut self {
            Cell::Const(c) => c.id = id,
            Cell::Input(c) => c.id = id,
            Cell::Operation(c) => c.id = id,
            Cell::Null(c) => c.id = id,
            Cell::Slotted(c) => c.id = id,
        }
        self
    }

    /// Changes the span of the cell. A slotted cell resizes every slot along
    /// with itself, so each slot keeps spanning the same columns.
    pub fn with_span(mut self, span: usize) -> Self {
        match &mut self {
            Cell::Const(c) => c.span = span,
            Cell::Input(c) => c.span = span,
            Cell::Operation(c) => c.span = span,
            Cell::Null(c) => c.span = span,
            Cell::Slotted(c) => {
                c.span = span;
                let slots = std::mem::take(&mut c.slots);
                c.slots = slots
                    .into_iter()
                    .map(|(slot, cell)| (slot, cell.with_span(span)))
                    .collect();
            }
        }
        self
    }

    /// Attach a validation chain. Null and slotted cells are returned as is.
    pub fn with_validation(mut self, chain: ValidationChain) -> Self {
        if let Some(rules) = self.rules_mut() {
            rules.validation = Some(chain);
        }
        self
    }

    /// Attach an availability check chain. Null and slotted cells are
    /// returned as is.
    pub fn with_availability(mut self, chain: AvailabilityCheckChain) -> Self {
        if let Some(rules) = self.rules_mut() {
            rules.availability = Some(chain);
        }
        self
    }
}

impl From<ConstCell> for Cell {
    fn from(c: ConstCell) -> Self {
        Cell::Const(c)
    }
}

impl From<InputCell> for Cell {
    fn from(c: InputCell) -> Self {
        Cell::Input(c)
    }
}

impl From<OperationCell> for Cell {
    fn from(c: OperationCell) -> Self {
        Cell::Operation(c)
    }
}

impl From<SlottedCell> for Cell {
    fn from(c: SlottedCell) -> Self {
        Cell::Slotted(c)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

//! Tabulon report model.
//!
//! Reports are trees of sections, tree tables, rows and cells. Cells hold
//! constants, user inputs or operations (immutable expression trees), and
//! may carry validation and availability rule chains. Everything here is
//! plain data plus the event logs the evaluator writes outcomes to; the
//! evaluation itself lives in `tabulon-eval`.

pub mod cell;
pub mod chain;
pub mod error;
pub mod event;
pub mod locator;
pub mod operation;
pub mod report;
pub mod table;
pub mod value;

pub use cell::{Cell, CellRules, ConstCell, InputCell, NullCell, OperationCell, SlottedCell};
pub use chain::{
    Availability, AvailabilityAction, AvailabilityCheckChain, AvailabilityStep, ValidationAction,
    ValidationChain, ValidationResult, ValidationStep, ValidationVerdict,
};
pub use error::ModelError;
pub use event::{
    AvailabilityEvent, AvailabilityEventKind, AvailabilityState, EventLog, ExecutionEvent,
    ExecutionOutcome, InputEvent, InputEventKind, ValidationEvent, ValidationEventKind,
    ValidationState,
};
pub use locator::{CellLocator, SlotSelection};
pub use operation::{CompareOp, CustomOperation, Operation, OperationTag};
pub use report::{CellAddress, Report, RowStep, Section};
pub use table::{Band, Column, Row, TreeTable};
pub use value::{
    Identifier, Named, NamedValue, ReportValue, ScalarKind, ScalarValue, Value, ValueKind,
};

//! Evaluation context.
//!
//! An [`EvalContext`] is what every protocol receives: the report being
//! recalculated, the protocol chain, the current phase and pass timestamp,
//! and the cell whose operation or rule chain is being evaluated. Entering
//! another cell produces a child context, so relative locators always see
//! the right current cell, including across suspension points.
//!
//! The context also owns lazy evaluation. Reading the value of an operation
//! cell executes it on demand, once per pass: an outcome event stamped with
//! the pass timestamp means the cell is settled, and any later request reads
//! that event instead of evaluating again. Validation and availability
//! checks are memoized the same way.

use std::fmt;

use tabulon_model::{
    Availability, AvailabilityEvent, AvailabilityEventKind, Cell, CellLocator, CellRules,
    EventLog, ExecutionEvent, ExecutionOutcome, Operation, OperationCell, Report, ValidationEvent,
    ValidationEventKind, ValidationResult, ValidationVerdict, Value, ValueKind,
};
use time::OffsetDateTime;
use tracing::{trace, warn};

use crate::error::EvalError;
use crate::index::{ReportIndex, Resolved};
use crate::protocol::{ProtocolChain, ProtocolKey};
use crate::rules;

/// Recalculation phase. Phases run in declaration order within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    CellOpExecution,
    Validation,
    AvailabilityCheck,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::CellOpExecution => f.write_str("CellOpExecution"),
            Phase::Validation => f.write_str("Validation"),
            Phase::AvailabilityCheck => f.write_str("AvailabilityCheck"),
        }
    }
}

// ──────────────────────────────────────────────
// Pass-stamped events
// ──────────────────────────────────────────────

/// An event that is either the per-pass `Cleared` marker or an outcome.
trait PassEvent: Clone {
    fn at(&self) -> OffsetDateTime;
    fn is_cleared(&self) -> bool;
}

impl PassEvent for ExecutionEvent {
    fn at(&self) -> OffsetDateTime {
        self.at
    }

    fn is_cleared(&self) -> bool {
        self.outcome.is_cleared()
    }
}

impl PassEvent for ValidationEvent {
    fn at(&self) -> OffsetDateTime {
        self.at
    }

    fn is_cleared(&self) -> bool {
        matches!(self.kind, ValidationEventKind::Cleared { .. })
    }
}

impl PassEvent for AvailabilityEvent {
    fn at(&self) -> OffsetDateTime {
        self.at
    }

    fn is_cleared(&self) -> bool {
        matches!(self.kind, AvailabilityEventKind::Cleared { .. })
    }
}

// ──────────────────────────────────────────────
// EvalContext
// ──────────────────────────────────────────────

pub struct EvalContext<'a> {
    report: &'a Report,
    index: &'a ReportIndex,
    chain: &'a ProtocolChain,
    phase: Phase,
    at: OffsetDateTime,
    current: Option<Resolved<'a>>,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(
        report: &'a Report,
        index: &'a ReportIndex,
        chain: &'a ProtocolChain,
        phase: Phase,
        at: OffsetDateTime,
    ) -> Self {
        EvalContext {
            report,
            index,
            chain,
            phase,
            at,
            current: None,
        }
    }

    /// Context for evaluating `cell`'s operation or rule chains.
    pub fn enter(&self, cell: Resolved<'a>) -> EvalContext<'a> {
        EvalContext {
            report: self.report,
            index: self.index,
            chain: self.chain,
            phase: self.phase,
            at: self.at,
            current: Some(cell),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Timestamp of the running pass.
    pub fn at(&self) -> OffsetDateTime {
        self.at
    }

    pub fn chain(&self) -> &'a ProtocolChain {
        self.chain
    }

    pub fn report(&self) -> &'a Report {
        self.report
    }

    pub fn current(&self) -> Option<&Resolved<'a>> {
        self.current.as_ref()
    }

    pub fn resolve(&self, locator: &CellLocator) -> Result<Resolved<'a>, EvalError> {
        self.index.resolve(
            self.report,
            locator,
            self.current.as_ref().map(|c| &c.address),
        )
    }

    /// Fail with `WrongPhase` unless the context is in one of `allowed`.
    pub fn require_phase(
        &self,
        op: &Operation,
        allowed: &[Phase],
        required: &'static str,
    ) -> Result<(), EvalError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(EvalError::WrongPhase {
                operation: op.tag(),
                phase: self.phase,
                required,
            })
        }
    }

    // ── Dispatch ─────────────────────────────────

    /// Evaluate `op` through the protocol chain.
    pub fn evaluate(&self, op: &Operation) -> Result<Value, EvalError> {
        let key = ProtocolKey::of(op);
        let protocol = self.chain.resolve(&key)?;
        let value = protocol.execute(op, self)?;
        check_kind(&key.result, value, || key.tag.to_string())
    }

    pub async fn evaluate_async(&self, op: &Operation) -> Result<Value, EvalError> {
        let key = ProtocolKey::of(op);
        let protocol = self.chain.resolve(&key)?;
        let value = protocol.execute_async(op, self).await?;
        check_kind(&key.result, value, || key.tag.to_string())
    }

    // ── Cell values ──────────────────────────────

    /// Value of the addressed cell as `kind`, executing operation cells
    /// that have not settled in this pass.
    pub fn get_value(&self, locator: &CellLocator, kind: &ValueKind) -> Result<Value, EvalError> {
        let target = self.resolve(locator)?;
        let value = match target.cell {
            Cell::Operation(_) => succeeded_value(self.execute_if_necessary(&target)?, &target)?,
            _ => stored_value(&target, kind)?,
        };
        check_kind(kind, value, || format!("value of cell {}", target.label()))
    }

    pub async fn get_value_async(
        &self,
        locator: &CellLocator,
        kind: &ValueKind,
    ) -> Result<Value, EvalError> {
        let target = self.resolve(locator)?;
        let value = match target.cell {
            Cell::Operation(_) => {
                succeeded_value(self.execute_if_necessary_async(&target).await?, &target)?
            }
            _ => stored_value(&target, kind)?,
        };
        check_kind(kind, value, || format!("value of cell {}", target.label()))
    }

    pub fn has_value(&self, locator: &CellLocator) -> Result<bool, EvalError> {
        let target = self.resolve(locator)?;
        match target.cell {
            Cell::Operation(_) => Ok(outcome_has_value(&self.execute_if_necessary(&target)?)),
            other => Ok(stored_has_value(other)),
        }
    }

    pub async fn has_value_async(&self, locator: &CellLocator) -> Result<bool, EvalError> {
        let target = self.resolve(locator)?;
        match target.cell {
            Cell::Operation(_) => Ok(outcome_has_value(
                &self.execute_if_necessary_async(&target).await?,
            )),
            other => Ok(stored_has_value(other)),
        }
    }

    // ── Lazy execution ───────────────────────────

    /// Outcome of an operation cell in this pass, evaluating it first if it
    /// has not settled yet. Only fatal errors are returned as `Err`.
    pub fn execute_if_necessary(
        &self,
        target: &Resolved<'a>,
    ) -> Result<ExecutionOutcome, EvalError> {
        let cell = operation_cell(target)?;
        if let Some(done) = self.settled(cell.executions(), target.label())? {
            return Ok(done.outcome);
        }
        trace!(cell = target.label(), phase = %self.phase, "executing operation cell");
        let outcome = match self.enter(target.clone()).evaluate(cell.operation()) {
            Ok(value) => ExecutionOutcome::Succeeded(value),
            Err(e) => e.classify()?,
        };
        Ok(self.record_execution(cell, target, outcome))
    }

    pub async fn execute_if_necessary_async(
        &self,
        target: &Resolved<'a>,
    ) -> Result<ExecutionOutcome, EvalError> {
        let cell = operation_cell(target)?;
        if let Some(done) = self.settled(cell.executions(), target.label())? {
            return Ok(done.outcome);
        }
        trace!(cell = target.label(), phase = %self.phase, "executing operation cell");
        let child = self.enter(target.clone());
        let outcome = match child.evaluate_async(cell.operation()).await {
            Ok(value) => ExecutionOutcome::Succeeded(value),
            Err(e) => e.classify()?,
        };
        Ok(self.record_execution(cell, target, outcome))
    }

    fn record_execution(
        &self,
        cell: &OperationCell,
        target: &Resolved<'a>,
        outcome: ExecutionOutcome,
    ) -> ExecutionOutcome {
        if let ExecutionOutcome::Failed(error) = &outcome {
            warn!(cell = target.label(), error = %error, "operation cell failed");
        }
        cell.executions().push(ExecutionEvent {
            at: self.at,
            outcome: outcome.clone(),
        });
        outcome
    }

    // ── Lazy validation ──────────────────────────

    /// Validation event of a cell in this pass, running its chain first if
    /// necessary. A cell without a validation chain is valid and records
    /// nothing.
    pub fn validate_if_necessary(
        &self,
        target: &Resolved<'a>,
    ) -> Result<ValidationEvent, EvalError> {
        let rules = value_rules(target)?;
        let Some(chain) = rules.validation() else {
            return Ok(self.unconditionally_valid());
        };
        if let Some(done) = self.settled(rules.validation_log(), target.label())? {
            return Ok(done);
        }
        trace!(cell = target.label(), "validating cell");
        let kind = match rules::validate(chain, &self.enter(target.clone())) {
            Ok(result) => ValidationEventKind::Completed(result),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => ValidationEventKind::Failed(e.to_string()),
        };
        Ok(self.record_validation(rules.validation_log(), target, kind))
    }

    pub async fn validate_if_necessary_async(
        &self,
        target: &Resolved<'a>,
    ) -> Result<ValidationEvent, EvalError> {
        let rules = value_rules(target)?;
        let Some(chain) = rules.validation() else {
            return Ok(self.unconditionally_valid());
        };
        if let Some(done) = self.settled(rules.validation_log(), target.label())? {
            return Ok(done);
        }
        trace!(cell = target.label(), "validating cell");
        let child = self.enter(target.clone());
        let kind = match rules::validate_async(chain, &child).await {
            Ok(result) => ValidationEventKind::Completed(result),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => ValidationEventKind::Failed(e.to_string()),
        };
        Ok(self.record_validation(rules.validation_log(), target, kind))
    }

    fn unconditionally_valid(&self) -> ValidationEvent {
        ValidationEvent {
            at: self.at,
            kind: ValidationEventKind::Completed(ValidationResult::new(
                ValidationVerdict::Valid,
                None,
            )),
        }
    }

    fn record_validation(
        &self,
        log: &EventLog<ValidationEvent>,
        target: &Resolved<'a>,
        kind: ValidationEventKind,
    ) -> ValidationEvent {
        if let ValidationEventKind::Failed(error) = &kind {
            warn!(cell = target.label(), error = %error, "validation failed");
        }
        let event = ValidationEvent { at: self.at, kind };
        log.push(event.clone());
        event
    }

    /// Validity of the addressed cell, validating it first if necessary.
    pub fn validity_of(&self, locator: &CellLocator) -> Result<ValidationResult, EvalError> {
        let target = self.resolve(locator)?;
        let event = self.validate_if_necessary(&target)?;
        validation_verdict(event, &target)
    }

    pub async fn validity_of_async(
        &self,
        locator: &CellLocator,
    ) -> Result<ValidationResult, EvalError> {
        let target = self.resolve(locator)?;
        let event = self.validate_if_necessary_async(&target).await?;
        validation_verdict(event, &target)
    }

    // ── Lazy availability ────────────────────────

    /// Availability event of a cell in this pass, running its chain first
    /// if necessary. A cell without an availability chain is enabled and
    /// records nothing.
    pub fn check_availability_if_necessary(
        &self,
        target: &Resolved<'a>,
    ) -> Result<AvailabilityEvent, EvalError> {
        let rules = value_rules(target)?;
        let Some(chain) = rules.availability() else {
            return Ok(self.unconditionally_enabled());
        };
        if let Some(done) = self.settled(rules.availability_log(), target.label())? {
            return Ok(done);
        }
        trace!(cell = target.label(), "checking availability");
        let kind = match rules::check_availability(chain, &self.enter(target.clone())) {
            Ok(availability) => AvailabilityEventKind::Completed(availability),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => AvailabilityEventKind::Failed(e.to_string()),
        };
        Ok(self.record_availability(rules.availability_log(), target, kind))
    }

    pub async fn check_availability_if_necessary_async(
        &self,
        target: &Resolved<'a>,
    ) -> Result<AvailabilityEvent, EvalError> {
        let rules = value_rules(target)?;
        let Some(chain) = rules.availability() else {
            return Ok(self.unconditionally_enabled());
        };
        if let Some(done) = self.settled(rules.availability_log(), target.label())? {
            return Ok(done);
        }
        trace!(cell = target.label(), "checking availability");
        let child = self.enter(target.clone());
        let kind = match rules::check_availability_async(chain, &child).await {
            Ok(availability) => AvailabilityEventKind::Completed(availability),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => AvailabilityEventKind::Failed(e.to_string()),
        };
        Ok(self.record_availability(rules.availability_log(), target, kind))
    }

    fn unconditionally_enabled(&self) -> AvailabilityEvent {
        AvailabilityEvent {
            at: self.at,
            kind: AvailabilityEventKind::Completed(Availability::Enabled),
        }
    }

    fn record_availability(
        &self,
        log: &EventLog<AvailabilityEvent>,
        target: &Resolved<'a>,
        kind: AvailabilityEventKind,
    ) -> AvailabilityEvent {
        if let AvailabilityEventKind::Failed(error) = &kind {
            warn!(cell = target.label(), error = %error, "availability check failed");
        }
        let event = AvailabilityEvent { at: self.at, kind };
        log.push(event.clone());
        event
    }

    /// Availability of the addressed cell, checking it first if necessary.
    pub fn availability_of(&self, locator: &CellLocator) -> Result<Availability, EvalError> {
        let target = self.resolve(locator)?;
        let event = self.check_availability_if_necessary(&target)?;
        availability_verdict(event, &target)
    }

    pub async fn availability_of_async(
        &self,
        locator: &CellLocator,
    ) -> Result<Availability, EvalError> {
        let target = self.resolve(locator)?;
        let event = self.check_availability_if_necessary_async(&target).await?;
        availability_verdict(event, &target)
    }

    // ── Memoization ──────────────────────────────

    /// The outcome already recorded in this pass, if any. An outcome stamped
    /// with any other timestamp means the log was not cleared for this pass.
    fn settled<E: PassEvent>(
        &self,
        log: &EventLog<E>,
        cell: &str,
    ) -> Result<Option<E>, EvalError> {
        match log.last() {
            Some(event) if !event.is_cleared() => {
                if event.at() == self.at {
                    Ok(Some(event))
                } else {
                    Err(EvalError::TimestampMismatch {
                        cell: cell.to_string(),
                        expected: self.at,
                        found: event.at(),
                    })
                }
            }
            _ => Ok(None),
        }
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn check_kind(
    expected: &ValueKind,
    value: Value,
    context: impl FnOnce() -> String,
) -> Result<Value, EvalError> {
    if expected.admits(&value) {
        Ok(value)
    } else {
        Err(EvalError::TypeMismatch {
            expected: expected.clone(),
            actual: value.type_name(),
            context: context(),
        })
    }
}

fn operation_cell<'a>(target: &Resolved<'a>) -> Result<&'a OperationCell, EvalError> {
    target
        .cell
        .as_operation()
        .ok_or_else(|| EvalError::CellKindMismatch {
            cell: target.label().to_string(),
            expected: "operation",
            actual: target.cell.kind_name(),
        })
}

fn value_rules<'a>(target: &Resolved<'a>) -> Result<&'a CellRules, EvalError> {
    target
        .cell
        .rules()
        .ok_or_else(|| EvalError::CellKindMismatch {
            cell: target.label().to_string(),
            expected: "value",
            actual: target.cell.kind_name(),
        })
}

fn succeeded_value(outcome: ExecutionOutcome, target: &Resolved<'_>) -> Result<Value, EvalError> {
    match outcome {
        ExecutionOutcome::Succeeded(value) => Ok(value),
        other => Err(EvalError::ValueMissing {
            cell: target.label().to_string(),
            reason: other.to_string(),
        }),
    }
}

/// Value of a const or input cell. Missing input reads as `Null` when the
/// requested kind is optional.
fn stored_value(target: &Resolved<'_>, kind: &ValueKind) -> Result<Value, EvalError> {
    match target.cell {
        Cell::Const(c) => Ok(c.value().clone()),
        Cell::Input(c) => match c.value() {
            Some(value) => Ok(value.clone()),
            None if kind.is_optional() => Ok(Value::Null),
            None => Err(EvalError::ValueMissing {
                cell: target.label().to_string(),
                reason: "no input".to_string(),
            }),
        },
        other => Err(EvalError::CellKindMismatch {
            cell: target.label().to_string(),
            expected: "value",
            actual: other.kind_name(),
        }),
    }
}

fn stored_has_value(cell: &Cell) -> bool {
    match cell {
        Cell::Const(c) => !c.value().is_null(),
        Cell::Input(c) => c.value().is_some_and(|v| !v.is_null()),
        Cell::Operation(_) | Cell::Null(_) | Cell::Slotted(_) => false,
    }
}

fn outcome_has_value(outcome: &ExecutionOutcome) -> bool {
    outcome.value().is_some_and(|v| !v.is_null())
}

fn validation_verdict(
    event: ValidationEvent,
    target: &Resolved<'_>,
) -> Result<ValidationResult, EvalError> {
    match event.kind {
        ValidationEventKind::Completed(result) => Ok(result),
        ValidationEventKind::Failed(reason) => Err(EvalError::NoVerdict {
            cell: target.label().to_string(),
            reason,
        }),
        ValidationEventKind::Cleared { reason } => Err(EvalError::NoVerdict {
            cell: target.label().to_string(),
            reason,
        }),
    }
}

fn availability_verdict(
    event: AvailabilityEvent,
    target: &Resolved<'_>,
) -> Result<Availability, EvalError> {
    match event.kind {
        AvailabilityEventKind::Completed(availability) => Ok(availability),
        AvailabilityEventKind::Failed(reason) | AvailabilityEventKind::Cleared { reason } => {
            Err(EvalError::NoVerdict {
                cell: target.label().to_string(),
                reason,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabulon_model::{Column, ConstCell, Row, Section, TreeTable};
    use time::macros::datetime;

    fn report(cells: Vec<Cell>) -> Report {
        let columns = (0..cells.len())
            .map(|i| Column::new(format!("c{}", i), "col"))
            .collect();
        let table = TreeTable::with_rows(columns, vec![Row::new("r1", cells)]).unwrap();
        Report::new("rep", vec![Section::new("s", "S", table)]).unwrap()
    }

    #[test]
    fn stale_outcome_is_a_timestamp_mismatch() {
        let report = report(vec![Cell::operation(Operation::constant(1i64)).with_id("op")]);
        let index = ReportIndex::build(&report);
        let chain = ProtocolChain::with_builtins(&[], &ValueKind::default_supported());
        let earlier = datetime!(2026-05-01 9:00 UTC);
        let now = datetime!(2026-05-01 10:00 UTC);

        let cx = EvalContext::new(&report, &index, &chain, Phase::CellOpExecution, now);
        let target = cx.resolve(&CellLocator::standard("s", "op")).unwrap();
        operation_cell(&target).unwrap().executions().push(ExecutionEvent {
            at: earlier,
            outcome: ExecutionOutcome::Succeeded(Value::Int(1)),
        });

        let err = cx.execute_if_necessary(&target).unwrap_err();
        assert_eq!(
            err,
            EvalError::TimestampMismatch {
                cell: "op".into(),
                expected: now,
                found: earlier,
            }
        );
    }

    #[test]
    fn missing_input_reads_as_null_only_for_optional_kinds() {
        let report = report(vec![Cell::input::<i64>().with_id("qty")]);
        let index = ReportIndex::build(&report);
        let chain = ProtocolChain::with_builtins(&[], &ValueKind::default_supported());
        let cx = EvalContext::new(
            &report,
            &index,
            &chain,
            Phase::CellOpExecution,
            datetime!(2026-05-01 10:00 UTC),
        );
        let loc = CellLocator::standard("s", "qty");
        assert_eq!(
            cx.get_value(&loc, &ValueKind::Optional(tabulon_model::ScalarKind::Int)),
            Ok(Value::Null)
        );
        assert!(matches!(
            cx.get_value(&loc, &ValueKind::INT),
            Err(EvalError::ValueMissing { .. })
        ));
        assert_eq!(cx.has_value(&loc), Ok(false));
    }

    #[test]
    fn null_cells_have_no_value() {
        let report = report(vec![Cell::null(1).with_id("gap")]);
        let index = ReportIndex::build(&report);
        let chain = ProtocolChain::default();
        let cx = EvalContext::new(
            &report,
            &index,
            &chain,
            Phase::CellOpExecution,
            datetime!(2026-05-01 10:00 UTC),
        );
        let loc = CellLocator::standard("s", "gap");
        assert!(matches!(
            cx.get_value(&loc, &ValueKind::INT),
            Err(EvalError::CellKindMismatch { actual: "null", .. })
        ));
        assert_eq!(cx.has_value(&loc), Ok(false));
    }

    #[test]
    fn null_constants_have_no_value_like_null_inputs() {
        let report = report(vec![
            Cell::Const(ConstCell::new(Value::Null)).with_id("blank"),
            Cell::constant(0i64).with_id("zero"),
        ]);
        let index = ReportIndex::build(&report);
        let chain = ProtocolChain::default();
        let cx = EvalContext::new(
            &report,
            &index,
            &chain,
            Phase::CellOpExecution,
            datetime!(2026-05-01 10:00 UTC),
        );
        assert_eq!(cx.has_value(&CellLocator::standard("s", "blank")), Ok(false));
        assert_eq!(cx.has_value(&CellLocator::standard("s", "zero")), Ok(true));
    }

    #[test]
    fn self_locator_needs_a_current_cell() {
        let report = report(vec![Cell::constant(3i64).with_id("k")]);
        let index = ReportIndex::build(&report);
        let chain = ProtocolChain::default();
        let cx = EvalContext::new(
            &report,
            &index,
            &chain,
            Phase::Validation,
            datetime!(2026-05-01 10:00 UTC),
        );
        assert!(matches!(
            cx.get_value(&CellLocator::self_cell(), &ValueKind::INT),
            Err(EvalError::NoCurrentCell { .. })
        ));
        let target = cx.resolve(&CellLocator::standard("s", "k")).unwrap();
        let inner = cx.enter(target);
        assert_eq!(
            inner.get_value(&CellLocator::self_cell(), &ValueKind::INT),
            Ok(Value::Int(3))
        );
    }
}

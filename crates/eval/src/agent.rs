//! The report agent: owns a report and recalculates it.
//!
//! A recalculation runs one or more passes. Every pass clears the outcome
//! logs, then walks the report in traversal order three times: executing
//! operation cells, running validation chains, and running availability
//! chains. Work is lazy and memoized per pass, so the walk only triggers
//! what has not already been evaluated through a reference from another
//! cell.
//!
//! When the availability phase disables input cells that still hold a
//! value, those values are cleared and the report is recalculated again.
//! A failed availability check stops the loop, since its verdict is
//! unknown.

use tabulon_model::{
    AvailabilityEvent, AvailabilityEventKind, AvailabilityState, Cell, CellAddress, CellLocator,
    ExecutionEvent, ExecutionOutcome, Report, ReportValue, ValidationEvent, ValidationEventKind,
    ValidationState, Value,
};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::{AgentConfig, RecalcOptions};
use crate::context::{EvalContext, Phase};
use crate::error::EvalError;
use crate::index::{ReportIndex, Resolved};
use crate::protocol::ProtocolChain;

const PHASES: [Phase; 3] = [
    Phase::CellOpExecution,
    Phase::Validation,
    Phase::AvailabilityCheck,
];

const CLEARED_FOR_PASS: &str = "recalculation";
const CLEARED_DISABLED: &str = "cell disabled";

/// What a recalculation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcSummary {
    /// Number of passes run, at least 1.
    pub passes: usize,
    /// Input cells whose value was cleared because they were disabled, in
    /// the order they were cleared.
    pub cleared_inputs: Vec<String>,
    /// Cells whose execution, validation or availability check failed in
    /// the last pass.
    pub failed_cells: Vec<String>,
}

/// Findings of one pass.
struct PassReport {
    failed_cells: Vec<String>,
    unknown_validation: bool,
    unknown_availability: bool,
    disabled_inputs: Vec<CellAddress>,
}

// ──────────────────────────────────────────────
// ReportAgent
// ──────────────────────────────────────────────

#[derive(Debug)]
pub struct ReportAgent {
    report: Report,
    index: ReportIndex,
    config: AgentConfig,
}

impl ReportAgent {
    pub fn new(report: Report) -> Self {
        ReportAgent::with_config(report, AgentConfig::default())
    }

    pub fn with_config(report: Report, config: AgentConfig) -> Self {
        let index = ReportIndex::build(&report);
        ReportAgent {
            report,
            index,
            config,
        }
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    // ── Addressing ───────────────────────────────

    /// The cell an absolute locator points at.
    pub fn get_cell(&self, locator: &CellLocator) -> Result<&Cell, EvalError> {
        self.index
            .resolve(&self.report, locator, None)
            .map(|resolved| resolved.cell)
    }

    // ── Input ────────────────────────────────────

    /// Set (or with `None`, unset) the value of an input cell.
    pub fn set_input_value<T: ReportValue>(
        &mut self,
        locator: &CellLocator,
        value: Option<T>,
        at: OffsetDateTime,
    ) -> Result<(), EvalError> {
        self.set_input(locator, value.map(ReportValue::into_value), at)
    }

    /// Untyped form of [`set_input_value`](Self::set_input_value); the value
    /// is checked against the cell's declared kind.
    pub fn set_input(
        &mut self,
        locator: &CellLocator,
        value: Option<Value>,
        at: OffsetDateTime,
    ) -> Result<(), EvalError> {
        ensure_utc(at)?;
        let address = self.index.locate(&self.report, locator, None)?;
        let section = self
            .report
            .sections()
            .get(address.section)
            .map(|s| s.id().to_string())
            .unwrap_or_default();
        let cell = self
            .report
            .cell_at_mut(&address)
            .ok_or_else(|| EvalError::CellNotFound {
                section,
                cell: locator.to_string(),
            })?;
        let label = cell.label().to_string();
        let actual = cell.kind_name();
        let input = cell
            .as_input_mut()
            .ok_or_else(|| EvalError::CellKindMismatch {
                cell: label.clone(),
                expected: "input",
                actual,
            })?;
        input.set_value(value, at)?;
        debug!(cell = %label, "input value set");
        Ok(())
    }

    // ── Reads ────────────────────────────────────
    //
    // These read what the last recalculation recorded and never evaluate.

    /// Current value of a cell: the stored value of a const or input cell,
    /// or the value of an operation cell's last successful execution.
    pub fn cell_value(&self, locator: &CellLocator) -> Result<Option<Value>, EvalError> {
        let cell = self.get_cell(locator)?;
        match cell {
            Cell::Const(c) => Ok(Some(c.value().clone())),
            Cell::Input(c) => Ok(c.value().cloned()),
            Cell::Operation(c) => Ok(c
                .executions()
                .last()
                .and_then(|event| event.outcome.value().cloned())),
            other => Err(EvalError::CellKindMismatch {
                cell: other.label().to_string(),
                expected: "value",
                actual: other.kind_name(),
            }),
        }
    }

    /// Typed form of [`cell_value`](Self::cell_value).
    pub fn value_of<T: ReportValue>(&self, locator: &CellLocator) -> Result<Option<T>, EvalError> {
        match self.cell_value(locator)? {
            None => Ok(None),
            Some(value) => T::from_value(&value)
                .map(Some)
                .ok_or_else(|| EvalError::TypeMismatch {
                    expected: T::kind(),
                    actual: value.type_name(),
                    context: format!("value of {}", locator),
                }),
        }
    }

    /// Outcome of the last execution of an operation cell.
    pub fn last_outcome(
        &self,
        locator: &CellLocator,
    ) -> Result<Option<ExecutionOutcome>, EvalError> {
        let cell = self.get_cell(locator)?;
        let op = cell
            .as_operation()
            .ok_or_else(|| EvalError::CellKindMismatch {
                cell: cell.label().to_string(),
                expected: "operation",
                actual: cell.kind_name(),
            })?;
        Ok(op.executions().last().map(|event| event.outcome))
    }

    /// Last validation event of a value cell, `None` when the cell has no
    /// validation chain or was never recalculated.
    pub fn last_validation(
        &self,
        locator: &CellLocator,
    ) -> Result<Option<ValidationEvent>, EvalError> {
        let cell = self.get_cell(locator)?;
        let rules = value_rules(cell)?;
        Ok(rules
            .validation()
            .and_then(|_| rules.validation_log().last()))
    }

    /// Validity of a value cell. A cell without a validation chain is valid.
    pub fn validity(&self, locator: &CellLocator) -> Result<ValidationState, EvalError> {
        let cell = self.get_cell(locator)?;
        let rules = value_rules(cell)?;
        if rules.validation().is_none() {
            return Ok(ValidationState::Valid);
        }
        Ok(rules
            .validation_log()
            .last()
            .map(|event| event.state())
            .unwrap_or(ValidationState::Unknown))
    }

    /// Availability of a value cell. A cell without an availability chain
    /// is enabled.
    pub fn availability(&self, locator: &CellLocator) -> Result<AvailabilityState, EvalError> {
        let cell = self.get_cell(locator)?;
        let rules = value_rules(cell)?;
        if rules.availability().is_none() {
            return Ok(AvailabilityState::Enabled);
        }
        Ok(rules
            .availability_log()
            .last()
            .map(|event| event.state())
            .unwrap_or(AvailabilityState::Unknown))
    }

    // ── Recalculation ────────────────────────────

    /// Recalculate the report as of `at`, which must be UTC.
    ///
    /// Per-cell failures are recorded on the cells and listed in the
    /// summary; only fatal errors are returned.
    pub fn recalc(
        &mut self,
        at: OffsetDateTime,
        options: &RecalcOptions,
    ) -> Result<RecalcSummary, EvalError> {
        ensure_utc(at)?;
        let chain = self.protocol_chain(options);
        let mut summary = RecalcSummary::default();
        loop {
            summary.passes += 1;
            debug!(report = self.report.id(), pass = summary.passes, "recalculation pass");
            self.clear_logs(at);
            for phase in PHASES {
                debug!(report = self.report.id(), phase = %phase, "running phase");
                self.run_phase(&chain, phase, at)?;
            }
            if !self.finish_pass(at, &mut summary)? {
                return Ok(summary);
            }
        }
    }

    /// Same as [`recalc`](Self::recalc), evaluating through the async
    /// protocol path.
    pub async fn recalc_async(
        &mut self,
        at: OffsetDateTime,
        options: &RecalcOptions,
    ) -> Result<RecalcSummary, EvalError> {
        ensure_utc(at)?;
        let chain = self.protocol_chain(options);
        let mut summary = RecalcSummary::default();
        loop {
            summary.passes += 1;
            debug!(report = self.report.id(), pass = summary.passes, "recalculation pass");
            self.clear_logs(at);
            for phase in PHASES {
                debug!(report = self.report.id(), phase = %phase, "running phase");
                self.run_phase_async(&chain, phase, at).await?;
            }
            if !self.finish_pass(at, &mut summary)? {
                return Ok(summary);
            }
        }
    }

    /// Host sources first, then the built-in tables for the default kinds
    /// plus any extra kinds from the config and the options.
    fn protocol_chain(&self, options: &RecalcOptions) -> ProtocolChain {
        let mut kinds = tabulon_model::ValueKind::default_supported();
        for kind in self.config.extra_kinds.iter().chain(&options.extra_kinds) {
            if !kinds.contains(kind) {
                kinds.push(kind.clone());
            }
        }
        ProtocolChain::with_builtins(&options.extra_sources, &kinds)
    }

    fn clear_logs(&self, at: OffsetDateTime) {
        let reason = CLEARED_FOR_PASS.to_string();
        for (_, cell) in self.report.cells() {
            if let Some(op) = cell.as_operation() {
                op.executions().reset(ExecutionEvent {
                    at,
                    outcome: ExecutionOutcome::Cleared {
                        reason: reason.clone(),
                    },
                });
            }
            if let Some(rules) = cell.rules() {
                rules.validation_log().reset(ValidationEvent {
                    at,
                    kind: ValidationEventKind::Cleared {
                        reason: reason.clone(),
                    },
                });
                rules.availability_log().reset(AvailabilityEvent {
                    at,
                    kind: AvailabilityEventKind::Cleared {
                        reason: reason.clone(),
                    },
                });
            }
        }
    }

    fn run_phase(
        &self,
        chain: &ProtocolChain,
        phase: Phase,
        at: OffsetDateTime,
    ) -> Result<(), EvalError> {
        let cx = EvalContext::new(&self.report, &self.index, chain, phase, at);
        for (address, cell) in self.report.cells() {
            if !takes_part(cell, phase) {
                continue;
            }
            let target = Resolved { address, cell };
            match phase {
                Phase::CellOpExecution => {
                    cx.execute_if_necessary(&target)?;
                }
                Phase::Validation => {
                    cx.validate_if_necessary(&target)?;
                }
                Phase::AvailabilityCheck => {
                    cx.check_availability_if_necessary(&target)?;
                }
            }
        }
        Ok(())
    }

    async fn run_phase_async(
        &self,
        chain: &ProtocolChain,
        phase: Phase,
        at: OffsetDateTime,
    ) -> Result<(), EvalError> {
        let cx = EvalContext::new(&self.report, &self.index, chain, phase, at);
        for (address, cell) in self.report.cells() {
            if !takes_part(cell, phase) {
                continue;
            }
            let target = Resolved { address, cell };
            match phase {
                Phase::CellOpExecution => {
                    cx.execute_if_necessary_async(&target).await?;
                }
                Phase::Validation => {
                    cx.validate_if_necessary_async(&target).await?;
                }
                Phase::AvailabilityCheck => {
                    cx.check_availability_if_necessary_async(&target).await?;
                }
            }
        }
        Ok(())
    }

    /// Record the pass in `summary` and clear disabled inputs. Returns
    /// whether another pass is needed.
    fn finish_pass(
        &mut self,
        at: OffsetDateTime,
        summary: &mut RecalcSummary,
    ) -> Result<bool, EvalError> {
        let report = self.inspect();
        summary.failed_cells = report.failed_cells;
        if report.unknown_validation
            || report.unknown_availability
            || report.disabled_inputs.is_empty()
        {
            return Ok(false);
        }
        if let Some(max_passes) = self.config.max_passes {
            if summary.passes >= max_passes.get() {
                return Err(EvalError::RerunLimitExceeded {
                    max_passes: max_passes.get(),
                });
            }
        }
        for address in &report.disabled_inputs {
            if let Some(cell) = self.report.cell_at_mut(address) {
                let label = cell.label().to_string();
                if let Some(input) = cell.as_input_mut() {
                    input.clear_value(CLEARED_DISABLED, at);
                    summary.cleared_inputs.push(label);
                }
            }
        }
        warn!(
            report = self.report.id(),
            pass = summary.passes,
            cleared = report.disabled_inputs.len(),
            "disabled inputs cleared, recalculating again"
        );
        Ok(true)
    }

    fn inspect(&self) -> PassReport {
        let mut report = PassReport {
            failed_cells: Vec::new(),
            unknown_validation: false,
            unknown_availability: false,
            disabled_inputs: Vec::new(),
        };
        for (address, cell) in self.report.cells() {
            let Some(rules) = cell.rules() else {
                continue;
            };
            let executed_failed = cell.as_operation().is_some_and(|op| {
                matches!(
                    op.executions().last(),
                    Some(ExecutionEvent {
                        outcome: ExecutionOutcome::Failed(_),
                        ..
                    })
                )
            });
            let validity = rules
                .validation()
                .map(|_| {
                    rules
                        .validation_log()
                        .last()
                        .map(|e| e.state())
                        .unwrap_or(ValidationState::Unknown)
                })
                .unwrap_or(ValidationState::Valid);
            let validation_failed = validity == ValidationState::Failed;
            let availability = rules
                .availability()
                .map(|_| {
                    rules
                        .availability_log()
                        .last()
                        .map(|e| e.state())
                        .unwrap_or(AvailabilityState::Unknown)
                })
                .unwrap_or(AvailabilityState::Enabled);
            let availability_failed = rules.availability().is_some()
                && matches!(
                    rules.availability_log().last(),
                    Some(AvailabilityEvent {
                        kind: AvailabilityEventKind::Failed(_),
                        ..
                    })
                );

            if executed_failed || validation_failed || availability_failed {
                report.failed_cells.push(cell.label().to_string());
            }
            // A failed validation has no verdict either.
            if matches!(validity, ValidationState::Unknown | ValidationState::Failed) {
                report.unknown_validation = true;
            }
            match availability {
                AvailabilityState::Unknown => report.unknown_availability = true,
                AvailabilityState::Disabled => {
                    let holds_value = cell
                        .as_input()
                        .and_then(|input| input.value())
                        .is_some_and(|v| !v.is_null());
                    if holds_value {
                        report.disabled_inputs.push(address);
                    }
                }
                AvailabilityState::Enabled => {}
            }
        }
        report
    }
}

fn takes_part(cell: &Cell, phase: Phase) -> bool {
    match phase {
        Phase::CellOpExecution => cell.as_operation().is_some(),
        Phase::Validation => cell.validation().is_some(),
        Phase::AvailabilityCheck => cell.availability().is_some(),
    }
}

fn value_rules(cell: &Cell) -> Result<&tabulon_model::CellRules, EvalError> {
    cell.rules().ok_or_else(|| EvalError::CellKindMismatch {
        cell: cell.label().to_string(),
        expected: "value",
        actual: cell.kind_name(),
    })
}

pub(crate) fn ensure_utc(at: OffsetDateTime) -> Result<(), EvalError> {
    if at.offset().is_utc() {
        Ok(())
    } else {
        Err(EvalError::NonUtcTimestamp { at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabulon_model::{Column, Operation, Row, Section, TreeTable};
    use time::macros::datetime;

    fn agent() -> ReportAgent {
        let table = TreeTable::with_rows(
            vec![Column::new("c1", "Qty"), Column::new("c2", "Double")],
            vec![Row::new(
                "r1",
                vec![
                    Cell::input::<i64>().with_id("qty"),
                    Cell::operation(Operation::sum(
                        tabulon_model::ValueKind::INT,
                        vec![
                            Operation::cell_value::<i64>(CellLocator::in_section("qty")),
                            Operation::cell_value::<i64>(CellLocator::in_section("qty")),
                        ],
                    ))
                    .with_id("double"),
                ],
            )],
        )
        .unwrap();
        ReportAgent::new(Report::new("rep", vec![Section::new("s", "S", table)]).unwrap())
    }

    #[test]
    fn recalc_then_read() {
        let mut agent = agent();
        let at = datetime!(2026-05-01 10:00 UTC);
        let qty = CellLocator::standard("s", "qty");
        agent.set_input_value(&qty, Some(21i64), at).unwrap();
        let summary = agent.recalc(at, &RecalcOptions::default()).unwrap();
        assert_eq!(summary.passes, 1);
        assert!(summary.failed_cells.is_empty());
        assert_eq!(
            agent.value_of::<i64>(&CellLocator::standard("s", "double")),
            Ok(Some(42))
        );
    }

    #[test]
    fn missing_input_is_recorded_not_returned() {
        let mut agent = agent();
        let at = datetime!(2026-05-01 10:00 UTC);
        agent.recalc(at, &RecalcOptions::default()).unwrap();
        assert!(matches!(
            agent.last_outcome(&CellLocator::standard("s", "double")),
            Ok(Some(ExecutionOutcome::ValueMissing(_)))
        ));
        assert_eq!(agent.cell_value(&CellLocator::standard("s", "double")), Ok(None));
    }

    #[test]
    fn non_utc_timestamps_are_rejected() {
        let mut agent = agent();
        let at = datetime!(2026-05-01 10:00 +2);
        assert!(matches!(
            agent.recalc(at, &RecalcOptions::default()),
            Err(EvalError::NonUtcTimestamp { .. })
        ));
        assert!(matches!(
            agent.set_input_value(&CellLocator::standard("s", "qty"), Some(1i64), at),
            Err(EvalError::NonUtcTimestamp { .. })
        ));
    }

    #[test]
    fn inputs_are_kind_checked() {
        let mut agent = agent();
        let at = datetime!(2026-05-01 10:00 UTC);
        assert!(matches!(
            agent.set_input(
                &CellLocator::standard("s", "qty"),
                Some(Value::Text("many".into())),
                at
            ),
            Err(EvalError::Model(_))
        ));
        assert!(matches!(
            agent.set_input_value(&CellLocator::standard("s", "double"), Some(1i64), at),
            Err(EvalError::CellKindMismatch {
                expected: "input",
                ..
            })
        ));
    }

    #[test]
    fn relative_locators_have_no_current_cell_at_top_level() {
        let agent = agent();
        assert!(matches!(
            agent.get_cell(&CellLocator::in_section("qty")),
            Err(EvalError::NoCurrentCell { .. })
        ));
    }
}

//! Evaluation errors and their classification at the per-cell boundary.

use tabulon_model::{ExecutionOutcome, ModelError, OperationTag, ValueKind};
use time::OffsetDateTime;

use crate::context::Phase;

/// Errors raised while evaluating operations or driving a recalculation.
///
/// Most variants are per-cell failures: they end up as an outcome event on
/// the cell being evaluated and the pass carries on. The variants listed in
/// [`EvalError::is_fatal`] are structural or caller errors and abort the
/// whole call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    // ── Addressing ───────────────────────────────
    #[error("section not found: {section}")]
    SectionNotFound { section: String },

    #[error("cell not found: {section}/{cell}")]
    CellNotFound { section: String, cell: String },

    #[error("cell {cell} is not slotted, cannot select slot {slot}")]
    NotSlotted { cell: String, slot: String },

    #[error("slot not found: {cell}[{slot}]")]
    SlotNotFound { cell: String, slot: String },

    #[error("cell {cell} is slotted and no slot id was given")]
    SlotIdRequired { cell: String },

    #[error("cell {cell} is a {actual} cell, expected {expected}")]
    CellKindMismatch {
        cell: String,
        expected: &'static str,
        actual: &'static str,
    },

    // ── Signals raised by operation authors ──────
    #[error("aborted{}", .0.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Aborted(Option<String>),

    #[error("not applicable{}", .0.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    NotApplicable(Option<String>),

    // ── Values ───────────────────────────────────
    #[error("cell {cell} has no value: {reason}")]
    ValueMissing { cell: String, reason: String },

    #[error("cell {cell} has no verdict: {reason}")]
    NoVerdict { cell: String, reason: String },

    #[error("{context}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueKind,
        actual: String,
        context: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow: {message}")]
    Overflow { message: String },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Failure reported by a host-supplied protocol.
    #[error("{0}")]
    Host(String),

    // ── Fatal ────────────────────────────────────
    #[error("no protocol registered for {tag} producing {result}")]
    ProtocolNotFound { tag: OperationTag, result: ValueKind },

    #[error("{operation} is not allowed during {phase}, requires {required}")]
    WrongPhase {
        operation: OperationTag,
        phase: Phase,
        required: &'static str,
    },

    #[error("locator {locator} is relative but no cell is being evaluated")]
    NoCurrentCell { locator: String },

    #[error("cell {cell} has an outcome recorded at {found}, current pass is {expected}")]
    TimestampMismatch {
        cell: String,
        expected: OffsetDateTime,
        found: OffsetDateTime,
    },

    #[error("timestamp {at} is not UTC")]
    NonUtcTimestamp { at: OffsetDateTime },

    #[error("recalculation still wants to rerun after {max_passes} passes")]
    RerunLimitExceeded { max_passes: usize },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl EvalError {
    /// Fatal errors are never recorded as cell outcomes; they propagate out
    /// of the recalculation call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::ProtocolNotFound { .. }
                | EvalError::WrongPhase { .. }
                | EvalError::NoCurrentCell { .. }
                | EvalError::TimestampMismatch { .. }
                | EvalError::NonUtcTimestamp { .. }
                | EvalError::RerunLimitExceeded { .. }
                | EvalError::Config { .. }
        )
    }

    /// Convert a failed operation evaluation into the outcome recorded on the
    /// cell. Fatal errors are handed back unchanged.
    pub fn classify(self) -> Result<ExecutionOutcome, EvalError> {
        if self.is_fatal() {
            return Err(self);
        }
        let outcome = match self {
            EvalError::Aborted(message) => ExecutionOutcome::Aborted(message),
            EvalError::NotApplicable(message) => ExecutionOutcome::NotApplicable(message),
            e @ (EvalError::CellNotFound { .. }
            | EvalError::SectionNotFound { .. }
            | EvalError::SlotNotFound { .. }) => ExecutionOutcome::CellNotFound(e.to_string()),
            e @ EvalError::ValueMissing { .. } => ExecutionOutcome::ValueMissing(e.to_string()),
            other => ExecutionOutcome::Failed(other.to_string()),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn signals_become_their_own_outcomes() {
        assert_eq!(
            EvalError::Aborted(Some("stop".into())).classify(),
            Ok(ExecutionOutcome::Aborted(Some("stop".into())))
        );
        assert_eq!(
            EvalError::NotApplicable(None).classify(),
            Ok(ExecutionOutcome::NotApplicable(None))
        );
    }

    #[test]
    fn addressing_errors_become_cell_not_found() {
        let outcome = EvalError::SlotNotFound {
            cell: "price".into(),
            slot: "z".into(),
        }
        .classify()
        .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::CellNotFound("slot not found: price[z]".into())
        );
    }

    #[test]
    fn other_errors_fail_with_message() {
        assert_eq!(
            EvalError::DivisionByZero.classify(),
            Ok(ExecutionOutcome::Failed("division by zero".into()))
        );
    }

    #[test]
    fn fatal_errors_are_returned() {
        let err = EvalError::NonUtcTimestamp {
            at: datetime!(2026-01-01 0:00 +1),
        };
        assert!(err.is_fatal());
        assert_eq!(err.clone().classify(), Err(err));

        let err = EvalError::ProtocolNotFound {
            tag: OperationTag::Sum,
            result: ValueKind::TEXT,
        };
        assert_eq!(
            err.to_string(),
            "no protocol registered for Sum producing Text"
        );
    }

    #[test]
    fn signal_display() {
        assert_eq!(EvalError::Aborted(None).to_string(), "aborted");
        assert_eq!(
            EvalError::NotApplicable(Some("no data".into())).to_string(),
            "not applicable: no data"
        );
    }
}

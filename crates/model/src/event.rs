//! Outcome events recorded on cells.
//!
//! Cells are immutable apart from their event logs. The recalculation
//! engine appends exactly one outcome per sub-phase and pass, and resets
//! each log to a single `Cleared` entry at the start of a pass, so "has
//! this cell been computed in this pass" is answered by comparing the last
//! event's timestamp with the pass timestamp.

use std::fmt;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::chain::{Availability, ValidationResult, ValidationVerdict};
use crate::value::Value;

// ──────────────────────────────────────────────
// Event log
// ──────────────────────────────────────────────

/// Append-only, interior-mutable list of events.
///
/// Clone and equality work on a snapshot of the entries.
pub struct EventLog<E> {
    entries: Mutex<Vec<E>>,
}

impl<E: Clone> EventLog<E> {
    pub fn new() -> Self {
        EventLog {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, event: E) {
        self.entries.lock().push(event);
    }

    /// Drop every entry and start over with `event`.
    pub fn reset(&self, event: E) {
        let mut entries = self.entries.lock();
        entries.clear();
        entries.push(event);
    }

    pub fn last(&self) -> Option<E> {
        self.entries.lock().last().cloned()
    }

    pub fn snapshot(&self) -> Vec<E> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<E: Clone> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        EventLog {
            entries: Mutex::new(self.snapshot()),
        }
    }
}

impl<E: Clone + PartialEq> PartialEq for EventLog<E> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.snapshot() == other.snapshot()
    }
}

impl<E: Clone + Eq> Eq for EventLog<E> {}

impl<E: Clone + fmt::Debug> fmt::Debug for EventLog<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

// ──────────────────────────────────────────────
// Operation execution
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Cleared { reason: String },
    Succeeded(Value),
    Aborted(Option<String>),
    Failed(String),
    NotApplicable(Option<String>),
    ValueMissing(String),
    CellNotFound(String),
}

impl ExecutionOutcome {
    pub fn is_cleared(&self) -> bool {
        matches!(self, ExecutionOutcome::Cleared { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Succeeded(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Cleared { reason } => write!(f, "cleared ({})", reason),
            ExecutionOutcome::Succeeded(v) => write!(f, "succeeded: {}", v),
            ExecutionOutcome::Aborted(Some(m)) => write!(f, "aborted: {}", m),
            ExecutionOutcome::Aborted(None) => write!(f, "aborted"),
            ExecutionOutcome::Failed(e) => write!(f, "failed: {}", e),
            ExecutionOutcome::NotApplicable(Some(m)) => write!(f, "not applicable: {}", m),
            ExecutionOutcome::NotApplicable(None) => write!(f, "not applicable"),
            ExecutionOutcome::ValueMissing(m) => write!(f, "value missing: {}", m),
            ExecutionOutcome::CellNotFound(m) => write!(f, "cell not found: {}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub at: OffsetDateTime,
    pub outcome: ExecutionOutcome,
}

// ──────────────────────────────────────────────
// Validation
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEventKind {
    Cleared { reason: String },
    Completed(ValidationResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationEvent {
    pub at: OffsetDateTime,
    pub kind: ValidationEventKind,
}

/// Validity of a cell as read from its last validation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationState {
    Unknown,
    Valid,
    Invalid,
    NotApplicable,
    Aborted,
    Failed,
}

impl ValidationEvent {
    pub fn state(&self) -> ValidationState {
        match &self.kind {
            ValidationEventKind::Cleared { .. } => ValidationState::Unknown,
            ValidationEventKind::Failed(_) => ValidationState::Failed,
            ValidationEventKind::Completed(r) => match r.verdict {
                ValidationVerdict::Valid => ValidationState::Valid,
                ValidationVerdict::Invalid => ValidationState::Invalid,
                ValidationVerdict::NotApplicable => ValidationState::NotApplicable,
                ValidationVerdict::Aborted => ValidationState::Aborted,
            },
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.kind {
            ValidationEventKind::Cleared { .. } => None,
            ValidationEventKind::Completed(r) => r.message.as_deref(),
            ValidationEventKind::Failed(e) => Some(e),
        }
    }
}

// ──────────────────────────────────────────────
// Availability
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityEventKind {
    Cleared { reason: String },
    Completed(Availability),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityEvent {
    pub at: OffsetDateTime,
    pub kind: AvailabilityEventKind,
}

/// Availability of a cell as read from its last availability event.
/// A failed check leaves the state unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvailabilityState {
    Unknown,
    Enabled,
    Disabled,
}

impl AvailabilityEvent {
    pub fn state(&self) -> AvailabilityState {
        match &self.kind {
            AvailabilityEventKind::Completed(Availability::Enabled) => AvailabilityState::Enabled,
            AvailabilityEventKind::Completed(Availability::Disabled) => {
                AvailabilityState::Disabled
            }
            AvailabilityEventKind::Cleared { .. } | AvailabilityEventKind::Failed(_) => {
                AvailabilityState::Unknown
            }
        }
    }
}

// ──────────────────────────────────────────────
// Input
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEventKind {
    Applied(Option<Value>),
    Cleared { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub at: OffsetDateTime,
    pub kind: InputEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn reset_leaves_single_entry() {
        let log = EventLog::new();
        let at = datetime!(2026-01-01 0:00 UTC);
        log.push(ExecutionEvent {
            at,
            outcome: ExecutionOutcome::Succeeded(Value::Int(1)),
        });
        log.push(ExecutionEvent {
            at,
            outcome: ExecutionOutcome::Failed("boom".into()),
        });
        assert_eq!(log.len(), 2);
        log.reset(ExecutionEvent {
            at,
            outcome: ExecutionOutcome::Cleared {
                reason: "recalc".into(),
            },
        });
        assert_eq!(log.len(), 1);
        assert!(log.last().unwrap().outcome.is_cleared());
    }

    #[test]
    fn clone_is_a_detached_snapshot() {
        let log = EventLog::new();
        let at = datetime!(2026-01-01 0:00 UTC);
        log.push(InputEvent {
            at,
            kind: InputEventKind::Applied(Some(Value::Bool(true))),
        });
        let copy = log.clone();
        assert_eq!(copy, log);
        log.push(InputEvent {
            at,
            kind: InputEventKind::Applied(None),
        });
        assert_ne!(copy, log);
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn validation_state_mapping() {
        let at = datetime!(2026-01-01 0:00 UTC);
        let ev = ValidationEvent {
            at,
            kind: ValidationEventKind::Completed(ValidationResult::new(
                ValidationVerdict::Invalid,
                Some("negative".into()),
            )),
        };
        assert_eq!(ev.state(), ValidationState::Invalid);
        assert_eq!(ev.message(), Some("negative"));
    }

    #[test]
    fn failed_availability_is_unknown() {
        let ev = AvailabilityEvent {
            at: datetime!(2026-01-01 0:00 UTC),
            kind: AvailabilityEventKind::Failed("no protocol".into()),
        };
        assert_eq!(ev.state(), AvailabilityState::Unknown);
    }
}

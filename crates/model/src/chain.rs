//! Validation and availability rule chains.
//!
//! A chain is an ordered, non-empty list of steps. Each step evaluates a
//! boolean sub-operation and picks an action for the true and the false
//! outcome independently: continue with the next step, or stop the chain
//! with a verdict. If every step continues, the chain's end verdict applies.

use std::fmt;

use crate::error::ModelError;
use crate::operation::Operation;

// ──────────────────────────────────────────────
// Verdicts
// ──────────────────────────────────────────────

/// Terminal verdict of a validation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationVerdict {
    Valid,
    Invalid,
    NotApplicable,
    Aborted,
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationVerdict::Valid => "valid",
            ValidationVerdict::Invalid => "invalid",
            ValidationVerdict::NotApplicable => "not applicable",
            ValidationVerdict::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Verdict plus the optional explanatory message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub verdict: ValidationVerdict,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn new(verdict: ValidationVerdict, message: Option<String>) -> Self {
        ValidationResult { verdict, message }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.verdict, m),
            None => write!(f, "{}", self.verdict),
        }
    }
}

/// Verdict of an availability chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    Enabled,
    Disabled,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Enabled => f.write_str("enabled"),
            Availability::Disabled => f.write_str("disabled"),
        }
    }
}

// ──────────────────────────────────────────────
// Validation chain
// ──────────────────────────────────────────────

/// What a validation step does with one outcome of its condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationAction {
    NextStep,
    /// Stop the chain. `message` is a text-producing operation; when it is
    /// absent a `CheckWithMessage` step falls back to its own message.
    Stop {
        verdict: ValidationVerdict,
        message: Option<Operation>,
    },
}

impl ValidationAction {
    pub fn stop(verdict: ValidationVerdict) -> Self {
        ValidationAction::Stop {
            verdict,
            message: None,
        }
    }

    pub fn stop_with(verdict: ValidationVerdict, message: Operation) -> Self {
        ValidationAction::Stop {
            verdict,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStep {
    /// `condition` produces a Bool.
    Check {
        condition: Operation,
        on_true: ValidationAction,
        on_false: ValidationAction,
    },
    /// `condition` produces a BoolWithMessage, so the decision and the
    /// explanation come out of a single evaluation.
    CheckWithMessage {
        condition: Operation,
        on_true: ValidationAction,
        on_false: ValidationAction,
    },
}

impl ValidationStep {
    /// Continue when the condition holds, stop as invalid otherwise.
    pub fn require(condition: Operation, message: Option<Operation>) -> Self {
        ValidationStep::Check {
            condition,
            on_true: ValidationAction::NextStep,
            on_false: ValidationAction::Stop {
                verdict: ValidationVerdict::Invalid,
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationChain {
    steps: Vec<ValidationStep>,
    end_verdict: ValidationVerdict,
    end_message: Option<Operation>,
}

impl ValidationChain {
    pub fn new(
        steps: Vec<ValidationStep>,
        end_verdict: ValidationVerdict,
        end_message: Option<Operation>,
    ) -> Result<Self, ModelError> {
        if steps.is_empty() {
            return Err(ModelError::EmptyChain {
                chain: "validation",
            });
        }
        Ok(ValidationChain {
            steps,
            end_verdict,
            end_message,
        })
    }

    pub fn steps(&self) -> &[ValidationStep] {
        &self.steps
    }

    pub fn end_verdict(&self) -> ValidationVerdict {
        self.end_verdict
    }

    pub fn end_message(&self) -> Option<&Operation> {
        self.end_message.as_ref()
    }
}

// ──────────────────────────────────────────────
// Availability chain
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityAction {
    NextStep,
    Stop(Availability),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityStep {
    pub condition: Operation,
    pub on_true: AvailabilityAction,
    pub on_false: AvailabilityAction,
}

impl AvailabilityStep {
    /// Disable the cell when `condition` is false, otherwise continue.
    pub fn enabled_when(condition: Operation) -> Self {
        AvailabilityStep {
            condition,
            on_true: AvailabilityAction::NextStep,
            on_false: AvailabilityAction::Stop(Availability::Disabled),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityCheckChain {
    steps: Vec<AvailabilityStep>,
    end: Availability,
}

impl AvailabilityCheckChain {
    pub fn new(steps: Vec<AvailabilityStep>, end: Availability) -> Result<Self, ModelError> {
        if steps.is_empty() {
            return Err(ModelError::EmptyChain {
                chain: "availability check",
            });
        }
        Ok(AvailabilityCheckChain { steps, end })
    }

    pub fn steps(&self) -> &[AvailabilityStep] {
        &self.steps
    }

    pub fn end(&self) -> Availability {
        self.end
    }
}

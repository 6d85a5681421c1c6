//! Validation and availability chain evaluation.
//!
//! Both chains are step interpreters: each step evaluates its condition
//! through the protocol chain and picks the action for the outcome. The
//! first action that is not `NextStep` decides; otherwise the chain's end
//! verdict applies.
//!
//! In a validation chain, an abort or not-applicable signal raised while
//! evaluating a step becomes the `Aborted` / `NotApplicable` verdict with no
//! message. The thrower's message is dropped: chains surface messages only
//! through their own message operations. Every other error is returned to
//! the caller. Availability chains return all errors.

use tabulon_model::{
    Availability, AvailabilityAction, AvailabilityCheckChain, Operation, ValidationAction,
    ValidationChain, ValidationResult, ValidationStep, ValidationVerdict, Value, ValueKind,
};

use crate::context::EvalContext;
use crate::error::EvalError;
use crate::protocol::builtin::{expect_bool, expect_text};

// ──────────────────────────────────────────────
// Validation
// ──────────────────────────────────────────────

enum Decision<'s> {
    Continue,
    Stop {
        verdict: ValidationVerdict,
        message: Option<&'s Operation>,
        /// Message carried by a `CheckWithMessage` condition.
        fallback: Option<String>,
    },
}

fn condition_of(step: &ValidationStep) -> &Operation {
    match step {
        ValidationStep::Check { condition, .. } | ValidationStep::CheckWithMessage { condition, .. } => {
            condition
        }
    }
}

fn decide(step: &ValidationStep, value: Value) -> Result<Decision<'_>, EvalError> {
    let (action, fallback) = match step {
        ValidationStep::Check {
            on_true, on_false, ..
        } => {
            let holds = expect_bool(value, "validation condition")?;
            (if holds { on_true } else { on_false }, None)
        }
        ValidationStep::CheckWithMessage {
            on_true, on_false, ..
        } => match value {
            Value::BoolWithMessage { value, message } => {
                (if value { on_true } else { on_false }, message)
            }
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: ValueKind::BoolWithMessage,
                    actual: other.type_name(),
                    context: "validation condition".to_string(),
                })
            }
        },
    };
    Ok(match action {
        ValidationAction::NextStep => Decision::Continue,
        ValidationAction::Stop { verdict, message } => Decision::Stop {
            verdict: *verdict,
            message: message.as_ref(),
            fallback,
        },
    })
}

fn signal_verdict(err: EvalError) -> Result<ValidationResult, EvalError> {
    match err {
        EvalError::Aborted(_) => Ok(ValidationResult::new(ValidationVerdict::Aborted, None)),
        EvalError::NotApplicable(_) => Ok(ValidationResult::new(
            ValidationVerdict::NotApplicable,
            None,
        )),
        other => Err(other),
    }
}

/// Run a validation chain in `cx`, whose current cell is the one validated.
pub fn validate(
    chain: &ValidationChain,
    cx: &EvalContext<'_>,
) -> Result<ValidationResult, EvalError> {
    run_validation(chain, cx).or_else(signal_verdict)
}

fn run_validation(
    chain: &ValidationChain,
    cx: &EvalContext<'_>,
) -> Result<ValidationResult, EvalError> {
    for step in chain.steps() {
        let value = cx.evaluate(condition_of(step))?;
        if let Decision::Stop {
            verdict,
            message,
            fallback,
        } = decide(step, value)?
        {
            let message = match message {
                Some(op) => expect_text(cx.evaluate(op)?, "validation message")?,
                None => fallback,
            };
            return Ok(ValidationResult::new(verdict, message));
        }
    }
    let message = match chain.end_message() {
        Some(op) => expect_text(cx.evaluate(op)?, "validation message")?,
        None => None,
    };
    Ok(ValidationResult::new(chain.end_verdict(), message))
}

pub async fn validate_async(
    chain: &ValidationChain,
    cx: &EvalContext<'_>,
) -> Result<ValidationResult, EvalError> {
    run_validation_async(chain, cx).await.or_else(signal_verdict)
}

async fn run_validation_async(
    chain: &ValidationChain,
    cx: &EvalContext<'_>,
) -> Result<ValidationResult, EvalError> {
    for step in chain.steps() {
        let value = cx.evaluate_async(condition_of(step)).await?;
        if let Decision::Stop {
            verdict,
            message,
            fallback,
        } = decide(step, value)?
        {
            let message = match message {
                Some(op) => expect_text(cx.evaluate_async(op).await?, "validation message")?,
                None => fallback,
            };
            return Ok(ValidationResult::new(verdict, message));
        }
    }
    let message = match chain.end_message() {
        Some(op) => expect_text(cx.evaluate_async(op).await?, "validation message")?,
        None => None,
    };
    Ok(ValidationResult::new(chain.end_verdict(), message))
}

// ──────────────────────────────────────────────
// Availability
// ──────────────────────────────────────────────

pub fn check_availability(
    chain: &AvailabilityCheckChain,
    cx: &EvalContext<'_>,
) -> Result<Availability, EvalError> {
    for step in chain.steps() {
        let holds = expect_bool(cx.evaluate(&step.condition)?, "availability condition")?;
        if let AvailabilityAction::Stop(availability) = pick(holds, step.on_true, step.on_false) {
            return Ok(availability);
        }
    }
    Ok(chain.end())
}

pub async fn check_availability_async(
    chain: &AvailabilityCheckChain,
    cx: &EvalContext<'_>,
) -> Result<Availability, EvalError> {
    for step in chain.steps() {
        let value = cx.evaluate_async(&step.condition).await?;
        let holds = expect_bool(value, "availability condition")?;
        if let AvailabilityAction::Stop(availability) = pick(holds, step.on_true, step.on_false) {
            return Ok(availability);
        }
    }
    Ok(chain.end())
}

fn pick(holds: bool, on_true: AvailabilityAction, on_false: AvailabilityAction) -> AvailabilityAction {
    if holds {
        on_true
    } else {
        on_false
    }
}

//! Host protocol integration tests.
//!
//! Host applications extend the evaluator by putting their own protocol
//! sources in front of the built-in ones. These tests cover custom
//! operation kinds, shadowing of built-ins, custom value kinds, and the
//! once-per-pass execution guarantee observed through a counting protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tabulon_eval::{
    EvalContext, EvalError, Protocol, ProtocolFactory, ProtocolKey, ProtocolSource,
    RecalcOptions, ReportAgent,
};
use tabulon_model::{
    Availability, AvailabilityCheckChain, AvailabilityState, AvailabilityStep, Cell, CellLocator,
    Column, CompareOp, CustomOperation, Operation, OperationTag, Report, Row, Section, TreeTable,
    ValidationChain, ValidationStep, ValidationVerdict, Value, ValueKind,
};
use time::macros::datetime;
use time::OffsetDateTime;

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

const T0: OffsetDateTime = datetime!(2026-05-01 10:00 UTC);
const T1: OffsetDateTime = datetime!(2026-05-02 10:00 UTC);

fn report(cells: Vec<Cell>) -> Report {
    let columns = (0..cells.len())
        .map(|i| Column::new(format!("c{}", i), "col"))
        .collect();
    let table = TreeTable::with_rows(columns, vec![Row::new("r0", cells)]).unwrap();
    Report::new("host", vec![Section::new("main", "Main", table)]).unwrap()
}

fn at(cell: &str) -> CellLocator {
    CellLocator::standard("main", cell)
}

fn get_decimal(cell: &str) -> Operation {
    Operation::cell_value::<Decimal>(CellLocator::in_section(cell))
}

fn custom(name: &str, result: ValueKind) -> Operation {
    Operation::custom(CustomOperation::new(name, result))
}

fn source(key: ProtocolKey, protocol: Arc<dyn Protocol>) -> Arc<dyn ProtocolSource> {
    Arc::new(ProtocolFactory::builder("host").register(key, protocol).build())
}

/// Returns a fixed decimal and counts how often it ran.
struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Protocol for Counting {
    fn execute(&self, _op: &Operation, _cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Decimal(Decimal::TEN))
    }
}

/// Doubles its single argument, evaluated through the context.
struct Double;

impl Protocol for Double {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::Custom(custom) = op else {
            return Err(EvalError::Host("double expects a custom operation".into()));
        };
        let arg = custom
            .args
            .first()
            .ok_or_else(|| EvalError::Host("double takes one argument".into()))?;
        match cx.evaluate(arg)? {
            Value::Decimal(d) => Ok(Value::Decimal(d * Decimal::TWO)),
            other => Err(EvalError::Host(format!("cannot double {}", other.type_name()))),
        }
    }
}

/// True when its Validity argument is valid.
struct IsValid;

impl Protocol for IsValid {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let Operation::Custom(custom) = op else {
            return Err(EvalError::Host("is_valid expects a custom operation".into()));
        };
        let arg = custom
            .args
            .first()
            .ok_or_else(|| EvalError::Host("is_valid takes one argument".into()))?;
        match cx.evaluate(arg)? {
            Value::Validity(result) => Ok(Value::Bool(result.verdict == ValidationVerdict::Valid)),
            other => Err(EvalError::Host(format!("not a validity: {}", other.type_name()))),
        }
    }
}

// ──────────────────────────────────────────────
// Memoization
// ──────────────────────────────────────────────

fn counted_report() -> Report {
    report(vec![
        Cell::operation(Operation::sum(ValueKind::DECIMAL, vec![get_decimal("base")])).with_id("a"),
        Cell::operation(Operation::sum(
            ValueKind::DECIMAL,
            vec![get_decimal("base"), get_decimal("base")],
        ))
        .with_id("b"),
        Cell::operation(custom("counted", ValueKind::DECIMAL)).with_id("base"),
    ])
}

fn counting_options(calls: &Arc<AtomicUsize>) -> RecalcOptions {
    RecalcOptions::new().with_source(source(
        ProtocolKey::custom("counted", ValueKind::DECIMAL),
        Arc::new(Counting {
            calls: Arc::clone(calls),
        }),
    ))
}

#[test]
fn each_cell_executes_once_per_pass() {
    let calls = Arc::new(AtomicUsize::new(0));
    let options = counting_options(&calls);
    let mut agent = ReportAgent::new(counted_report());

    agent.recalc(T0, &options).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(agent.value_of::<Decimal>(&at("a")), Ok(Some(Decimal::TEN)));
    assert_eq!(
        agent.value_of::<Decimal>(&at("b")),
        Ok(Some(Decimal::from(20)))
    );

    agent.recalc(T1, &options).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn async_pass_executes_once_too() {
    let calls = Arc::new(AtomicUsize::new(0));
    let options = counting_options(&calls);
    let mut agent = ReportAgent::new(counted_report());

    agent.recalc_async(T0, &options).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        agent.value_of::<Decimal>(&at("b")),
        Ok(Some(Decimal::from(20)))
    );
}

// ──────────────────────────────────────────────
// Dispatch
// ──────────────────────────────────────────────

#[test]
fn unknown_custom_operation_is_fatal() {
    let mut agent = ReportAgent::new(report(vec![
        Cell::operation(custom("counted", ValueKind::DECIMAL)).with_id("base"),
    ]));
    assert_eq!(
        agent.recalc(T0, &RecalcOptions::default()),
        Err(EvalError::ProtocolNotFound {
            tag: OperationTag::Custom("counted".into()),
            result: ValueKind::DECIMAL,
        })
    );
}

#[test]
fn host_protocols_can_evaluate_children() {
    let doubled = Operation::custom(
        CustomOperation::new("double", ValueKind::DECIMAL).with_args(vec![get_decimal("price")]),
    );
    let mut agent = ReportAgent::new(report(vec![
        Cell::constant(Decimal::new(125, 2)).with_id("price"),
        Cell::operation(doubled).with_id("twice"),
    ]));
    let options = RecalcOptions::new().with_source(source(
        ProtocolKey::custom("double", ValueKind::DECIMAL),
        Arc::new(Double),
    ));

    agent.recalc(T0, &options).unwrap();
    assert_eq!(
        agent.value_of::<Decimal>(&at("twice")),
        Ok(Some(Decimal::new(250, 2)))
    );
}

#[test]
fn host_source_shadows_builtin() {
    let cells = || {
        report(vec![
            Cell::constant(Decimal::ONE).with_id("one"),
            Cell::operation(Operation::sum(
                ValueKind::DECIMAL,
                vec![get_decimal("one"), get_decimal("one")],
            ))
            .with_id("total"),
        ])
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let shadowing = RecalcOptions::new().with_source(source(
        ProtocolKey::new(OperationTag::Sum, ValueKind::DECIMAL),
        Arc::new(Counting {
            calls: Arc::clone(&calls),
        }),
    ));

    let mut plain = ReportAgent::new(cells());
    plain.recalc(T0, &RecalcOptions::default()).unwrap();
    assert_eq!(
        plain.value_of::<Decimal>(&at("total")),
        Ok(Some(Decimal::TWO))
    );

    let mut shadowed = ReportAgent::new(cells());
    shadowed.recalc(T0, &shadowing).unwrap();
    assert_eq!(
        shadowed.value_of::<Decimal>(&at("total")),
        Ok(Some(Decimal::TEN))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn custom_value_kinds_need_builtin_tables() {
    struct Money;

    impl Protocol for Money {
        fn execute(&self, _op: &Operation, _cx: &EvalContext<'_>) -> Result<Value, EvalError> {
            Ok(Value::Custom {
                type_name: "money".into(),
                payload: json!({ "amount": "12.50", "currency": "EUR" }),
            })
        }
    }

    let money = ValueKind::Custom("money".into());
    let cells = || {
        report(vec![
            Cell::operation(custom("fee", money.clone())).with_id("fee"),
            Cell::operation(Operation::cell_value_of(
                CellLocator::in_section("fee"),
                money.clone(),
            ))
            .with_id("fee_copy"),
        ])
    };
    let host = source(ProtocolKey::custom("fee", money.clone()), Arc::new(Money));

    let mut agent = ReportAgent::new(cells());
    let err = agent
        .recalc(T0, &RecalcOptions::new().with_source(Arc::clone(&host)))
        .unwrap_err();
    assert_eq!(
        err,
        EvalError::ProtocolNotFound {
            tag: OperationTag::GetCellValue,
            result: money.clone(),
        }
    );

    let mut agent = ReportAgent::new(cells());
    agent
        .recalc(
            T0,
            &RecalcOptions::new()
                .with_source(host)
                .with_kind(money.clone()),
        )
        .unwrap();
    assert_eq!(
        agent.cell_value(&at("fee_copy")),
        Ok(Some(Value::Custom {
            type_name: "money".into(),
            payload: json!({ "amount": "12.50", "currency": "EUR" }),
        }))
    );
}

#[test]
fn returned_value_must_match_declared_kind() {
    // The counting protocol returns a decimal for an operation declared Int.
    let calls = Arc::new(AtomicUsize::new(0));
    let mut agent = ReportAgent::new(report(vec![
        Cell::operation(custom("counted", ValueKind::INT)).with_id("n"),
    ]));
    let options = RecalcOptions::new().with_source(source(
        ProtocolKey::custom("counted", ValueKind::INT),
        Arc::new(Counting {
            calls: Arc::clone(&calls),
        }),
    ));
    let summary = agent.recalc(T0, &options).unwrap();
    assert_eq!(summary.failed_cells, vec!["n".to_string()]);
}

// ──────────────────────────────────────────────
// Rule chains reading other verdicts
// ──────────────────────────────────────────────

#[test]
fn availability_can_depend_on_validity() {
    let qty_rules = ValidationChain::new(
        vec![ValidationStep::require(
            Operation::compare(
                Operation::cell_value::<i64>(CellLocator::self_cell()),
                CompareOp::Gt,
                Operation::constant(0i64),
            ),
            None,
        )],
        ValidationVerdict::Valid,
        None,
    )
    .unwrap();
    let qty_is_valid = Operation::custom(
        CustomOperation::new("is_valid", ValueKind::BOOL).with_args(vec![Operation::GetValidity {
            locator: CellLocator::in_section("qty"),
        }]),
    );
    let note_availability =
        AvailabilityCheckChain::new(vec![AvailabilityStep::enabled_when(qty_is_valid)], Availability::Enabled)
            .unwrap();

    let mut agent = ReportAgent::new(report(vec![
        Cell::input::<i64>().with_id("qty").with_validation(qty_rules),
        Cell::input::<String>()
            .with_id("note")
            .with_availability(note_availability),
    ]));
    let options = RecalcOptions::new().with_source(source(
        ProtocolKey::custom("is_valid", ValueKind::BOOL),
        Arc::new(IsValid),
    ));

    agent.set_input_value(&at("qty"), Some(3i64), T0).unwrap();
    agent.recalc(T0, &options).unwrap();
    assert_eq!(agent.availability(&at("note")), Ok(AvailabilityState::Enabled));

    agent.set_input_value(&at("qty"), Some(0i64), T1).unwrap();
    agent
        .set_input_value(&at("note"), Some("rush".to_string()), T1)
        .unwrap();
    let summary = agent.recalc(T1, &options).unwrap();
    assert_eq!(agent.availability(&at("note")), Ok(AvailabilityState::Disabled));
    assert_eq!(summary.cleared_inputs, vec!["note".to_string()]);
    assert_eq!(summary.passes, 2);
}

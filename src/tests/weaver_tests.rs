//! Tests for body rewriting order and pipeline idempotence

use crate::config::WeaveOptions;
use crate::model::{
    ClassBuilder, ClassId, CompilationUnit, FieldType, MethodBuilder, MethodSignature, SigKey,
    Statement,
};
use crate::pipeline::{weave, Phase};
use crate::value::Value;

fn key(name: &str, arity: usize) -> SigKey {
    MethodSignature {
        name: name.to_string(),
        params: (0..arity).map(|i| format!("p{}", i)).collect(),
    }
    .key()
}

fn statements<'a>(unit: &'a CompilationUnit, class: ClassId, key: &SigKey) -> &'a [Statement] {
    &unit.class(class).method(key).unwrap().body.statements
}

fn account_unit() -> (CompilationUnit, ClassId) {
    let mut unit = CompilationUnit::new();
    let id = ClassBuilder::new("bank.Account")
        .field("balance", FieldType::Int)
        .invariant("balance >= 0", |ctx| {
            Ok(ctx.field("balance")?.as_int()? >= 0)
        })
        .method(
            MethodBuilder::new("withdraw")
                .param("amount")
                .precondition("amount > 0", |ctx| Ok(ctx.arg("amount")?.as_int()? > 0))
                .postcondition("result == old(balance) - amount", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(ctx.result()?.as_int()? == ctx.old("balance")?.as_int()? - amount)
                })
                .body(|frame| {
                    let next =
                        frame.get_field("balance")?.as_int()? - frame.arg("amount")?.as_int()?;
                    frame.set_field("balance", Value::Int(next))
                })
                .returns(|frame| frame.get_field("balance")),
        )
        .register(&mut unit)
        .unwrap();
    (unit, id)
}

#[test]
fn test_injected_statement_order() {
    let (mut unit, id) = account_unit();
    weave(&mut unit, WeaveOptions::all()).unwrap();

    let stmts = statements(&unit, id, &key("withdraw", 1));
    assert_eq!(stmts.len(), 7, "statements: {:?}", stmts);
    assert!(matches!(stmts[0], Statement::CheckPrecondition(_)));
    assert!(matches!(stmts[1], Statement::CaptureOldState(_)));
    assert!(matches!(stmts[2], Statement::Exec(_)));
    assert!(matches!(stmts[3], Statement::BindResult(_)));
    assert!(matches!(stmts[4], Statement::CheckPostcondition(_)));
    assert!(matches!(
        stmts[5],
        Statement::CheckInvariant { entry: false, .. }
    ));
    assert!(matches!(stmts[6], Statement::ReturnBound));
}

#[test]
fn test_weaving_twice_changes_nothing() {
    let (mut unit, id) = account_unit();
    let first = weave(&mut unit, WeaveOptions::all()).unwrap();
    let woven_len = statements(&unit, id, &key("withdraw", 1)).len();

    let second = weave(&mut unit, WeaveOptions::all()).unwrap();
    assert_eq!(statements(&unit, id, &key("withdraw", 1)).len(), woven_len);
    assert!(unit.class(id).method(&key("withdraw", 1)).unwrap().marks.any());
    assert_eq!(first.preconditions_injected, 1);
    assert_eq!(second.preconditions_injected, 0);
    assert_eq!(second.invariants_injected, 0);
    assert_eq!(second.setters_wrapped, 0);
}

#[test]
fn test_disabled_options_leave_bodies_untouched() {
    let (mut unit, id) = account_unit();
    let report = weave(&mut unit, WeaveOptions::none()).unwrap();

    let stmts = statements(&unit, id, &key("withdraw", 1));
    assert_eq!(stmts.len(), 2);
    assert!(matches!(stmts[0], Statement::Exec(_)));
    assert!(matches!(stmts[1], Statement::Return(_)));
    assert_eq!(report.preconditions_injected, 0);
    assert_eq!(report.invariants_injected, 0);
}

#[test]
fn test_super_ctor_call_stays_first() {
    let mut unit = CompilationUnit::new();
    let base = ClassBuilder::new("app.Base")
        .method(MethodBuilder::constructor())
        .register(&mut unit)
        .unwrap();
    let derived = ClassBuilder::new("app.Derived")
        .extends(base)
        .field("count", FieldType::Int)
        .method(
            MethodBuilder::constructor()
                .param("count")
                .precondition("count >= 0", |ctx| Ok(ctx.arg("count")?.as_int()? >= 0))
                .super_ctor_call()
                .body(|frame| {
                    let count = frame.arg("count")?;
                    frame.set_field("count", count)
                }),
        )
        .register(&mut unit)
        .unwrap();
    weave(&mut unit, WeaveOptions::all()).unwrap();

    let stmts = statements(&unit, derived, &key("constructor", 1));
    assert!(matches!(stmts[0], Statement::SuperCtorCall));
    assert!(matches!(stmts[1], Statement::CheckPrecondition(_)));
}

#[test]
fn test_bare_return_still_precedes_invariant_hand_back() {
    // No pre/postcondition, so the pre/post pass leaves the body alone and
    // the invariant pass has to extract the trailing return itself.
    let mut unit = CompilationUnit::new();
    let id = ClassBuilder::new("app.Gauge")
        .field("level", FieldType::Int)
        .invariant("level >= 0", |ctx| Ok(ctx.field("level")?.as_int()? >= 0))
        .method(MethodBuilder::new("level").returns(|frame| frame.get_field("level")))
        .register(&mut unit)
        .unwrap();
    weave(&mut unit, WeaveOptions::all()).unwrap();

    let stmts = statements(&unit, id, &key("level", 0));
    assert!(matches!(stmts[0], Statement::BindResult(_)));
    assert!(matches!(
        stmts[1],
        Statement::CheckInvariant { entry: false, .. }
    ));
    assert!(matches!(stmts[2], Statement::ReturnBound));
}

#[test]
fn test_report_serializes_for_build_logs() {
    let (mut unit, _) = account_unit();
    let report = weave(&mut unit, WeaveOptions::all()).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["classes_total"], 1);
    assert_eq!(json["preconditions_injected"], 1);
    assert_eq!(json["snapshot_plans"], 1);
}

#[test]
fn test_setters_get_entry_and_exit_invariant_checks() {
    let mut unit = CompilationUnit::new();
    let id = ClassBuilder::new("app.Gauge")
        .field("level", FieldType::Int)
        .invariant("level >= 0", |ctx| Ok(ctx.field("level")?.as_int()? >= 0))
        .method(
            MethodBuilder::new("set_level")
                .param("value")
                .setter()
                .body(|frame| {
                    let value = frame.arg("value")?;
                    frame.set_field("level", value)
                }),
        )
        .register(&mut unit)
        .unwrap();
    let report = weave(&mut unit, WeaveOptions::all()).unwrap();
    assert_eq!(report.setters_wrapped, 1);

    let stmts = statements(&unit, id, &key("set_level", 1));
    assert_eq!(stmts.len(), 3);
    assert!(matches!(
        stmts[0],
        Statement::CheckInvariant { entry: true, .. }
    ));
    assert!(matches!(stmts[1], Statement::Exec(_)));
    assert!(matches!(
        stmts[2],
        Statement::CheckInvariant { entry: false, .. }
    ));
}

#[test]
fn test_fluent_setter_exit_check_precedes_return() {
    let mut unit = CompilationUnit::new();
    let id = ClassBuilder::new("app.Gauge")
        .field("level", FieldType::Int)
        .invariant("level >= 0", |ctx| Ok(ctx.field("level")?.as_int()? >= 0))
        .method(
            MethodBuilder::new("set_level")
                .param("value")
                .setter()
                .body(|frame| {
                    let value = frame.arg("value")?;
                    frame.set_field("level", value)
                })
                .returns(|frame| frame.get_field("level")),
        )
        .register(&mut unit)
        .unwrap();
    weave(&mut unit, WeaveOptions::all()).unwrap();

    let stmts = statements(&unit, id, &key("set_level", 1));
    assert_eq!(stmts.len(), 5, "statements: {:?}", stmts);
    assert!(matches!(
        stmts[0],
        Statement::CheckInvariant { entry: true, .. }
    ));
    assert!(matches!(stmts[1], Statement::Exec(_)));
    assert!(matches!(stmts[2], Statement::BindResult(_)));
    assert!(matches!(
        stmts[3],
        Statement::CheckInvariant { entry: false, .. }
    ));
    assert!(matches!(stmts[4], Statement::ReturnBound));
}

#[test]
fn test_phases_are_listed_in_execution_order() {
    let names: Vec<String> = Phase::ALL.iter().map(|p| p.to_string()).collect();
    assert_eq!(
        names,
        [
            "classify",
            "combine",
            "generate-snapshots",
            "inject-pre-post",
            "inject-invariants",
            "wrap-setters",
        ]
    );
}

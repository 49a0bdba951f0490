//! End-to-end tests: weave a unit, execute it, observe the checks

use contract_weave::{
    weave, AssertionKind, ClassBuilder, CompilationUnit, ContractError, ContractResult,
    ContractRuntime, ContractViolation, FieldType, MethodBuilder, RuntimeToggles, Value,
    WeaveOptions,
};

fn violation(result: ContractResult<Value>) -> ContractViolation {
    match result {
        Err(ContractError::Violation(violation)) => violation,
        other => panic!("expected a contract violation, got {:?}", other),
    }
}

fn account_unit() -> CompilationUnit {
    let mut unit = CompilationUnit::new();
    ClassBuilder::new("bank.Account")
        .field("balance", FieldType::Int)
        .invariant("balance >= 0", |ctx| {
            Ok(ctx.field("balance")?.as_int()? >= 0)
        })
        .method(
            MethodBuilder::new("deposit")
                .param("amount")
                .precondition("amount > 0", |ctx| Ok(ctx.arg("amount")?.as_int()? > 0))
                .body(|frame| {
                    let next =
                        frame.get_field("balance")?.as_int()? + frame.arg("amount")?.as_int()?;
                    frame.set_field("balance", Value::Int(next))
                }),
        )
        .method(
            MethodBuilder::new("withdraw")
                .param("amount")
                .precondition("amount > 0 && amount <= balance", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(amount > 0 && amount <= ctx.field("balance")?.as_int()?)
                })
                .postcondition("balance == old(balance) - amount", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(ctx.field("balance")?.as_int()? == ctx.old("balance")?.as_int()? - amount)
                })
                .body(|frame| {
                    let next =
                        frame.get_field("balance")?.as_int()? - frame.arg("amount")?.as_int()?;
                    frame.set_field("balance", Value::Int(next))
                })
                .returns(|frame| frame.get_field("balance")),
        )
        .method(
            MethodBuilder::new("force_balance").param("value").body(|frame| {
                let value = frame.arg("value")?;
                frame.set_field("balance", value)
            }),
        )
        .register(&mut unit)
        .unwrap();
    unit
}

fn woven_runtime(mut unit: CompilationUnit, toggles: RuntimeToggles) -> ContractRuntime {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    weave(&mut unit, WeaveOptions::all()).unwrap();
    ContractRuntime::new(unit, &toggles)
}

#[test]
fn test_passing_calls_flow_through() {
    let runtime = woven_runtime(account_unit(), RuntimeToggles::new());
    let account = runtime.instantiate("bank.Account", &[]).unwrap();

    runtime.call(&account, "deposit", &[Value::Int(100)]).unwrap();
    let remaining = runtime.call(&account, "withdraw", &[Value::Int(30)]).unwrap();
    assert_eq!(remaining, Value::Int(70));
    assert_eq!(account.get_field("balance"), Some(Value::Int(70)));
}

#[test]
fn test_precondition_violation_aborts_before_the_body() {
    let runtime = woven_runtime(account_unit(), RuntimeToggles::new());
    let account = runtime.instantiate("bank.Account", &[]).unwrap();
    runtime.call(&account, "deposit", &[Value::Int(100)]).unwrap();

    let violation = violation(runtime.call(&account, "withdraw", &[Value::Int(-5)]));
    assert_eq!(violation.kind(), AssertionKind::Precondition);
    assert_eq!(violation.class_name(), "bank.Account");
    assert_eq!(violation.method_name(), Some("withdraw(amount)"));
    assert!(violation.predicate_source().unwrap().contains("amount > 0"));
    // The body never ran
    assert_eq!(account.get_field("balance"), Some(Value::Int(100)));
}

#[test]
fn test_postcondition_compares_against_old_state() {
    let mut unit = account_unit();
    // Same contract, broken implementation: deducts twice
    ClassBuilder::new("bank.BuggyAccount")
        .field("balance", FieldType::Int)
        .method(
            MethodBuilder::new("withdraw")
                .param("amount")
                .postcondition("balance == old(balance) - amount", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(ctx.field("balance")?.as_int()? == ctx.old("balance")?.as_int()? - amount)
                })
                .body(|frame| {
                    let next = frame.get_field("balance")?.as_int()?
                        - 2 * frame.arg("amount")?.as_int()?;
                    frame.set_field("balance", Value::Int(next))
                }),
        )
        .register(&mut unit)
        .unwrap();
    let runtime = woven_runtime(unit, RuntimeToggles::new());

    let account = runtime.instantiate("bank.BuggyAccount", &[]).unwrap();
    account.set_field("balance", Value::Int(100));

    let violation = violation(runtime.call(&account, "withdraw", &[Value::Int(10)]));
    assert_eq!(violation.kind(), AssertionKind::Postcondition);
    assert_eq!(violation.method_name(), Some("withdraw(amount)"));
}

#[test]
fn test_invariant_violation_after_state_corruption() {
    let runtime = woven_runtime(account_unit(), RuntimeToggles::new());
    let account = runtime.instantiate("bank.Account", &[]).unwrap();

    let violation = violation(runtime.call(&account, "force_balance", &[Value::Int(-10)]));
    assert_eq!(violation.kind(), AssertionKind::Invariant);
    assert_eq!(violation.class_name(), "bank.Account");
    assert_eq!(violation.method_name(), Some("force_balance(value)"));
}

#[test]
fn test_constructor_invariant_runs_on_the_finished_object() {
    let mut unit = CompilationUnit::new();
    let base = ClassBuilder::new("app.Base")
        .field("ready", FieldType::Bool)
        .invariant("ready", |ctx| ctx.field("ready")?.as_bool())
        .method(MethodBuilder::constructor())
        .register(&mut unit)
        .unwrap();
    ClassBuilder::new("app.Derived")
        .extends(base)
        .method(
            MethodBuilder::constructor()
                .super_ctor_call()
                .body(|frame| frame.set_field("ready", Value::Bool(true))),
        )
        .register(&mut unit)
        .unwrap();
    let runtime = woven_runtime(unit, RuntimeToggles::new());

    // The inherited invariant only holds after the derived constructor body;
    // the check must not fire on the superclass layer.
    runtime.instantiate("app.Derived", &[]).unwrap();
}

#[test]
fn test_constructor_that_breaks_the_invariant_fails() {
    let mut unit = CompilationUnit::new();
    ClassBuilder::new("app.Strict")
        .field("ready", FieldType::Bool)
        .invariant("ready", |ctx| ctx.field("ready")?.as_bool())
        .method(MethodBuilder::constructor())
        .register(&mut unit)
        .unwrap();
    let runtime = woven_runtime(unit, RuntimeToggles::new());

    let err = runtime.instantiate("app.Strict", &[]).unwrap_err();
    let ContractError::Violation(violation) = err else {
        panic!("expected a contract violation, got {:?}", err);
    };
    assert_eq!(violation.kind(), AssertionKind::Invariant);
    assert_eq!(violation.class_name(), "app.Strict");
    assert_eq!(violation.method_name(), Some("constructor()"));
}

#[test]
fn test_disabled_class_runs_without_checks() {
    let toggles = RuntimeToggles::new().disable("bank");
    let runtime = woven_runtime(account_unit(), toggles);
    let account = runtime.instantiate("bank.Account", &[]).unwrap();
    runtime.call(&account, "deposit", &[Value::Int(100)]).unwrap();

    // Precondition, postcondition, and invariant all stay silent
    let remaining = runtime.call(&account, "withdraw", &[Value::Int(-5)]).unwrap();
    assert_eq!(remaining, Value::Int(105));
    runtime.call(&account, "force_balance", &[Value::Int(-10)]).unwrap();
    assert_eq!(account.get_field("balance"), Some(Value::Int(-10)));
}

#[test]
fn test_unknown_lookups_are_plain_errors() {
    let runtime = woven_runtime(account_unit(), RuntimeToggles::new());

    assert!(matches!(
        runtime.instantiate("bank.Missing", &[]),
        Err(ContractError::UnknownClass(_))
    ));

    let account = runtime.instantiate("bank.Account", &[]).unwrap();
    assert!(matches!(
        runtime.call(&account, "transfer", &[]),
        Err(ContractError::UnknownMethod(_))
    ));
}

#[test]
fn test_super_ctor_chain_needs_a_zero_argument_constructor() {
    let mut unit = CompilationUnit::new();
    let base = ClassBuilder::new("app.Sized")
        .field("size", FieldType::Int)
        .method(
            MethodBuilder::constructor().param("size").body(|frame| {
                let size = frame.arg("size")?;
                frame.set_field("size", size)
            }),
        )
        .register(&mut unit)
        .unwrap();
    ClassBuilder::new("app.SizedChild")
        .extends(base)
        .method(MethodBuilder::constructor().super_ctor_call())
        .register(&mut unit)
        .unwrap();
    let runtime = woven_runtime(unit, RuntimeToggles::new());

    // The superclass only offers a parameterized constructor, so the
    // implicit zero-argument chain cannot be satisfied
    let err = runtime.instantiate("app.SizedChild", &[]).unwrap_err();
    assert!(matches!(err, ContractError::Model(_)), "got {:?}", err);
}

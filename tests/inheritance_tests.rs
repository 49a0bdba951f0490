//! Behavioral tests for contract inheritance across a class hierarchy

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

/// Account requires withdrawals of at least 10; SavingsAccount weakens that
/// to any positive amount. BrokenSavings inherits the contract but deducts
/// one too many.
fn bank_unit() -> CompilationUnit {
    let mut unit = CompilationUnit::new();
    let account = ClassBuilder::new("bank.Account")
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
                .precondition("amount >= 10 && amount <= balance", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(amount >= 10 && amount <= ctx.field("balance")?.as_int()?)
                })
                .postcondition("balance == old(balance) - amount", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(ctx.field("balance")?.as_int()? == ctx.old("balance")?.as_int()? - amount)
                })
                .body(|frame| {
                    let next =
                        frame.get_field("balance")?.as_int()? - frame.arg("amount")?.as_int()?;
                    frame.set_field("balance", Value::Int(next))
                }),
        )
        .register(&mut unit)
        .unwrap();

    ClassBuilder::new("bank.SavingsAccount")
        .extends(account)
        .method(
            MethodBuilder::new("withdraw")
                .param("amount")
                .precondition("amount > 0 && amount <= balance", |ctx| {
                    let amount = ctx.arg("amount")?.as_int()?;
                    Ok(amount > 0 && amount <= ctx.field("balance")?.as_int()?)
                })
                .body(|frame| {
                    let next =
                        frame.get_field("balance")?.as_int()? - frame.arg("amount")?.as_int()?;
                    frame.set_field("balance", Value::Int(next))
                }),
        )
        .register(&mut unit)
        .unwrap();

    ClassBuilder::new("bank.BrokenSavings")
        .extends(account)
        .method(
            MethodBuilder::new("withdraw").param("amount").body(|frame| {
                let next =
                    frame.get_field("balance")?.as_int()? - frame.arg("amount")?.as_int()? - 1;
                frame.set_field("balance", Value::Int(next))
            }),
        )
        .register(&mut unit)
        .unwrap();
    unit
}

fn bank_runtime() -> ContractRuntime {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut unit = bank_unit();
    weave(&mut unit, WeaveOptions::all()).unwrap();
    ContractRuntime::new(unit, &RuntimeToggles::new())
}

#[test]
fn test_weakened_precondition_accepts_more_on_the_subclass() {
    let runtime = bank_runtime();
    let savings = runtime.instantiate("bank.SavingsAccount", &[]).unwrap();
    runtime.call(&savings, "deposit", &[Value::Int(100)]).unwrap();

    // Below the base minimum, allowed by the subclass clause
    runtime.call(&savings, "withdraw", &[Value::Int(5)]).unwrap();
    assert_eq!(savings.get_field("balance"), Some(Value::Int(95)));
}

#[test]
fn test_base_class_keeps_its_stricter_precondition() {
    let runtime = bank_runtime();
    let account = runtime.instantiate("bank.Account", &[]).unwrap();
    runtime.call(&account, "deposit", &[Value::Int(100)]).unwrap();

    let violation = violation(runtime.call(&account, "withdraw", &[Value::Int(5)]));
    assert_eq!(violation.kind(), AssertionKind::Precondition);
    assert_eq!(violation.class_name(), "bank.Account");
}

#[test]
fn test_amount_rejected_by_every_clause_still_fails() {
    let runtime = bank_runtime();
    let savings = runtime.instantiate("bank.SavingsAccount", &[]).unwrap();
    runtime.call(&savings, "deposit", &[Value::Int(100)]).unwrap();

    let violation = violation(runtime.call(&savings, "withdraw", &[Value::Int(-1)]));
    assert_eq!(violation.kind(), AssertionKind::Precondition);
    // The subclass declared the most-derived clause of the combined OR
    assert_eq!(violation.class_name(), "bank.SavingsAccount");
    assert_eq!(savings.get_field("balance"), Some(Value::Int(100)));
}

#[test]
fn test_inherited_postcondition_binds_the_override() {
    let runtime = bank_runtime();
    let broken = runtime.instantiate("bank.BrokenSavings", &[]).unwrap();
    runtime.call(&broken, "deposit", &[Value::Int(100)]).unwrap();

    let violation = violation(runtime.call(&broken, "withdraw", &[Value::Int(10)]));
    assert_eq!(violation.kind(), AssertionKind::Postcondition);
    // The violated clause was declared on the base class
    assert_eq!(violation.class_name(), "bank.Account");
    assert_eq!(violation.method_name(), Some("withdraw(amount)"));
}

#[test]
fn test_inherited_invariant_reaches_the_grandchild() {
    let mut unit = bank_unit();
    let savings = unit.resolve("bank.SavingsAccount").unwrap();
    ClassBuilder::new("bank.StudentSavings")
        .extends(savings)
        .method(
            MethodBuilder::new("waive_fees").param("amount").body(|frame| {
                let next =
                    frame.get_field("balance")?.as_int()? - frame.arg("amount")?.as_int()?;
                frame.set_field("balance", Value::Int(next))
            }),
        )
        .register(&mut unit)
        .unwrap();
    weave(&mut unit, WeaveOptions::all()).unwrap();
    let runtime = ContractRuntime::new(unit, &RuntimeToggles::new());

    let student = runtime.instantiate("bank.StudentSavings", &[]).unwrap();
    let violation = violation(runtime.call(&student, "waive_fees", &[Value::Int(50)]));
    assert_eq!(violation.kind(), AssertionKind::Invariant);
    // Two levels up, still enforced and still blamed on its declaring class
    assert_eq!(violation.class_name(), "bank.Account");
    assert_eq!(violation.method_name(), Some("waive_fees(amount)"));
}

#[test]
fn test_undeclared_override_enforces_the_inherited_precondition() {
    let runtime = bank_runtime();
    let broken = runtime.instantiate("bank.BrokenSavings", &[]).unwrap();
    runtime.call(&broken, "deposit", &[Value::Int(20)]).unwrap();

    // The override declared nothing, so only the inherited clause applies
    let violation = violation(runtime.call(&broken, "withdraw", &[Value::Int(50)]));
    assert_eq!(violation.kind(), AssertionKind::Precondition);
    assert_eq!(violation.class_name(), "bank.Account");
    assert_eq!(violation.method_name(), Some("withdraw(amount)"));
    assert_eq!(broken.get_field("balance"), Some(Value::Int(20)));
}

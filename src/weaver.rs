//! Assertion injection: rewriting method bodies with synthesized checks
//!
//! The injector consumes a method's original statement sequence and produces
//! a new one (a functional rewrite, never destructive splicing of a shared
//! tree), in a fixed order from entry to exit:
//!
//! 1. superclass-constructor call (constructors only; stays first)
//! 2. precondition check
//! 3. old-state capture (when a postcondition exists for the method)
//! 4. the original statements, in their original relative order, with a
//!    trailing return expression extracted into the `result` binding
//! 5. postcondition check (sees `result` and the old-state map)
//! 6. invariant check (constructors: outermost layer only, at the very end)
//! 7. hand back the bound `result`
//!
//! Woven methods are marked per pass, so re-entering the pipeline is a
//! no-op. Each synthesized check consults the per-class runtime enable flag
//! before evaluating; a disabled class runs the original statements with
//! nothing beyond the flag test.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::classify;
use crate::config::WeaveOptions;
use crate::contract::Contract;
use crate::model::{ClassId, ClassModel, MethodBody, Statement};
use crate::snapshot::SnapshotPlan;

/// Checks synthesized by one injector pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionCounts {
    pub preconditions: usize,
    pub postconditions: usize,
    pub snapshots: usize,
    pub invariants: usize,
    pub setters_wrapped: usize,
}

/// Rewrites method bodies against the combined contracts
pub struct AssertionInjector<'a> {
    options: &'a WeaveOptions,
    contracts: &'a FxHashMap<ClassId, Contract>,
    plans: &'a FxHashMap<ClassId, SnapshotPlan>,
}

impl<'a> AssertionInjector<'a> {
    pub fn new(
        options: &'a WeaveOptions,
        contracts: &'a FxHashMap<ClassId, Contract>,
        plans: &'a FxHashMap<ClassId, SnapshotPlan>,
    ) -> Self {
        Self {
            options,
            contracts,
            plans,
        }
    }

    /// Inject precondition checks, old-state capture, and postcondition
    /// checks into every candidate method of a class
    pub fn inject_pre_post(&self, class: &mut ClassModel, counts: &mut InjectionCounts) {
        let Some(contract) = self.contracts.get(&class.id) else {
            return;
        };
        let plan = self.plans.get(&class.id);
        let candidacy: Vec<bool> = class
            .methods
            .iter()
            .map(|m| classify::is_candidate_method(class, m))
            .collect();

        for (index, method) in class.methods.iter_mut().enumerate() {
            if !candidacy[index] || method.marks.pre_post {
                continue;
            }
            let key = method.signature.key();
            let pre = self
                .options
                .preconditions
                .then(|| contract.preconditions.get(&key).cloned())
                .flatten();
            let post = self
                .options
                .postconditions
                .then(|| contract.postconditions.get(&key).cloned())
                .flatten();

            if pre.is_none() && post.is_none() {
                method.marks.pre_post = true;
                continue;
            }
            trace!(
                method = %method.signature,
                pre = pre.is_some(),
                post = post.is_some(),
                "rewriting method body"
            );

            let original = std::mem::take(&mut method.body);
            let mut woven = Vec::with_capacity(original.statements.len() + 4);
            let mut statements = original.statements.into_iter().peekable();

            // The mandatory superclass-constructor call stays first.
            if method.is_constructor() {
                if let Some(Statement::SuperCtorCall) = statements.peek() {
                    woven.push(statements.next().expect("peeked statement"));
                }
            }

            if let Some(pre) = pre {
                woven.push(Statement::CheckPrecondition(pre));
                counts.preconditions += 1;
            }

            // Snapshot capture is gated by the same flag as the
            // postcondition it serves; skipped entirely when there is no
            // postcondition, to avoid cloning cost.
            if post.is_some() {
                if let Some(plan) = plan {
                    if !plan.is_empty() {
                        woven.push(Statement::CaptureOldState(plan.clone()));
                        counts.snapshots += 1;
                    }
                }
            }

            let mut rest: Vec<Statement> = statements.collect();
            let trailing_return = matches!(rest.last(), Some(Statement::Return(_)));
            let trailing = if trailing_return { rest.pop() } else { None };
            woven.extend(rest);

            let mut bound = false;
            if let Some(Statement::Return(expr)) = trailing {
                woven.push(Statement::BindResult(expr));
                bound = true;
            }
            if let Some(post) = post {
                woven.push(Statement::CheckPostcondition(post));
                counts.postconditions += 1;
            }
            if bound {
                woven.push(Statement::ReturnBound);
            }

            method.body = MethodBody::new(woven);
            method.marks.pre_post = true;
        }
    }

    /// Inject the exit invariant check into every candidate method
    ///
    /// Runs after the pre/post pass so the check lands after the
    /// postcondition and before the bound result is handed back. Every
    /// candidate class gets the check, including the default true-sentinel
    /// invariant, so the per-instance evaluation discipline is uniform.
    pub fn inject_invariants(&self, class: &mut ClassModel, counts: &mut InjectionCounts) {
        if !self.options.invariants {
            return;
        }
        let Some(contract) = self.contracts.get(&class.id) else {
            return;
        };
        let assertion = contract.invariant.clone();
        let candidacy: Vec<bool> = class
            .methods
            .iter()
            .map(|m| classify::is_candidate_method(class, m))
            .collect();

        for (index, method) in class.methods.iter_mut().enumerate() {
            if !candidacy[index] || method.marks.invariants {
                continue;
            }
            let check = Statement::CheckInvariant {
                assertion: assertion.clone(),
                entry: false,
            };
            let statements = &mut method.body.statements;
            match statements.last() {
                Some(Statement::ReturnBound) => {
                    let at = statements.len() - 1;
                    statements.insert(at, check);
                }
                Some(Statement::Return(_)) => {
                    // Not rewritten by the pre/post pass; extract the
                    // trailing return so the check runs before hand-back.
                    if let Some(Statement::Return(expr)) = statements.pop() {
                        statements.push(Statement::BindResult(expr));
                        statements.push(check);
                        statements.push(Statement::ReturnBound);
                    }
                }
                _ => statements.push(check),
            }
            counts.invariants += 1;
            method.marks.invariants = true;
        }
        debug!(class = %class.name, "invariant checks injected");
    }

    /// Give host-synthesized property setters entry and exit invariant
    /// checks
    ///
    /// Setters mutate state outside normal method injection (they are
    /// synthetic and therefore not classifier candidates), so they get their
    /// own wrapping phase.
    pub fn wrap_setters(&self, class: &mut ClassModel, counts: &mut InjectionCounts) {
        if !self.options.invariants {
            return;
        }
        let Some(contract) = self.contracts.get(&class.id) else {
            return;
        };
        let assertion = contract.invariant.clone();
        for method in &mut class.methods {
            if !method.modifiers.setter || method.marks.setter_wrapped {
                continue;
            }
            method.body.statements.insert(
                0,
                Statement::CheckInvariant {
                    assertion: assertion.clone(),
                    entry: true,
                },
            );
            let exit = Statement::CheckInvariant {
                assertion: assertion.clone(),
                entry: false,
            };
            let statements = &mut method.body.statements;
            match statements.last() {
                Some(Statement::ReturnBound) => {
                    let at = statements.len() - 1;
                    statements.insert(at, exit);
                }
                Some(Statement::Return(_)) => {
                    // A fluent setter returns a value; extract the trailing
                    // return so the exit check runs before hand-back.
                    if let Some(Statement::Return(expr)) = statements.pop() {
                        statements.push(Statement::BindResult(expr));
                        statements.push(exit);
                        statements.push(Statement::ReturnBound);
                    }
                }
                _ => statements.push(exit),
            }
            method.marks.setter_wrapped = true;
            counts.setters_wrapped += 1;
        }
    }
}

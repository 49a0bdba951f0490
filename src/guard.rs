//! Reentrancy guard and violation tracker for guarded evaluation
//!
//! Evaluating an invariant or postcondition predicate may call other
//! instrumented methods on the same instance. Those nested calls would
//! re-trigger checks, risking unbounded recursion or a stack of masked
//! failures. The guard serializes invariant evaluation per instance, cuts
//! cyclic re-entry of the same check on the same thread, and collects nested
//! violations into a thread-local tracker so the first one can be reported
//! as the root cause.
//!
//! The tracker and the execution marks are thread-local scoped resources:
//! they are initialized when a guarded evaluation begins and torn down on
//! all exit paths, including predicate failure and evaluation errors.

use std::cell::RefCell;
use std::time::Instant;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::contract::{AssertionKind, Predicate};
use crate::errors::{ContractResult, ContractViolation};
use crate::evaluator::EvalContext;
use crate::model::SigKey;
use crate::runtime::InstanceRef;

/// One violation observed during a guarded evaluation
///
/// Created when a nested check fails inside a guarded scope; discarded when
/// the scope exits.
#[derive(Debug, Clone)]
pub struct ViolationRecord {
    /// Ordinal within the guarded scope
    pub seq: usize,
    /// When the violation was recorded
    pub at: Instant,
    /// The suppressed violation
    pub violation: ContractViolation,
}

/// Identity of one check site on one instance, for cycle cutoff
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ExecKey {
    pub instance: u64,
    pub site: ExecSite,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ExecSite {
    /// Invariant evaluation; one per instance regardless of method
    Invariant,
    /// A method-scoped check
    Check(SigKey, AssertionKind),
}

thread_local! {
    static SCOPES: RefCell<Vec<Vec<ViolationRecord>>> = RefCell::new(Vec::new());
    static EXECUTING: RefCell<FxHashSet<ExecKey>> = RefCell::new(FxHashSet::default());
}

/// Thread-local facade over the per-scope violation records
pub struct ViolationTracker;

impl ViolationTracker {
    /// Whether a guarded scope is active on this thread
    pub fn is_active() -> bool {
        SCOPES.with(|s| !s.borrow().is_empty())
    }

    /// Record into the innermost active scope; hands the violation back if
    /// no scope is active
    pub(crate) fn record(violation: ContractViolation) -> Option<ContractViolation> {
        SCOPES.with(|s| {
            let mut scopes = s.borrow_mut();
            match scopes.last_mut() {
                Some(records) => {
                    let seq = records.len();
                    trace!(seq, "capturing nested violation into tracker");
                    records.push(ViolationRecord {
                        seq,
                        at: Instant::now(),
                        violation,
                    });
                    None
                }
                None => Some(violation),
            }
        })
    }
}

/// RAII scope for the violation tracker; pops on every exit path
struct ScopeGuard {
    finished: bool,
}

impl ScopeGuard {
    fn push() -> Self {
        SCOPES.with(|s| s.borrow_mut().push(Vec::new()));
        Self { finished: false }
    }

    fn finish(mut self) -> Vec<ViolationRecord> {
        self.finished = true;
        SCOPES.with(|s| s.borrow_mut().pop()).unwrap_or_default()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.finished {
            SCOPES.with(|s| {
                s.borrow_mut().pop();
            });
        }
    }
}

/// RAII mark of an in-flight check, for cyclic re-entry detection
struct ExecMark {
    key: ExecKey,
}

impl ExecMark {
    fn enter(key: ExecKey) -> Option<Self> {
        EXECUTING.with(|e| {
            if e.borrow_mut().insert(key.clone()) {
                Some(ExecMark { key })
            } else {
                None
            }
        })
    }
}

impl Drop for ExecMark {
    fn drop(&mut self) {
        EXECUTING.with(|e| {
            e.borrow_mut().remove(&self.key);
        });
    }
}

/// Raise a check failure, or capture it if a guarded scope is active
///
/// This is the single funnel every failing check goes through: inside a
/// guarded evaluation the failure is recorded and execution continues, so
/// the guard can later re-throw the first recorded violation as the root
/// cause instead of a cascade of re-entrant errors.
pub(crate) fn fail_check(violation: ContractViolation) -> ContractResult<()> {
    match ViolationTracker::record(violation) {
        None => Ok(()),
        Some(violation) => Err(violation.into()),
    }
}

/// Evaluate a precondition predicate with cyclic re-entry cutoff
///
/// Preconditions take no lock and no tracker scope: a failure blames the
/// caller directly, and nested failures raised while some outer guarded
/// evaluation is active are captured at the `fail_check` site. The
/// in-flight mark still applies, so a precondition whose predicate
/// re-enters the same check on the same thread skips evaluation instead of
/// recursing.
pub(crate) fn precondition_eval(
    instance: &InstanceRef,
    key: SigKey,
    predicate: &Predicate,
    ctx: &EvalContext<'_>,
    on_failure: impl FnOnce() -> ContractViolation,
) -> ContractResult<()> {
    let exec_key = ExecKey {
        instance: instance.id(),
        site: ExecSite::Check(key, AssertionKind::Precondition),
    };
    let Some(_mark) = ExecMark::enter(exec_key) else {
        trace!(
            instance = instance.id(),
            "cyclic precondition re-entry, skipping"
        );
        return Ok(());
    };
    if predicate.evaluate(ctx)? {
        return Ok(());
    }
    fail_check(on_failure())
}

/// Evaluate a postcondition or invariant predicate under the guard
///
/// Acquires the per-instance reentrant lock, marks the check in flight, and
/// evaluates with an active tracker scope. Afterwards:
/// - any nested violation recorded during evaluation is re-thrown first
///   (it is the root cause; the guard redirects, it never suppresses),
/// - a false verdict with nothing recorded raises the violation produced by
///   `on_failure`,
/// - re-entering the same check on the same thread skips evaluation
///   entirely, which is what makes self-referential predicates terminate.
pub(crate) fn guarded_eval(
    instance: &InstanceRef,
    site: ExecSite,
    predicate: &Predicate,
    ctx: &EvalContext<'_>,
    on_failure: impl FnOnce() -> ContractViolation,
) -> ContractResult<()> {
    let _lock = instance.invariant_lock().lock();

    let key = ExecKey {
        instance: instance.id(),
        site,
    };
    let Some(_mark) = ExecMark::enter(key) else {
        trace!(instance = instance.id(), "cyclic check re-entry, skipping");
        return Ok(());
    };

    let scope = ScopeGuard::push();
    let verdict = predicate.evaluate(ctx);
    let records = scope.finish();
    let verdict = verdict?;

    if let Some(first) = records.into_iter().next() {
        return fail_check(first.violation);
    }
    if verdict {
        Ok(())
    } else {
        fail_check(on_failure())
    }
}

//! Contract Weaving Engine
//!
//! This crate instruments class models with Design-by-Contract runtime
//! checks: preconditions, postconditions with old-state snapshots, and
//! class invariants, combined down the inheritance hierarchy and injected
//! into method bodies by a fixed-order weaving pipeline.

pub mod classify;
pub mod combinator;
pub mod config;
pub mod contract;
pub mod errors;
pub mod evaluator;
pub mod guard;
pub mod model;
pub mod pipeline;
pub mod runtime;
pub mod snapshot;
pub mod value;
pub mod weaver;

pub use classify::{is_candidate_class, is_candidate_method};
pub use combinator::AssertionCombinator;
pub use config::{RuntimeToggles, WeaveOptions};
pub use contract::{Assertion, AssertionKind, AssertionMap, Contract, DeclaredAssertion, Predicate};
pub use errors::{ContractError, ContractResult, ContractViolation};
pub use evaluator::EvalContext;
pub use guard::{ViolationRecord, ViolationTracker};
pub use model::{
    ClassBuilder, ClassId, ClassKind, ClassModel, CompilationUnit, FieldModel, FieldType,
    MethodBuilder, MethodKind, MethodModel, MethodSignature, Modifiers, ReturnType, SigKey,
    Statement,
};
pub use pipeline::{weave, Phase, WeavePipeline, WeaveReport};
pub use runtime::{ContractRuntime, Frame, Instance, InstanceRef};
pub use snapshot::{SnapshotGenerator, SnapshotPlan};
pub use value::Value;
pub use weaver::{AssertionInjector, InjectionCounts};

#[cfg(test)]
mod tests;

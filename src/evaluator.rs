//! Evaluation context for contract predicates
//!
//! Every predicate gets the same uniform input: named parameter bindings,
//! the optional `result` binding, the optional old-state map, the receiving
//! instance's fields, and the ability to make nested instrumented calls.

use rustc_hash::FxHashMap;

use crate::errors::{ContractError, ContractResult};
use crate::runtime::{ContractRuntime, InstanceRef};
use crate::value::Value;

/// Bindings visible to one predicate evaluation
pub struct EvalContext<'a> {
    runtime: &'a ContractRuntime,
    instance: &'a InstanceRef,
    bindings: FxHashMap<String, Value>,
    old: Option<Value>,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(runtime: &'a ContractRuntime, instance: &'a InstanceRef) -> Self {
        Self {
            runtime,
            instance,
            bindings: FxHashMap::default(),
            old: None,
        }
    }

    /// Add a named binding
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub(crate) fn set_old(&mut self, snapshot: Value) {
        self.old = Some(snapshot);
    }

    /// A method parameter by name
    pub fn arg(&self, name: &str) -> ContractResult<Value> {
        self.bindings.get(name).cloned().ok_or_else(|| {
            ContractError::Evaluation(format!("undefined binding in contract predicate: {}", name))
        })
    }

    /// The extracted return value (postconditions of value-returning methods)
    pub fn result(&self) -> ContractResult<Value> {
        self.arg("result")
    }

    /// A field's pre-call value from the old-state snapshot
    pub fn old(&self, field: &str) -> ContractResult<Value> {
        match &self.old {
            Some(snapshot) => snapshot.map_get(field),
            None => Err(ContractError::Evaluation(format!(
                "no old-state snapshot available for '{}'",
                field
            ))),
        }
    }

    /// A field's current value on the receiving instance
    pub fn field(&self, name: &str) -> ContractResult<Value> {
        self.instance.get_field(name).ok_or_else(|| {
            ContractError::Evaluation(format!(
                "no field '{}' on instance of class id {:?}",
                name,
                self.instance.class()
            ))
        })
    }

    /// Call an instrumented method on the receiving instance
    ///
    /// The call goes through the full woven dispatch, so its own checks run;
    /// the reentrancy guard keeps that from recursing or masking failures.
    pub fn call(&self, method: &str, args: &[Value]) -> ContractResult<Value> {
        self.runtime.call(self.instance, method, args)
    }
}

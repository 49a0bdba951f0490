//! Runtime execution of woven class models
//!
//! The weaving engine is a compile-time batch process; this module is the
//! runtime the synthesized checks execute in. `ContractRuntime` loads a
//! woven compilation unit, computes one enabled flag per class from the
//! toggle table at load time, and interprets method bodies: original
//! statements run as-is, synthesized check statements evaluate their
//! predicates and raise violations through the reentrancy guard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::config::RuntimeToggles;
use crate::contract::{Assertion, AssertionKind};
use crate::errors::{ContractError, ContractResult, ContractViolation};
use crate::evaluator::EvalContext;
use crate::guard::{self, ExecSite};
use crate::model::{ClassId, CompilationUnit, MethodKind, MethodModel, Statement};
use crate::value::Value;

/// One object instance of a woven class
///
/// Field storage is behind a short-lived mutex; the separate reentrant lock
/// serializes invariant evaluation per instance, so two threads touching the
/// same instance serialize at check boundaries while different instances
/// proceed independently.
pub struct Instance {
    id: u64,
    class: ClassId,
    fields: Mutex<FxHashMap<String, Value>>,
    invariant_lock: ReentrantMutex<()>,
}

impl Instance {
    /// Process-unique instance id, used by the thread-local trackers
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Current value of a field
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.lock().get(name).cloned()
    }

    /// Overwrite an existing field; false if the field does not exist
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        let mut fields = self.fields.lock();
        match fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn invariant_lock(&self) -> &ReentrantMutex<()> {
        &self.invariant_lock
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("class", &self.class)
            .finish()
    }
}

/// Shared handle to an instance
pub type InstanceRef = Arc<Instance>;

/// Execution frame of one method invocation
///
/// Locals hold the named parameters and, once bound, the extracted `result`;
/// `old` holds the captured old-state snapshot for the postcondition.
pub struct Frame<'a> {
    runtime: &'a ContractRuntime,
    instance: &'a InstanceRef,
    locals: FxHashMap<String, Value>,
    old: Option<Value>,
    ctor_depth: usize,
}

impl<'a> Frame<'a> {
    fn new(runtime: &'a ContractRuntime, instance: &'a InstanceRef, ctor_depth: usize) -> Self {
        Self {
            runtime,
            instance,
            locals: FxHashMap::default(),
            old: None,
            ctor_depth,
        }
    }

    /// A parameter or local binding by name
    pub fn arg(&self, name: &str) -> ContractResult<Value> {
        self.locals.get(name).cloned().ok_or_else(|| {
            ContractError::Evaluation(format!("undefined binding: {}", name))
        })
    }

    /// Bind or overwrite a local
    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    /// Read a field of the receiving instance
    pub fn get_field(&self, name: &str) -> ContractResult<Value> {
        self.instance.get_field(name).ok_or_else(|| {
            ContractError::Evaluation(format!("no field '{}' on instance", name))
        })
    }

    /// Write a field of the receiving instance
    pub fn set_field(&self, name: &str, value: Value) -> ContractResult<()> {
        if self.instance.set_field(name, value) {
            Ok(())
        } else {
            Err(ContractError::Evaluation(format!(
                "no field '{}' on instance",
                name
            )))
        }
    }

    /// Call an instrumented method on the receiving instance
    pub fn call(&self, method: &str, args: &[Value]) -> ContractResult<Value> {
        self.runtime.call(self.instance, method, args)
    }

    /// The receiving instance
    pub fn instance(&self) -> &InstanceRef {
        self.instance
    }
}

/// Interpreter for woven compilation units
pub struct ContractRuntime {
    unit: CompilationUnit,
    class_enabled: Vec<bool>,
    next_instance_id: AtomicU64,
}

impl ContractRuntime {
    /// Load a woven unit, resolving the enable flag for every class once
    pub fn new(unit: CompilationUnit, toggles: &RuntimeToggles) -> Self {
        let class_enabled: Vec<bool> = unit
            .classes
            .iter()
            .map(|class| {
                let enabled = toggles.is_enabled(&class.name);
                if !enabled {
                    debug!(class = %class.name, "contract checks disabled");
                }
                enabled
            })
            .collect();
        Self {
            unit,
            class_enabled,
            next_instance_id: AtomicU64::new(1),
        }
    }

    /// The woven model this runtime executes
    pub fn unit(&self) -> &CompilationUnit {
        &self.unit
    }

    /// The load-time enable flag of a class
    pub fn checks_enabled(&self, class: ClassId) -> bool {
        self.class_enabled[class.index()]
    }

    /// Construct an instance, running the matching woven constructor
    pub fn instantiate(&self, class_name: &str, args: &[Value]) -> ContractResult<InstanceRef> {
        let class = self.unit.resolve(class_name)?;
        let instance = Arc::new(Instance {
            id: self.next_instance_id.fetch_add(1, Ordering::Relaxed),
            class,
            fields: Mutex::new(self.initial_fields(class)),
            invariant_lock: ReentrantMutex::new(()),
        });
        match self.find_constructor(class, args.len()) {
            Some(ctor) => {
                self.invoke(&instance, ctor, args, 1)?;
            }
            None if args.is_empty() => {}
            None => {
                return Err(ContractError::UnknownMethod(format!(
                    "{}.constructor/{}",
                    class_name,
                    args.len()
                )));
            }
        }
        Ok(instance)
    }

    /// Dispatch a method call on an instance
    pub fn call(
        &self,
        instance: &InstanceRef,
        method: &str,
        args: &[Value],
    ) -> ContractResult<Value> {
        let method = self.resolve_method(instance.class(), method, args.len())?;
        trace!(method = %method.signature, instance = instance.id(), "dispatching call");
        self.invoke(instance, method, args, 0)
    }

    /// Fields of the class and all ancestors; derived defaults win
    fn initial_fields(&self, class: ClassId) -> FxHashMap<String, Value> {
        let mut chain = self.unit.superclass_chain(class);
        chain.reverse();
        chain.push(class);
        let mut fields = FxHashMap::default();
        for owner in chain {
            for field in &self.unit.class(owner).fields {
                fields.insert(field.name.clone(), field.field_type.default_value());
            }
        }
        fields
    }

    fn find_constructor(&self, class: ClassId, arity: usize) -> Option<&MethodModel> {
        self.unit
            .class(class)
            .methods
            .iter()
            .find(|m| m.is_constructor() && m.signature.params.len() == arity)
    }

    fn resolve_method(
        &self,
        class: ClassId,
        name: &str,
        arity: usize,
    ) -> ContractResult<&MethodModel> {
        let mut current = Some(class);
        while let Some(id) = current {
            let candidate = self.unit.class(id).methods.iter().find(|m| {
                m.kind == MethodKind::Method
                    && m.signature.name == name
                    && m.signature.params.len() == arity
            });
            if let Some(method) = candidate {
                return Ok(method);
            }
            current = self.unit.class(id).superclass;
        }
        Err(ContractError::UnknownMethod(format!(
            "{}.{}/{}",
            self.unit.class(class).name,
            name,
            arity
        )))
    }

    fn invoke(
        &self,
        instance: &InstanceRef,
        method: &MethodModel,
        args: &[Value],
        ctor_depth: usize,
    ) -> ContractResult<Value> {
        if args.len() != method.signature.params.len() {
            return Err(ContractError::Evaluation(format!(
                "arity mismatch calling {}: expected {}, got {}",
                method.signature,
                method.signature.params.len(),
                args.len()
            )));
        }
        let mut frame = Frame::new(self, instance, ctor_depth);
        for (param, value) in method.signature.params.iter().zip(args) {
            frame.locals.insert(param.clone(), value.clone());
        }
        self.execute_body(&mut frame, method)
    }

    fn execute_body(&self, frame: &mut Frame<'_>, method: &MethodModel) -> ContractResult<Value> {
        for statement in &method.body.statements {
            match statement {
                Statement::SuperCtorCall => self.run_super_ctor(frame, method)?,
                Statement::Exec(f) => f(frame)?,
                Statement::Return(expr) => return expr(frame),
                Statement::CheckPrecondition(assertion) => {
                    self.check_precondition(frame, method, assertion)?;
                }
                Statement::CaptureOldState(plan) => {
                    if self.checks_enabled(method.declaring) {
                        frame.old = Some(plan.capture(frame.instance)?);
                    }
                }
                Statement::BindResult(expr) => {
                    let value = expr(frame)?;
                    frame.locals.insert("result".to_string(), value);
                }
                Statement::CheckPostcondition(assertion) => {
                    self.check_postcondition(frame, method, assertion)?;
                }
                Statement::CheckInvariant { assertion, .. } => {
                    self.check_invariant(frame, method, assertion)?;
                }
                Statement::ReturnBound => {
                    return Ok(frame.locals.get("result").cloned().unwrap_or(Value::Nil));
                }
            }
        }
        Ok(Value::Nil)
    }

    fn run_super_ctor(&self, frame: &mut Frame<'_>, method: &MethodModel) -> ContractResult<()> {
        let Some(superclass) = self.unit.class(method.declaring).superclass else {
            return Ok(());
        };
        match self.find_constructor(superclass, 0) {
            Some(ctor) => {
                self.invoke(frame.instance, ctor, &[], frame.ctor_depth + 1)?;
                Ok(())
            }
            // No declared constructors means the implicit default, which
            // does nothing beyond the field initializers already applied.
            None if !self
                .unit
                .class(superclass)
                .methods
                .iter()
                .any(MethodModel::is_constructor) =>
            {
                Ok(())
            }
            None => Err(ContractError::Model(format!(
                "superclass '{}' declares no zero-argument constructor to chain to",
                self.unit.class(superclass).name
            ))),
        }
    }

    fn check_precondition(
        &self,
        frame: &mut Frame<'_>,
        method: &MethodModel,
        assertion: &Assertion,
    ) -> ContractResult<()> {
        if !self.checks_enabled(method.declaring) {
            return Ok(());
        }
        let ctx = self.eval_context(frame);
        guard::precondition_eval(
            frame.instance,
            method.signature.key(),
            &assertion.predicate,
            &ctx,
            || self.violation(AssertionKind::Precondition, method, assertion),
        )
    }

    fn check_postcondition(
        &self,
        frame: &mut Frame<'_>,
        method: &MethodModel,
        assertion: &Assertion,
    ) -> ContractResult<()> {
        if !self.checks_enabled(method.declaring) {
            return Ok(());
        }
        let ctx = self.eval_context(frame);
        guard::guarded_eval(
            frame.instance,
            ExecSite::Check(method.signature.key(), AssertionKind::Postcondition),
            &assertion.predicate,
            &ctx,
            || self.violation(AssertionKind::Postcondition, method, assertion),
        )
    }

    fn check_invariant(
        &self,
        frame: &mut Frame<'_>,
        method: &MethodModel,
        assertion: &Assertion,
    ) -> ContractResult<()> {
        if !self.checks_enabled(method.declaring) {
            return Ok(());
        }
        // The invariant runs once per construction, on the fully initialized
        // object, never on a partially-constructed superclass layer.
        if method.is_constructor() && frame.ctor_depth > 1 {
            return Ok(());
        }
        let ctx = self.eval_context(frame);
        guard::guarded_eval(
            frame.instance,
            ExecSite::Invariant,
            &assertion.predicate,
            &ctx,
            || self.violation(AssertionKind::Invariant, method, assertion),
        )
    }

    fn eval_context<'r>(&'r self, frame: &Frame<'r>) -> EvalContext<'r> {
        let mut ctx = EvalContext::new(self, frame.instance);
        for (name, value) in &frame.locals {
            ctx.bind(name.clone(), value.clone());
        }
        if let Some(old) = &frame.old {
            ctx.set_old(old.clone());
        }
        ctx
    }

    fn violation(
        &self,
        kind: AssertionKind,
        method: &MethodModel,
        assertion: &Assertion,
    ) -> ContractViolation {
        let declaring = assertion.declared_by.unwrap_or(method.declaring);
        let class = self.unit.class(declaring).name.clone();
        let message = match assertion.source_text() {
            Some(source) => format!("predicate '{}' evaluated to false", source),
            None => format!("{} predicate evaluated to false", kind),
        };
        ContractViolation::new(
            kind,
            class,
            Some(method.signature.to_string()),
            assertion.source.clone(),
            message,
        )
    }
}

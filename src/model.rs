//! In-memory class/method model the weaving engine operates on
//!
//! The host compiler's parsing and tree representation are external
//! collaborators; this module is the model they hand over: classes with
//! identity and hierarchy relations, methods with ordered statement bodies,
//! and the assertions attached per class and per method. Builders are the
//! construction surface for the upstream annotation reader.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::contract::{Assertion, DeclaredAssertion};
use crate::errors::{ContractError, ContractResult};
use crate::evaluator::EvalContext;
use crate::runtime::Frame;
use crate::snapshot::SnapshotPlan;
use crate::value::Value;

/// Identity of a class within one compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Index into `CompilationUnit::classes`
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Classification of a class declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    /// Ordinary concrete or abstract class
    Class,
    /// Interface: may declare assertions, is never woven itself
    Interface,
    /// Enum: excluded from weaving
    Enum,
    /// Generic placeholder: excluded from weaving
    GenericPlaceholder,
}

/// Value category of a field, used by the old-state snapshot policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Text,
    /// Explicitly supports a cloning capability
    Cloneable,
    /// Not safely copyable; skipped by old-state capture
    Opaque,
}

impl FieldType {
    /// Whether pre-call values of this category can be captured safely
    pub fn is_copyable(self) -> bool {
        !matches!(self, FieldType::Opaque)
    }

    /// Initial value for a freshly constructed instance
    pub fn default_value(self) -> Value {
        match self {
            FieldType::Int => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Text => Value::Text(String::new()),
            FieldType::Cloneable | FieldType::Opaque => Value::Nil,
        }
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldModel {
    pub name: String,
    pub field_type: FieldType,
}

/// Method identity: name plus parameter list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<String>,
}

impl MethodSignature {
    /// Lookup key: one combined assertion per key in an `AssertionMap`
    pub fn key(&self) -> SigKey {
        SigKey(format!("{}/{}", self.name, self.params.len()))
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// Interned method-signature key (name and arity)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigKey(String);

impl fmt::Display for SigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Return-type tag of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnType {
    Void,
    Value,
}

/// Method and class modifiers relevant to candidate classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub public: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub synthetic: bool,
    /// Property setter synthesized by the host language
    pub setter: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            public: true,
            is_static: false,
            is_abstract: false,
            synthetic: false,
            setter: false,
        }
    }
}

/// Distinguishes constructors from ordinary methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Method,
    Constructor,
}

/// An opaque original-body statement
pub type BodyFn = Arc<dyn Fn(&mut Frame<'_>) -> ContractResult<()> + Send + Sync>;

/// An expression producing a value, used for trailing returns
pub type ExprFn = Arc<dyn Fn(&mut Frame<'_>) -> ContractResult<Value> + Send + Sync>;

/// One statement of a method body
///
/// The first three variants are what the host hands over; the rest are
/// synthesized by the injector. Every check consults the per-class runtime
/// enable flag before evaluating anything.
#[derive(Clone)]
pub enum Statement {
    /// Mandatory superclass-constructor call; stays the first statement
    SuperCtorCall,
    /// Opaque original statement
    Exec(BodyFn),
    /// Trailing return expression of the original body
    Return(ExprFn),
    /// Synthesized: precondition check at entry
    CheckPrecondition(Assertion),
    /// Synthesized: old-state capture before the original body
    CaptureOldState(SnapshotPlan),
    /// Synthesized: evaluate the extracted return expression into `result`
    BindResult(ExprFn),
    /// Synthesized: postcondition check with `result` and old state in scope
    CheckPostcondition(Assertion),
    /// Synthesized: invariant check; `entry` marks setter entry checks
    CheckInvariant { assertion: Assertion, entry: bool },
    /// Synthesized: hand back the bound `result`
    ReturnBound,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::SuperCtorCall => write!(f, "SuperCtorCall"),
            Statement::Exec(_) => write!(f, "Exec(..)"),
            Statement::Return(_) => write!(f, "Return(..)"),
            Statement::CheckPrecondition(a) => {
                write!(f, "CheckPrecondition({:?})", a.source)
            }
            Statement::CaptureOldState(p) => write!(f, "CaptureOldState({:?})", p.fields()),
            Statement::BindResult(_) => write!(f, "BindResult(..)"),
            Statement::CheckPostcondition(a) => {
                write!(f, "CheckPostcondition({:?})", a.source)
            }
            Statement::CheckInvariant { assertion, entry } => {
                write!(f, "CheckInvariant({:?}, entry={})", assertion.source, entry)
            }
            Statement::ReturnBound => write!(f, "ReturnBound"),
        }
    }
}

/// Ordered statement sequence of one method
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    pub statements: Vec<Statement>,
}

impl MethodBody {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Which weaving passes already touched a method
///
/// Re-entering the pipeline on a woven model is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveMarks {
    pub pre_post: bool,
    pub invariants: bool,
    pub setter_wrapped: bool,
}

impl WeaveMarks {
    /// Whether any pass touched this method
    pub fn any(self) -> bool {
        self.pre_post || self.invariants || self.setter_wrapped
    }
}

/// A method or constructor declaration with its mutable body
pub struct MethodModel {
    pub signature: MethodSignature,
    pub return_type: ReturnType,
    pub modifiers: Modifiers,
    pub kind: MethodKind,
    pub declaring: ClassId,
    pub body: MethodBody,
    pub marks: WeaveMarks,
    /// Assertions attached by the upstream annotation reader
    pub declared_preconditions: Vec<DeclaredAssertion>,
    pub declared_postconditions: Vec<DeclaredAssertion>,
}

impl MethodModel {
    pub fn is_constructor(&self) -> bool {
        self.kind == MethodKind::Constructor
    }
}

impl fmt::Debug for MethodModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodModel")
            .field("signature", &self.signature)
            .field("kind", &self.kind)
            .field("declaring", &self.declaring)
            .field("marks", &self.marks)
            .field("statements", &self.body.len())
            .finish()
    }
}

/// A class declaration with hierarchy relations and members
#[derive(Debug)]
pub struct ClassModel {
    pub id: ClassId,
    /// Fully-qualified, dot-separated name
    pub name: String,
    pub kind: ClassKind,
    pub synthetic: bool,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
    pub declared_invariants: Vec<DeclaredAssertion>,
}

impl ClassModel {
    /// Find a method by signature key
    pub fn method(&self, key: &SigKey) -> Option<&MethodModel> {
        self.methods.iter().find(|m| m.signature.key() == *key)
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// All classes of one compiled unit, in registration order
///
/// Built once, woven in place by the pipeline, then handed back to the host
/// compiler; nothing reads it after weaving completes.
#[derive(Debug, Default)]
pub struct CompilationUnit {
    pub classes: Vec<ClassModel>,
    by_name: FxHashMap<String, ClassId>,
}

impl CompilationUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a class by id
    pub fn class(&self, id: ClassId) -> &ClassModel {
        &self.classes[id.index()]
    }

    /// Mutable access for the weaving passes
    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassModel {
        &mut self.classes[id.index()]
    }

    /// Resolve a fully-qualified class name
    pub fn resolve(&self, name: &str) -> ContractResult<ClassId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ContractError::UnknownClass(name.to_string()))
    }

    /// Superclass chain, nearest ancestor first
    pub fn superclass_chain(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut current = self.class(id).superclass;
        while let Some(ancestor) = current {
            chain.push(ancestor);
            current = self.class(ancestor).superclass;
        }
        chain
    }

    /// Depth of a class in the hierarchy (root = 0)
    pub fn hierarchy_depth(&self, id: ClassId) -> usize {
        self.superclass_chain(id).len()
    }

    /// All class ids ordered so that superclasses precede subclasses
    ///
    /// The host is obliged to present classes in dependency order already;
    /// sorting by depth keeps the combinator's live ancestor lookups correct
    /// for well-formed units regardless of registration order.
    pub fn ids_in_hierarchy_order(&self) -> Vec<ClassId> {
        let mut ids: Vec<ClassId> = self.classes.iter().map(|c| c.id).collect();
        ids.sort_by_key(|&id| (self.hierarchy_depth(id), id));
        ids
    }

    fn add_class(&mut self, mut class: ClassModel) -> ContractResult<ClassId> {
        if self.by_name.contains_key(&class.name) {
            return Err(ContractError::Model(format!(
                "class '{}' registered twice",
                class.name
            )));
        }
        // Hierarchy edges reference already-registered classes, so cycles
        // cannot form; validate the references exist.
        if let Some(superclass) = class.superclass {
            if superclass.index() >= self.classes.len() {
                return Err(ContractError::Model(format!(
                    "class '{}' extends unknown class id {:?}",
                    class.name, superclass
                )));
            }
        }
        for &interface in &class.interfaces {
            if interface.index() >= self.classes.len() {
                return Err(ContractError::Model(format!(
                    "class '{}' implements unknown class id {:?}",
                    class.name, interface
                )));
            }
        }
        let id = ClassId(self.classes.len() as u32);
        class.id = id;
        for method in &mut class.methods {
            method.declaring = id;
        }
        self.by_name.insert(class.name.clone(), id);
        self.classes.push(class);
        Ok(id)
    }
}

/// Builder for a class declaration
pub struct ClassBuilder {
    name: String,
    kind: ClassKind,
    synthetic: bool,
    superclass: Option<ClassId>,
    interfaces: Vec<ClassId>,
    fields: Vec<FieldModel>,
    methods: Vec<MethodBuilder>,
    invariants: Vec<DeclaredAssertion>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Class,
            synthetic: false,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            invariants: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn extends(mut self, superclass: ClassId) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn implements(mut self, interface: ClassId) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldModel {
            name: name.into(),
            field_type,
        });
        self
    }

    /// Attach a class invariant expression
    pub fn invariant(
        mut self,
        source: impl Into<String>,
        f: impl Fn(&EvalContext<'_>) -> ContractResult<bool> + Send + Sync + 'static,
    ) -> Self {
        self.invariants.push(DeclaredAssertion::new(source, f));
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Register the finished class with a compilation unit
    pub fn register(self, unit: &mut CompilationUnit) -> ContractResult<ClassId> {
        let methods = self.methods.into_iter().map(MethodBuilder::finish).collect();
        unit.add_class(ClassModel {
            id: ClassId(0), // assigned by add_class
            name: self.name,
            kind: self.kind,
            synthetic: self.synthetic,
            superclass: self.superclass,
            interfaces: self.interfaces,
            fields: self.fields,
            methods,
            declared_invariants: self.invariants,
        })
    }
}

/// Builder for a method or constructor declaration
pub struct MethodBuilder {
    name: String,
    params: Vec<String>,
    return_type: ReturnType,
    modifiers: Modifiers,
    kind: MethodKind,
    statements: Vec<Statement>,
    preconditions: Vec<DeclaredAssertion>,
    postconditions: Vec<DeclaredAssertion>,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: ReturnType::Void,
            modifiers: Modifiers::default(),
            kind: MethodKind::Method,
            statements: Vec::new(),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
        }
    }

    /// Start a constructor declaration
    pub fn constructor() -> Self {
        let mut builder = Self::new("constructor");
        builder.kind = MethodKind::Constructor;
        builder
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.modifiers.public = false;
        self
    }

    pub fn set_static(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn set_abstract(mut self) -> Self {
        self.modifiers.is_abstract = true;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.modifiers.synthetic = true;
        self
    }

    /// Mark as a host-synthesized property setter
    pub fn setter(mut self) -> Self {
        self.modifiers.setter = true;
        self.modifiers.synthetic = true;
        self
    }

    /// Emit the mandatory superclass-constructor call
    pub fn super_ctor_call(mut self) -> Self {
        self.statements.push(Statement::SuperCtorCall);
        self
    }

    /// Append an opaque body statement
    pub fn body(
        mut self,
        f: impl Fn(&mut Frame<'_>) -> ContractResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.statements.push(Statement::Exec(Arc::new(f)));
        self
    }

    /// Set the trailing return expression; makes the method value-returning
    pub fn returns(
        mut self,
        f: impl Fn(&mut Frame<'_>) -> ContractResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.return_type = ReturnType::Value;
        self.statements.push(Statement::Return(Arc::new(f)));
        self
    }

    /// Attach a precondition expression
    pub fn precondition(
        mut self,
        source: impl Into<String>,
        f: impl Fn(&EvalContext<'_>) -> ContractResult<bool> + Send + Sync + 'static,
    ) -> Self {
        self.preconditions.push(DeclaredAssertion::new(source, f));
        self
    }

    /// Attach a postcondition expression
    pub fn postcondition(
        mut self,
        source: impl Into<String>,
        f: impl Fn(&EvalContext<'_>) -> ContractResult<bool> + Send + Sync + 'static,
    ) -> Self {
        self.postconditions.push(DeclaredAssertion::new(source, f));
        self
    }

    fn finish(self) -> MethodModel {
        MethodModel {
            signature: MethodSignature {
                name: self.name,
                params: self.params,
            },
            return_type: self.return_type,
            modifiers: self.modifiers,
            kind: self.kind,
            declaring: ClassId(0), // assigned at registration
            body: MethodBody::new(self.statements),
            marks: WeaveMarks::default(),
            declared_preconditions: self.preconditions,
            declared_postconditions: self.postconditions,
        }
    }
}

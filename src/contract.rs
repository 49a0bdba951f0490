//! Contract representation and core structures
//!
//! This module provides the core types for design-by-contract weaving: the
//! assertion kinds, the predicate algebra they combine under, and the
//! per-class `Contract` aggregate the combinator produces.
//!
//! # Assertion semantics
//!
//! ## Preconditions
//! - Evaluated before the method body runs
//! - Caller's responsibility; a failure blames the calling code
//! - Inheritance combines preconditions with logical OR: a subclass may
//!   weaken (broaden) what it accepts, never narrow it
//!
//! ## Postconditions
//! - Evaluated after the method body, before the return value is handed back
//! - May reference the return value (`result`) and the pre-call state
//!   captured in the old-state snapshot
//! - Inheritance combines postconditions with logical AND: a subclass may
//!   strengthen what it guarantees, never relax it
//!
//! ## Class invariants
//! - Evaluated after every public operation and once at the end of
//!   construction
//! - Inheritance combines invariants with logical AND
//!
//! A freshly constructed assertion with no predicate defaults to the
//! constant-true predicate. That sentinel means "no constraint" and is the
//! identity element for AND-combination; it is distinguishable from a
//! user-supplied always-true predicate because it carries no source text.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::ContractResult;
use crate::evaluator::EvalContext;
use crate::model::{ClassId, SigKey};

/// Kinds of contract assertions
///
/// Each kind has different timing and a different inheritance algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionKind {
    /// Checked before the method body; combined with OR down the hierarchy
    Precondition,
    /// Checked after the method body; combined with AND down the hierarchy
    Postcondition,
    /// Checked around public operations; combined with AND down the hierarchy
    Invariant,
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionKind::Precondition => write!(f, "precondition"),
            AssertionKind::Postcondition => write!(f, "postcondition"),
            AssertionKind::Invariant => write!(f, "invariant"),
        }
    }
}

/// A boolean-valued predicate with the uniform contract signature
///
/// Parameters, the optional result binding, and the optional old-state map
/// all arrive through the [`EvalContext`].
pub type PredicateFn = Arc<dyn Fn(&EvalContext<'_>) -> ContractResult<bool> + Send + Sync>;

/// Late-bound predicate expression for contract assertions
///
/// Represented as a tagged closure type rather than an AST so that
/// combination (AND/OR) is a structural operation and evaluation is a plain
/// call, with no reflective dispatch.
#[derive(Clone)]
pub enum Predicate {
    /// Constant true: "no constraint", the identity for AND
    True,
    /// Constant false: the identity for OR
    False,
    /// A user-supplied predicate closure
    Test(PredicateFn),
    /// Both operands must hold
    And(Box<Predicate>, Box<Predicate>),
    /// At least one operand must hold
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Wrap a predicate closure
    pub fn test(
        f: impl Fn(&EvalContext<'_>) -> ContractResult<bool> + Send + Sync + 'static,
    ) -> Self {
        Predicate::Test(Arc::new(f))
    }

    /// Combine with logical AND, folding out the identity element
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (a, b) => Predicate::And(Box::new(a), Box::new(b)),
        }
    }

    /// Combine with logical OR, folding out the identity element
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::False, p) | (p, Predicate::False) => p,
            (a, b) => Predicate::Or(Box::new(a), Box::new(b)),
        }
    }

    /// Whether this is the constant-true predicate
    pub fn is_constant_true(&self) -> bool {
        matches!(self, Predicate::True)
    }

    /// Evaluate the predicate, short-circuiting AND and OR
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> ContractResult<bool> {
        match self {
            Predicate::True => Ok(true),
            Predicate::False => Ok(false),
            Predicate::Test(f) => f(ctx),
            Predicate::And(a, b) => {
                if !a.evaluate(ctx)? {
                    return Ok(false);
                }
                b.evaluate(ctx)
            }
            Predicate::Or(a, b) => {
                if a.evaluate(ctx)? {
                    return Ok(true);
                }
                b.evaluate(ctx)
            }
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "True"),
            Predicate::False => write!(f, "False"),
            Predicate::Test(_) => write!(f, "Test(..)"),
            Predicate::And(a, b) => write!(f, "And({:?}, {:?})", a, b),
            Predicate::Or(a, b) => write!(f, "Or({:?}, {:?})", a, b),
        }
    }
}

/// An assertion expression as attached by the upstream annotation reader
///
/// Pairs the predicate closure with its declared source text so that
/// violations can quote the expression that failed.
#[derive(Clone)]
pub struct DeclaredAssertion {
    /// Source text of the predicate expression
    pub source: String,
    /// The predicate itself
    pub predicate: Predicate,
}

impl DeclaredAssertion {
    /// Create a declared assertion from source text and a closure
    pub fn new(
        source: impl Into<String>,
        f: impl Fn(&EvalContext<'_>) -> ContractResult<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: source.into(),
            predicate: Predicate::test(f),
        }
    }
}

impl fmt::Debug for DeclaredAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredAssertion")
            .field("source", &self.source)
            .finish()
    }
}

/// A single combined assertion of one kind
#[derive(Clone)]
pub struct Assertion {
    /// Kind of assertion
    pub kind: AssertionKind,
    /// The combined predicate
    pub predicate: Predicate,
    /// Source text, if user-supplied; `None` for the default sentinel
    pub source: Option<String>,
    /// Most-derived class that contributed to this assertion
    pub declared_by: Option<ClassId>,
}

impl Assertion {
    /// Create the default "no constraint" assertion for a kind
    pub fn new(kind: AssertionKind) -> Self {
        Self {
            kind,
            predicate: Predicate::True,
            source: None,
            declared_by: None,
        }
    }

    /// Create an assertion from a declared expression
    pub fn declared(kind: AssertionKind, decl: &DeclaredAssertion, class: ClassId) -> Self {
        Self {
            kind,
            predicate: decl.predicate.clone(),
            source: Some(decl.source.clone()),
            declared_by: Some(class),
        }
    }

    /// Whether this is the default constant-true sentinel
    pub fn is_default(&self) -> bool {
        self.source.is_none() && self.predicate.is_constant_true()
    }

    /// Combine with another assertion using logical AND (strengthening)
    pub fn and(self, other: Assertion) -> Assertion {
        let source = Self::join_sources(self.source, other.source, "&&");
        Assertion {
            kind: self.kind,
            predicate: self.predicate.and(other.predicate),
            source,
            declared_by: self.declared_by.or(other.declared_by),
        }
    }

    /// Combine with another assertion using logical OR (weakening)
    pub fn or(self, other: Assertion) -> Assertion {
        let source = Self::join_sources(self.source, other.source, "||");
        Assertion {
            kind: self.kind,
            predicate: self.predicate.or(other.predicate),
            source,
            declared_by: self.declared_by.or(other.declared_by),
        }
    }

    /// Source text of the combined predicate, if any
    pub fn source_text(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn join_sources(a: Option<String>, b: Option<String>, op: &str) -> Option<String> {
        match (a, b) {
            (Some(a), Some(b)) => Some(format!("({}) {} ({})", a, op, b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("kind", &self.kind)
            .field("predicate", &self.predicate)
            .field("source", &self.source)
            .field("declared_by", &self.declared_by)
            .finish()
    }
}

/// Mapping from method signature to the single combined assertion for it
///
/// Keys are unique: joining an existing entry combines the predicates, it
/// never produces a second entry for the same method.
#[derive(Debug, Clone, Default)]
pub struct AssertionMap {
    entries: FxHashMap<SigKey, Assertion>,
}

impl AssertionMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Combined assertion for a method, if any
    pub fn get(&self, key: &SigKey) -> Option<&Assertion> {
        self.entries.get(key)
    }

    /// Insert an assertion, AND-joining with an existing entry
    pub fn and_insert(&mut self, key: SigKey, assertion: Assertion) {
        match self.entries.remove(&key) {
            Some(existing) => {
                self.entries.insert(key, existing.and(assertion));
            }
            None => {
                self.entries.insert(key, assertion);
            }
        }
    }

    /// Replace (or insert) the combined assertion for a method
    pub fn set(&mut self, key: SigKey, assertion: Assertion) {
        self.entries.insert(key, assertion);
    }

    /// Insert an assertion, OR-joining with an existing entry
    pub fn or_insert(&mut self, key: SigKey, assertion: Assertion) {
        match self.entries.remove(&key) {
            Some(existing) => {
                self.entries.insert(key, existing.or(assertion));
            }
            None => {
                self.entries.insert(key, assertion);
            }
        }
    }

    /// Number of methods with a combined assertion
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (signature, assertion) entries
    pub fn iter(&self) -> impl Iterator<Item = (&SigKey, &Assertion)> {
        self.entries.iter()
    }
}

/// The combined contract of one class
///
/// Built once by the combinator after all ancestor contracts exist; read by
/// the snapshot generator and the injector, then never mutated again.
#[derive(Debug, Clone)]
pub struct Contract {
    /// The class this contract belongs to
    pub class: ClassId,
    /// Combined class invariant (default-true sentinel when undeclared)
    pub invariant: Assertion,
    /// Combined preconditions keyed by method signature
    pub preconditions: AssertionMap,
    /// Combined postconditions keyed by method signature
    pub postconditions: AssertionMap,
}

impl Contract {
    /// Create an empty contract for a class
    pub fn new(class: ClassId) -> Self {
        Self {
            class,
            invariant: Assertion::new(AssertionKind::Invariant),
            preconditions: AssertionMap::new(),
            postconditions: AssertionMap::new(),
        }
    }

    /// Whether a user-supplied invariant (not the sentinel) is present
    pub fn has_user_invariant(&self) -> bool {
        !self.invariant.is_default()
    }

    /// Whether this contract constrains anything at all
    pub fn has_conditions(&self) -> bool {
        self.has_user_invariant()
            || !self.preconditions.is_empty()
            || !self.postconditions.is_empty()
    }
}

//! Inheritance-aware combination of contracts across a class hierarchy
//!
//! The combinator resolves, for every (class, method, kind), the fully
//! combined predicate including ancestor contributions:
//!
//! - preconditions combine with logical OR down the chain (a subclass
//!   weakens); an override that declares none installs
//!   `OR(constant-false, nearest-ancestor)`, which is equivalent to
//!   inheriting the ancestor predicate verbatim
//! - postconditions and class invariants combine with logical AND (a
//!   subclass strengthens); an undeclared position still invokes the
//!   ancestor's predicate so descendants remain bound by it
//!
//! Only the nearest ancestor with a matching assertion contributes.
//! Contracts telescope: because ancestors are combined first, their entries
//! already fold in their own ancestor calls, so one hop is enough.
//! Resolution is an explicit side-effect-free walk over the immutable
//! hierarchy, memoized per (class, method, kind) within one weaving pass.

use std::num::NonZeroUsize;

use lru::LruCache;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::classify;
use crate::contract::{Assertion, AssertionKind, Contract, Predicate};
use crate::errors::ContractResult;
use crate::model::{ClassId, CompilationUnit, SigKey};

const MEMO_CAPACITY: usize = 4096;

/// Builds per-class [`Contract`]s with inherited contributions folded in
pub struct AssertionCombinator<'a> {
    unit: &'a CompilationUnit,
    contracts: FxHashMap<ClassId, Contract>,
    memo: LruCache<(ClassId, Option<SigKey>, AssertionKind), Option<Assertion>>,
}

impl<'a> AssertionCombinator<'a> {
    pub fn new(unit: &'a CompilationUnit) -> Self {
        Self {
            unit,
            contracts: FxHashMap::default(),
            memo: LruCache::new(NonZeroUsize::new(MEMO_CAPACITY).expect("nonzero capacity")),
        }
    }

    /// Combine every class, superclasses before subclasses
    pub fn combine_all(&mut self) -> ContractResult<()> {
        for id in self.unit.ids_in_hierarchy_order() {
            self.combine_class(id)?;
        }
        Ok(())
    }

    /// Build the combined contract for one class
    ///
    /// A class whose contract already exists is skipped, so re-running the
    /// pass is a no-op. Ancestor contracts must already exist (the host
    /// presents classes in dependency order; the pipeline sorts by depth).
    pub fn combine_class(&mut self, id: ClassId) -> ContractResult<()> {
        if self.contracts.contains_key(&id) {
            return Ok(());
        }
        let unit = self.unit;
        let class = unit.class(id);
        let mut contract = Contract::new(id);

        // Fold the class's own declared assertions first.
        let mut invariant = Assertion::new(AssertionKind::Invariant);
        for decl in &class.declared_invariants {
            invariant = invariant.and(Assertion::declared(AssertionKind::Invariant, decl, id));
        }
        for method in &class.methods {
            let key = method.signature.key();
            for decl in &method.declared_preconditions {
                contract.preconditions.and_insert(
                    key.clone(),
                    Assertion::declared(AssertionKind::Precondition, decl, id),
                );
            }
            for decl in &method.declared_postconditions {
                contract.postconditions.and_insert(
                    key.clone(),
                    Assertion::declared(AssertionKind::Postcondition, decl, id),
                );
            }
        }

        // Interfaces and other non-candidates keep a declared-only contract;
        // implementors pick their assertions up through the ancestor walk.
        if classify::is_candidate_class(class) {
            for method in &class.methods {
                let key = method.signature.key();

                if let Some(ancestor) =
                    self.inherited(id, Some(key.clone()), AssertionKind::Precondition)
                {
                    let combined = match contract.preconditions.get(&key).cloned() {
                        Some(own) => own.or(ancestor),
                        // Override with no declared precondition inherits
                        // OR(constant-false, ancestor).
                        None => Assertion {
                            kind: AssertionKind::Precondition,
                            predicate: Predicate::False.or(ancestor.predicate.clone()),
                            source: ancestor.source.clone(),
                            declared_by: ancestor.declared_by,
                        },
                    };
                    contract.preconditions.set(key.clone(), combined);
                }

                if let Some(ancestor) =
                    self.inherited(id, Some(key.clone()), AssertionKind::Postcondition)
                {
                    let combined = match contract.postconditions.get(&key).cloned() {
                        Some(own) => own.and(ancestor),
                        // The ancestor predicate is still invoked so
                        // descendants remain bound by it.
                        None => ancestor,
                    };
                    contract.postconditions.set(key.clone(), combined);
                }
            }

            if let Some(ancestor) = self.inherited(id, None, AssertionKind::Invariant) {
                invariant = invariant.and(ancestor);
            }
        }

        contract.invariant = invariant;
        debug!(
            class = %class.name,
            preconditions = contract.preconditions.len(),
            postconditions = contract.postconditions.len(),
            invariant = contract.has_user_invariant(),
            "combined contract"
        );
        self.contracts.insert(id, contract);
        Ok(())
    }

    /// Fully combined assertion for a (class, method, kind), if any
    pub fn resolve(
        &self,
        class: ClassId,
        key: Option<&SigKey>,
        kind: AssertionKind,
    ) -> Option<&Assertion> {
        let contract = self.contracts.get(&class)?;
        match kind {
            AssertionKind::Precondition => contract.preconditions.get(key?),
            AssertionKind::Postcondition => contract.postconditions.get(key?),
            AssertionKind::Invariant => {
                contract.has_user_invariant().then(|| &contract.invariant)
            }
        }
    }

    /// Borrow the combined contracts
    pub fn contracts(&self) -> &FxHashMap<ClassId, Contract> {
        &self.contracts
    }

    /// Consume the combinator, yielding the combined contracts
    pub fn into_contracts(self) -> FxHashMap<ClassId, Contract> {
        self.contracts
    }

    /// Nearest-ancestor assertion for a position, memoized
    fn inherited(
        &mut self,
        class: ClassId,
        key: Option<SigKey>,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        let memo_key = (class, key.clone(), kind);
        if let Some(hit) = self.memo.get(&memo_key) {
            trace!(?memo_key, "ancestor resolution memo hit");
            return hit.clone();
        }
        let result = self.nearest_ancestor(class, key.as_ref(), kind);
        self.memo.put(memo_key, result.clone());
        result
    }

    fn nearest_ancestor(
        &self,
        class: ClassId,
        key: Option<&SigKey>,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        for ancestor in self.ancestor_order(class) {
            let Some(contract) = self.contracts.get(&ancestor) else {
                continue;
            };
            let found = match kind {
                AssertionKind::Precondition => key.and_then(|k| contract.preconditions.get(k)),
                AssertionKind::Postcondition => key.and_then(|k| contract.postconditions.get(k)),
                AssertionKind::Invariant => {
                    contract.has_user_invariant().then(|| &contract.invariant)
                }
            };
            if let Some(assertion) = found {
                return Some(assertion.clone());
            }
        }
        None
    }

    /// Superclass chain depth-first, then interfaces (nearest owner first)
    fn ancestor_order(&self, class: ClassId) -> Vec<ClassId> {
        let unit = self.unit;
        let chain = unit.superclass_chain(class);
        let mut order = chain.clone();
        let mut seen: FxHashSet<ClassId> = chain.iter().copied().collect();
        seen.insert(class);

        let mut stack: Vec<ClassId> = Vec::new();
        for owner in std::iter::once(class).chain(chain.into_iter()) {
            for &interface in unit.class(owner).interfaces.iter().rev() {
                stack.push(interface);
            }
        }
        while let Some(interface) = stack.pop() {
            if seen.insert(interface) {
                order.push(interface);
                for &parent in unit.class(interface).interfaces.iter().rev() {
                    stack.push(parent);
                }
            }
        }
        order
    }
}

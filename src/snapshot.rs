//! Old-state snapshot generation for postconditions
//!
//! For every class whose combined contract carries at least one
//! postcondition, the generator synthesizes a zero-argument capture
//! operation: a plan naming the fields whose pre-call values are recorded
//! into a key-value map before the method body runs. Only copyable field
//! categories are captured; everything else is skipped silently, since it is
//! not a candidate for safe old-value comparison.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::Contract;
use crate::errors::ContractResult;
use crate::model::{ClassId, CompilationUnit};
use crate::runtime::Instance;
use crate::value::Value;

/// The synthesized capture operation of one class
///
/// Field order is superclass entries first, then the declaring class's own
/// fields; a name collision keeps a single entry, and capture reads the
/// most-derived field of that name off the instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPlan {
    fields: Vec<String>,
}

impl SnapshotPlan {
    /// Names of the fields this plan captures
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the plan captures anything
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Capture pre-call values off an instance into a map value
    ///
    /// Runs once per instrumented invocation, before the original body, and
    /// only when the class's enable flag is set. Capture errors are ordinary
    /// runtime errors, never contract violations.
    pub fn capture(&self, instance: &Instance) -> ContractResult<Value> {
        let mut snapshot = FxHashMap::default();
        for name in &self.fields {
            if let Some(value) = instance.get_field(name) {
                snapshot.insert(name.clone(), value);
            }
        }
        Ok(Value::Map(snapshot))
    }
}

/// Synthesizes snapshot plans for a combined compilation unit
pub struct SnapshotGenerator<'a> {
    unit: &'a CompilationUnit,
    contracts: &'a FxHashMap<ClassId, Contract>,
    plans: FxHashMap<ClassId, SnapshotPlan>,
}

impl<'a> SnapshotGenerator<'a> {
    pub fn new(unit: &'a CompilationUnit, contracts: &'a FxHashMap<ClassId, Contract>) -> Self {
        Self {
            unit,
            contracts,
            plans: FxHashMap::default(),
        }
    }

    /// Generate plans for every class with a postcondition
    ///
    /// `order` must list superclasses before subclasses so that the union
    /// with the nearest ancestor plan sees a finished plan.
    pub fn generate(mut self, order: &[ClassId]) -> FxHashMap<ClassId, SnapshotPlan> {
        for &id in order {
            let needs_snapshot = self
                .contracts
                .get(&id)
                .map(|c| !c.postconditions.is_empty())
                .unwrap_or(false);
            if !needs_snapshot {
                continue;
            }
            let plan = self.build_plan(id);
            debug!(
                class = %self.unit.class(id).name,
                fields = plan.fields.len(),
                "generated old-state snapshot plan"
            );
            self.plans.insert(id, plan);
        }
        self.plans
    }

    fn build_plan(&self, id: ClassId) -> SnapshotPlan {
        // Union with the nearest ancestor that provides a snapshot operation
        let mut fields: Vec<String> = self
            .nearest_ancestor_plan(id)
            .map(|plan| plan.fields.clone())
            .unwrap_or_default();

        for field in &self.unit.class(id).fields {
            if !field.field_type.is_copyable() {
                continue;
            }
            // Collisions favor the most-derived field of the same name
            if !fields.iter().any(|f| f == &field.name) {
                fields.push(field.name.clone());
            }
        }
        SnapshotPlan { fields }
    }

    fn nearest_ancestor_plan(&self, id: ClassId) -> Option<&SnapshotPlan> {
        self.unit
            .superclass_chain(id)
            .into_iter()
            .find_map(|ancestor| self.plans.get(&ancestor))
    }
}

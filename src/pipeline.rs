//! Orchestration of the weaving passes
//!
//! Weaving runs as a fixed phase sequence over a whole compilation unit,
//! with a barrier between phases: a phase completes for every class before
//! the next one starts. Classes are visited ancestors-first, so combined
//! contracts and snapshot plans exist before any derived class consumes
//! them. Every pass is idempotent thanks to the per-method weave marks, so
//! running the pipeline twice leaves the unit unchanged.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::classify::is_candidate_class;
use crate::combinator::AssertionCombinator;
use crate::config::WeaveOptions;
use crate::contract::Contract;
use crate::errors::ContractResult;
use crate::model::{ClassId, CompilationUnit};
use crate::snapshot::SnapshotGenerator;
use crate::weaver::{AssertionInjector, InjectionCounts};

/// The ordered phases of one weaving run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Classify,
    Combine,
    GenerateSnapshots,
    InjectPrePost,
    InjectInvariants,
    WrapSetters,
}

impl Phase {
    /// All phases, in execution order
    pub const ALL: [Phase; 6] = [
        Phase::Classify,
        Phase::Combine,
        Phase::GenerateSnapshots,
        Phase::InjectPrePost,
        Phase::InjectInvariants,
        Phase::WrapSetters,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Classify => "classify",
            Phase::Combine => "combine",
            Phase::GenerateSnapshots => "generate-snapshots",
            Phase::InjectPrePost => "inject-pre-post",
            Phase::InjectInvariants => "inject-invariants",
            Phase::WrapSetters => "wrap-setters",
        };
        write!(f, "{}", name)
    }
}

/// Summary of one weaving run, serializable for build logs
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeaveReport {
    pub classes_total: usize,
    pub candidate_classes: usize,
    pub classes_with_contracts: usize,
    pub snapshot_plans: usize,
    pub preconditions_injected: usize,
    pub postconditions_injected: usize,
    pub snapshots_injected: usize,
    pub invariants_injected: usize,
    pub setters_wrapped: usize,
}

/// Drives the phase sequence over a compilation unit
pub struct WeavePipeline {
    options: WeaveOptions,
}

impl WeavePipeline {
    pub fn new(options: WeaveOptions) -> Self {
        Self { options }
    }

    /// Weave the unit in place and report what was injected
    pub fn run(&self, unit: &mut CompilationUnit) -> ContractResult<WeaveReport> {
        let mut report = WeaveReport {
            classes_total: unit.classes.len(),
            ..WeaveReport::default()
        };
        let order = unit.ids_in_hierarchy_order();

        info!(phase = %Phase::Classify, "starting weave");
        report.candidate_classes = unit.classes.iter().filter(|c| is_candidate_class(c)).count();
        debug!(
            total = report.classes_total,
            candidates = report.candidate_classes,
            "classified compilation unit"
        );

        info!(phase = %Phase::Combine, "combining contracts down the hierarchy");
        let contracts = self.combine(unit)?;
        report.classes_with_contracts = contracts
            .values()
            .filter(|c| c.has_conditions())
            .count();

        info!(phase = %Phase::GenerateSnapshots, "planning old-state snapshots");
        let plans = SnapshotGenerator::new(unit, &contracts).generate(&order);
        report.snapshot_plans = plans.len();

        let injector = AssertionInjector::new(&self.options, &contracts, &plans);
        let mut counts = InjectionCounts::default();

        info!(phase = %Phase::InjectPrePost, "injecting pre/postcondition checks");
        for &id in &order {
            injector.inject_pre_post(unit.class_mut(id), &mut counts);
        }

        info!(phase = %Phase::InjectInvariants, "injecting invariant checks");
        for &id in &order {
            injector.inject_invariants(unit.class_mut(id), &mut counts);
        }

        info!(phase = %Phase::WrapSetters, "wrapping synthesized setters");
        for &id in &order {
            injector.wrap_setters(unit.class_mut(id), &mut counts);
        }

        report.preconditions_injected = counts.preconditions;
        report.postconditions_injected = counts.postconditions;
        report.snapshots_injected = counts.snapshots;
        report.invariants_injected = counts.invariants;
        report.setters_wrapped = counts.setters_wrapped;
        info!(
            preconditions = counts.preconditions,
            postconditions = counts.postconditions,
            invariants = counts.invariants,
            setters = counts.setters_wrapped,
            "weave complete"
        );
        Ok(report)
    }

    fn combine(&self, unit: &CompilationUnit) -> ContractResult<FxHashMap<ClassId, Contract>> {
        let mut combinator = AssertionCombinator::new(unit);
        combinator.combine_all()?;
        Ok(combinator.into_contracts())
    }
}

/// Weave a unit with the given options in one call
pub fn weave(unit: &mut CompilationUnit, options: WeaveOptions) -> ContractResult<WeaveReport> {
    WeavePipeline::new(options).run(unit)
}

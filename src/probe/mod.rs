//! Probing oracle interface and probe-plan selection.
//!
//! The oracle is the crate's single external collaborator with side
//! effects: it executes candidate plans against a real engine with a row
//! cap on every intermediate result and returns a structured trace. SQL
//! generation, connectivity, and engine-output parsing all live behind it.

use std::collections::HashMap;

use tracing::debug;

use crate::error::OptimizeResult;
use crate::lattice::RelationLattice;
use crate::planner::{self, ProbePlan};
use crate::query::{QueryInfo, TableSet};
use crate::status::{CostModel, RelStatus, StatusTracker};
use crate::trace::TraceNode;

/// Executes probing queries against a real execution engine.
///
/// Implementations signal engine failures through their `Result`s; the
/// driver surfaces them immediately and never retries a probe.
pub trait ProbeOracle {
    /// The engine's own cardinality estimate for a relation, used to seed
    /// best guesses. `None` when no estimate is available.
    fn estimate(&mut self, query: &QueryInfo, rel: TableSet) -> Option<f64>;

    /// Exact row count of a base table after applying all predicates that
    /// only touch that table.
    fn count_base_table(&mut self, query: &QueryInfo, table: usize) -> OptimizeResult<u64>;

    /// Execute `plan` with `limit` as the per-relation row cap, returning
    /// the execution trace. Blocks until the engine answers.
    fn probe(
        &mut self,
        query: &QueryInfo,
        plan: &ProbePlan,
        limit: u64,
    ) -> OptimizeResult<TraceNode>;
}

/// Choose the next plan to probe under the current cardinality budget.
///
/// While no complete plan is known, probe the cheapest full-result plan
/// whose guessed intermediate cardinalities all stay under the budget.
/// Once that well runs dry, fall back to maximizing the number of pending
/// relations a single cheap probe can resolve. `None` means nothing is
/// selectable at this budget and the driver should raise it.
pub fn select_probe_plan(
    tracker: &StatusTracker,
    lattice: &RelationLattice,
    query: &QueryInfo,
    limit: u64,
) -> Option<ProbePlan> {
    let all_tables = query.all_tables();
    let complete_plan_known = tracker.best_cost_ub(lattice, query).is_finite();

    let mut probe_plan: Option<ProbePlan> = None;
    if !complete_plan_known {
        debug!("trying to find a complete plan");
        let cards = tracker.extract_card(CostModel::SafeGuess, true, limit as f64);
        probe_plan = planner::plan(lattice, query, all_tables, &cards, true).remove(&all_tables);
    }
    if probe_plan.as_ref().map(|p| !p.cost().is_finite()).unwrap_or(true) {
        probe_plan = cheapest_verification_probe(tracker, lattice, query, limit);
    }
    probe_plan
}

/// Cheapest plan targeting any pending relation under
/// [`CostModel::NrVerifiable`] costs.
fn cheapest_verification_probe(
    tracker: &StatusTracker,
    lattice: &RelationLattice,
    query: &QueryInfo,
    limit: u64,
) -> Option<ProbePlan> {
    debug!("trying to verify a maximal number of relations");
    let cards: HashMap<TableSet, f64> =
        tracker.extract_card(CostModel::NrVerifiable, true, limit as f64);
    let mut best: Option<ProbePlan> = None;
    let mut best_cost = f64::INFINITY;
    for k in 2..=query.table_count() {
        for rel in lattice.rels_with_card(k) {
            let pending = tracker
                .info(rel)
                .map(|info| info.status == RelStatus::Pending)
                .unwrap_or(false);
            if !pending {
                continue;
            }
            if let Some(plan) = planner::plan(lattice, query, rel, &cards, false).remove(&rel) {
                if plan.cost() < best_cost {
                    best_cost = plan.cost();
                    best = Some(plan);
                }
            }
        }
    }
    best
}

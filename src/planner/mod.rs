//! Dynamic-programming join planner.
//!
//! Finds the cheapest bushy join tree for a target relation under a given
//! per-relation cost assignment, reusing optimal sub-plans across subset
//! sizes. Cost assignments come from the status tracker's cost models; a
//! cost of `+∞` marks a relation as currently infeasible.

pub mod plan;

pub use plan::ProbePlan;

use std::collections::HashMap;

use crate::lattice::RelationLattice;
use crate::query::{QueryInfo, TableSet};

/// Compute cheapest plans for `target` and all its valid sub-relations.
///
/// `target` must be a relation of the lattice. Leaves take the singleton
/// costs from `rel_cost`. For each larger relation, every recorded
/// decomposition is tried; a candidate replaces the incumbent when its cost
/// is less *or equal*, so ties favor the most recently enumerated
/// decomposition. Decompositions are iterated in ascending bit order, which
/// pins the tie-break deterministically.
///
/// When `ignore_target` is set, the cost of materializing `target` itself is
/// not counted (the final result is never written out).
pub fn plan(
    lattice: &RelationLattice,
    query: &QueryInfo,
    target: TableSet,
    rel_cost: &HashMap<TableSet, f64>,
    ignore_target: bool,
) -> HashMap<TableSet, ProbePlan> {
    let cardinality = target.len();
    let mut best_plan: HashMap<TableSet, ProbePlan> = HashMap::new();

    // Base table accesses.
    for table in target.iter() {
        let rel = TableSet::singleton(table);
        let cost = rel_cost.get(&rel).copied().unwrap_or(f64::INFINITY);
        best_plan.insert(rel, ProbePlan::leaf(query, table, cost));
    }

    // Join relations by increasing size.
    for k in 2..=cardinality {
        for rel in lattice.rels_with_card(k) {
            if !rel.is_subset_of(target) {
                continue;
            }
            for sub1 in lattice.subsets_of(rel) {
                let sub2 = rel.difference(sub1);
                if sub1.is_empty() || sub2.is_empty() {
                    continue;
                }
                let (cost1, cost2) = match (best_plan.get(&sub1), best_plan.get(&sub2)) {
                    (Some(p1), Some(p2)) => (p1.cost(), p2.cost()),
                    _ => continue,
                };
                let old_cost = best_plan.get(&rel).map(|p| p.cost()).unwrap_or(f64::INFINITY);
                // The cost of writing out the final result is not counted.
                let rel_write_cost = if k == cardinality && ignore_target {
                    0.0
                } else {
                    rel_cost.get(&rel).copied().unwrap_or(f64::INFINITY)
                };
                let new_cost = cost1 + cost2 + rel_write_cost;
                if new_cost <= old_cost {
                    let left = best_plan.get(&sub1).expect("checked above").clone();
                    let right = best_plan.get(&sub2).expect("checked above").clone();
                    best_plan.insert(rel, ProbePlan::join(left, right, new_cost));
                }
            }
        }
    }

    best_plan
}

//! Adaptive optimization driver.
//!
//! The control loop tying the subsystems together: repeatedly select a
//! probe, execute it through the oracle, fold the observed cardinalities
//! into bounds, advance relation statuses, and raise the cardinality budget
//! whenever no probe can make progress. Single-threaded and synchronous;
//! the probe is the only suspension point.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::OptimizerSettings;
use crate::error::{OptimizeError, OptimizeResult};
use crate::lattice::RelationLattice;
use crate::planner::{self, ProbePlan};
use crate::probe::{select_probe_plan, ProbeOracle};
use crate::query::{QueryInfo, TableSet};
use crate::status::{CostModel, RelInfo, RelStatus, StatusTracker};
use crate::trace;

/// Final output of an optimization run.
#[derive(Debug)]
pub struct Verdict {
    /// Per-relation bounds and statuses reached by the run.
    pub rel_infos: HashMap<TableSet, RelInfo>,
    /// Cheapest complete plan under verified cardinalities, when one
    /// exists. With no timeout, its cost is the verified optimum.
    pub final_plan: Option<ProbePlan>,
    /// The run hit its deadline; unresolved relations remain and the result
    /// must not be treated as complete.
    pub timed_out: bool,
    pub elapsed: Duration,
    /// Number of probing executions issued.
    pub probe_count: u32,
}

/// Verified query-plan optimizer.
///
/// Owns the probing oracle for the duration of a run; all remaining state
/// is created per invocation of [`optimize`](Optimizer::optimize).
pub struct Optimizer<O: ProbeOracle> {
    oracle: O,
    settings: OptimizerSettings,
}

impl<O: ProbeOracle> Optimizer<O> {
    pub fn new(oracle: O, settings: OptimizerSettings) -> Self {
        Optimizer { oracle, settings }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Search for a join order with verified intermediate cardinalities.
    ///
    /// Terminates when every non-base relation has left `Pending`, or when
    /// the deadline elapses (reported via [`Verdict::timed_out`], not as an
    /// error). Oracle failures and bound violations abort the run.
    pub fn optimize(&mut self, query: &QueryInfo) -> OptimizeResult<Verdict> {
        let start = Instant::now();
        let deadline = Duration::from_millis(self.settings.timeout_millis);
        info!(tables = query.table_count(), "starting optimization");

        let lattice = RelationLattice::build(query);
        debug!(relations = lattice.len(), "plan space generated");
        let mut tracker = StatusTracker::new(&lattice, self.settings.verification_tolerance);

        // Seed best guesses from the engine's own estimates.
        for rel in lattice.all_rels() {
            if let Some(estimate) = self.oracle.estimate(query, rel) {
                tracker.seed_best_guess(rel, estimate);
            }
        }

        // Verify all base tables up front with exact filtered counts.
        let mut max_base_card = 0u64;
        for table in 0..query.table_count() {
            let card = self.oracle.count_base_table(query, table)?;
            max_base_card = max_base_card.max(card);
            tracker.set_base_verified(table, card);
        }
        info!(max_base_card, "all base tables verified");

        // Conservative initial budget relative to the largest base table.
        let mut limit = (max_base_card / self.settings.initial_budget_divisor).max(1);
        let mut timed_out = false;
        let mut probe_count = 0u32;

        while !tracker.by_status(RelStatus::Pending, true).is_empty() {
            if start.elapsed() > deadline {
                timed_out = true;
                break;
            }
            let probe_plan = select_probe_plan(&tracker, &lattice, query, limit);
            if let Some(plan) = &probe_plan {
                debug!(
                    rel = %plan.result_rel(),
                    aliases = ?query.alias_set(plan.result_rel()),
                    limit,
                    "executing probe"
                );
                let trace = self.oracle.probe(query, plan, limit)?;
                probe_count += 1;
                let outcome = trace::interpret(&trace, plan, limit)?;
                tracker.update_card(&outcome)?;
                tracker.update_cost(&lattice, query, true);
                tracker.update_status(&lattice, query, true, limit as f64, false);
                debug!(
                    pending = tracker.by_status(RelStatus::Pending, true).len(),
                    unverified = tracker.by_status(RelStatus::Unverified, true).len(),
                    "probe interpreted"
                );
            }
            // Raise the budget when nothing was selectable, or when the
            // pending set drained but temporarily excluded relations may
            // still be re-admitted at a higher limit.
            if probe_plan.is_none() || tracker.by_status(RelStatus::Pending, true).is_empty() {
                if probe_plan.is_none() && limit == u64::MAX {
                    // The budget can no longer grow; no relation will ever
                    // become selectable again.
                    return Err(OptimizeError::NoFeasiblePlan);
                }
                limit = limit.saturating_mul(self.settings.budget_growth_factor);
                info!(limit, "cardinality budget raised");
                tracker.update_status(&lattice, query, true, limit as f64, true);
            }
        }

        // Cheapest plan over verified cardinalities, if the run got far
        // enough to produce one.
        let cards = tracker.extract_card(CostModel::UpperBounds, true, -1.0);
        let final_plan = planner::plan(&lattice, query, query.all_tables(), &cards, true)
            .remove(&query.all_tables())
            .filter(|plan| plan.cost().is_finite());

        let elapsed = start.elapsed();
        info!(?elapsed, probe_count, timed_out, "optimization finished");
        Ok(Verdict {
            rel_infos: tracker.into_rel_infos(),
            final_plan,
            timed_out,
            elapsed,
            probe_count,
        })
    }
}

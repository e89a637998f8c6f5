//! Per-relation verification status, cardinality bounds, and the bound
//! propagation that drives the probing loop.
//!
//! The tracker owns one [`RelInfo`] per lattice relation for the lifetime of
//! an optimization run. Probes raise cardinality bounds, `update_cost`
//! re-derives cost lower bounds over the whole lattice, and `update_status`
//! advances the per-relation state machine:
//!
//! ```text
//!            limit increased
//!   Unverified ──────────────► Pending ──► Verified (terminal)
//!        ▲   over budget /        │
//!        └── stuck at limit ──────┤
//!                                 ▼
//!                             Excluded (terminal)
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OptimizeError, OptimizeResult};
use crate::lattice::RelationLattice;
use crate::planner;
use crate::query::{QueryInfo, TableSet};
use crate::trace::{CardStatus, ProbeOutcome};

/// Verification status of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelStatus {
    /// No final status known yet.
    Pending,
    /// Exact cardinality is verified.
    Verified,
    /// Cannot be verified with the current cardinality budget.
    Unverified,
    /// Provably not part of any optimal plan. Terminal.
    Excluded,
}

/// Policy for turning relation metadata into a scalar cost for the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostModel {
    /// Lower cardinality bounds: optimistic cost.
    LowerBounds,
    /// Verified cardinalities only, `+∞` otherwise: pessimistic cost.
    UpperBounds,
    /// Best-guess cardinality while the relation is still in play.
    BestGuess,
    /// Best guess, but `+∞` once the guess reaches the cardinality limit.
    SafeGuess,
    /// Bias toward plans whose intermediate results are likely verifiable.
    Verifiability,
    /// Bias toward plans covering the most already-resolved sub-relations.
    NrVerifiable,
}

/// Cost assigned to a pending, under-budget relation by
/// [`CostModel::NrVerifiable`]. Negative so the planner prefers covering
/// such relations; resolved relations cost `1.0`, making the total an
/// (inverted) count of newly verifiable relations. Any monotone encoding
/// with that effect would do.
const PENDING_REWARD: f64 = -2.0;

/// Mutable per-relation record. Created once per relation at optimization
/// start and never destroyed during a run; the full map is the run's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelInfo {
    pub status: RelStatus,
    /// Lower bound on relation cardinality.
    pub lower_card_bound: f64,
    /// Current best guess on the cardinality, seeded from the engine's own
    /// estimate and updated as observations arrive. `-1` when unknown.
    pub card_best_guess: f64,
    /// Upper bound on relation cardinality.
    pub upper_card_bound: f64,
    /// Lower bound on the cost of generating this relation, including the
    /// cost associated with the relation itself (C_out metric).
    pub generation_cost_lb: f64,
    /// Lower bound on the cost of generating the final result from this
    /// relation, excluding the cost of the relation itself.
    pub completion_cost_lb: f64,
    /// Lower bound on the cost of any complete plan generating this relation.
    pub lower_cost_bound: f64,
}

impl Default for RelInfo {
    fn default() -> Self {
        RelInfo {
            status: RelStatus::Pending,
            lower_card_bound: 0.0,
            card_best_guess: -1.0,
            upper_card_bound: f64::INFINITY,
            generation_cost_lb: 0.0,
            completion_cost_lb: 0.0,
            lower_cost_bound: 0.0,
        }
    }
}

impl fmt::Display for RelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status: {:?}, cardLB: {}, cardBG: {}, cardUB: {}, genCost: {}, compCost: {}, costLB: {}",
            self.status,
            self.lower_card_bound,
            self.card_best_guess,
            self.upper_card_bound,
            self.generation_cost_lb,
            self.completion_cost_lb,
            self.lower_cost_bound
        )
    }
}

/// Owns relation metadata for one optimization run and propagates bounds
/// and statuses across the lattice.
#[derive(Debug)]
pub struct StatusTracker {
    rel_infos: HashMap<TableSet, RelInfo>,
    /// Multiplier applied to the lower bound when testing verification;
    /// absorbs rounding in engine-reported counts.
    tolerance: f64,
}

impl StatusTracker {
    /// Create default metadata for every relation of the lattice.
    pub fn new(lattice: &RelationLattice, tolerance: f64) -> Self {
        let rel_infos = lattice
            .all_rels()
            .map(|rel| (rel, RelInfo::default()))
            .collect();
        StatusTracker {
            rel_infos,
            tolerance,
        }
    }

    pub fn info(&self, rel: TableSet) -> Option<&RelInfo> {
        self.rel_infos.get(&rel)
    }

    pub fn rel_infos(&self) -> &HashMap<TableSet, RelInfo> {
        &self.rel_infos
    }

    /// Consume the tracker, yielding the final per-relation records.
    pub fn into_rel_infos(self) -> HashMap<TableSet, RelInfo> {
        self.rel_infos
    }

    /// Seed the best-guess cardinality of a relation from an external
    /// estimate.
    pub fn seed_best_guess(&mut self, rel: TableSet, guess: f64) {
        if let Some(info) = self.rel_infos.get_mut(&rel) {
            info.card_best_guess = guess;
        }
    }

    /// Record the exact filtered cardinality of a base table and mark it
    /// verified.
    pub fn set_base_verified(&mut self, table: usize, card: u64) {
        let rel = TableSet::singleton(table);
        if let Some(info) = self.rel_infos.get_mut(&rel) {
            info.lower_card_bound = card as f64;
            info.card_best_guess = card as f64;
            info.upper_card_bound = card as f64;
            info.status = RelStatus::Verified;
        }
    }

    /// Map every relation to a scalar cost under the given policy.
    ///
    /// `limit` is the current cardinality budget; only [`CostModel::SafeGuess`]
    /// and [`CostModel::NrVerifiable`] consult it. With `ignore_base_tables`,
    /// singleton relations cost zero regardless of policy.
    pub fn extract_card(
        &self,
        model: CostModel,
        ignore_base_tables: bool,
        limit: f64,
    ) -> HashMap<TableSet, f64> {
        // Highest known lower bound, used by the verifiability policy as a
        // stand-in for unverified relations.
        let max_card = self
            .rel_infos
            .values()
            .map(|info| info.lower_card_bound)
            .fold(0.0, f64::max);

        let mut card = HashMap::with_capacity(self.rel_infos.len());
        for (rel, info) in &self.rel_infos {
            if rel.len() == 1 && ignore_base_tables {
                card.insert(*rel, 0.0);
                continue;
            }
            let value = match model {
                CostModel::LowerBounds => info.lower_card_bound,
                CostModel::UpperBounds => {
                    if info.status == RelStatus::Verified {
                        info.lower_card_bound
                    } else {
                        f64::INFINITY
                    }
                }
                CostModel::BestGuess => {
                    if info.status == RelStatus::Verified || info.status == RelStatus::Pending {
                        info.card_best_guess
                    } else {
                        f64::INFINITY
                    }
                }
                CostModel::SafeGuess => {
                    if info.card_best_guess >= limit {
                        f64::INFINITY
                    } else {
                        info.card_best_guess
                    }
                }
                CostModel::Verifiability => match info.status {
                    RelStatus::Verified => info.lower_card_bound,
                    RelStatus::Pending => max_card,
                    _ => f64::INFINITY,
                },
                CostModel::NrVerifiable => {
                    if info.lower_card_bound >= limit {
                        f64::INFINITY
                    } else if info.status != RelStatus::Pending {
                        1.0
                    } else {
                        PENDING_REWARD
                    }
                }
            };
            card.insert(*rel, value);
        }
        card
    }

    /// Fold an interpreted probe outcome into cardinality bounds.
    ///
    /// Observed counts raise the lower bound and best guess; exact counts
    /// pin the upper bound. A lower bound crossing the upper bound is a
    /// fatal [`OptimizeError::BoundViolation`].
    pub fn update_card(&mut self, outcome: &ProbeOutcome) -> OptimizeResult<()> {
        for (rel, &count) in &outcome.rel_to_card {
            let info = self
                .rel_infos
                .get_mut(rel)
                .ok_or(OptimizeError::UnknownRelation(*rel))?;
            info.lower_card_bound = info.lower_card_bound.max(count as f64);
            info.card_best_guess = info.card_best_guess.max(count as f64);
            if outcome.rel_to_status.get(rel) == Some(&CardStatus::Exact) {
                info.upper_card_bound = count as f64;
            }
            if info.lower_card_bound > info.upper_card_bound {
                return Err(OptimizeError::BoundViolation {
                    rel: *rel,
                    lower: info.lower_card_bound,
                    upper: info.upper_card_bound,
                });
            }
        }
        Ok(())
    }

    /// Re-derive cost lower bounds for every relation.
    ///
    /// Generation-cost bounds come from a bottom-up DP pass under optimistic
    /// (lower-bound) costs. Completion-cost bounds run top-down from the
    /// largest relations: completing from `R` means extending via some
    /// recorded superset `U`, paying `U`'s own optimistic cost (unless `U`
    /// is the final result) plus the generation cost of the complement.
    pub fn update_cost(
        &mut self,
        lattice: &RelationLattice,
        query: &QueryInfo,
        ignore_base_tables: bool,
    ) {
        let nr_tables = query.table_count();
        let card_lbs = self.extract_card(CostModel::LowerBounds, ignore_base_tables, -1.0);
        let cost_lbs = planner::plan(lattice, query, query.all_tables(), &card_lbs, true);

        for (rel, info) in &mut self.rel_infos {
            info.generation_cost_lb = cost_lbs
                .get(rel)
                .map(|plan| plan.cost())
                .unwrap_or(f64::INFINITY);
        }

        // Completion bounds, largest relations first. The full relation
        // keeps its initial zero; singletons are never completed from
        // directly, so the loop stops at pairs.
        for k in (2..nr_tables).rev() {
            let rels: Vec<TableSet> = lattice.rels_with_card(k).collect();
            for rel in rels {
                let mut completion = f64::INFINITY;
                for sup in lattice.supersets_of(rel) {
                    let complement = sup.difference(rel);
                    let sup_completion = self.rel_infos[&sup].completion_cost_lb;
                    let sup_cost = if sup.len() != nr_tables {
                        card_lbs.get(&sup).copied().unwrap_or(f64::INFINITY)
                    } else {
                        0.0
                    };
                    let gen_cost = self.rel_infos[&complement].generation_cost_lb;
                    let new_cost = sup_completion + sup_cost + gen_cost;
                    if new_cost <= completion {
                        completion = new_cost;
                    }
                }
                if let Some(info) = self.rel_infos.get_mut(&rel) {
                    info.completion_cost_lb = completion;
                }
            }
        }

        for info in self.rel_infos.values_mut() {
            info.lower_cost_bound = info.generation_cost_lb + info.completion_cost_lb;
        }
    }

    /// Upper bound on the cost of an optimal plan: the cheapest complete
    /// plan built from verified cardinalities only. `+∞` until enough
    /// relations are verified for a complete plan to exist.
    pub fn best_cost_ub(&self, lattice: &RelationLattice, query: &QueryInfo) -> f64 {
        let cards = self.extract_card(CostModel::UpperBounds, true, -1.0);
        planner::plan(lattice, query, query.all_tables(), &cards, true)
            .get(&query.all_tables())
            .map(|plan| plan.cost())
            .unwrap_or(f64::INFINITY)
    }

    /// Advance the status of every relation, in ascending cardinality order.
    ///
    /// Passes with `limit_updated` first re-admit temporarily excluded
    /// relations before any verification or exclusion check runs on them.
    pub fn update_status(
        &mut self,
        lattice: &RelationLattice,
        query: &QueryInfo,
        ignore_base_tables: bool,
        limit: f64,
        limit_updated: bool,
    ) {
        let best_cost_ub = self.best_cost_ub(lattice, query);
        debug!(best_cost_ub, limit, "updating relation statuses");

        let k_start = if ignore_base_tables { 2 } else { 1 };
        for k in k_start..=query.table_count() {
            let rels: Vec<TableSet> = lattice.rels_with_card(k).collect();
            for rel in rels {
                // Re-admit temporarily excluded relations on budget raise.
                if limit_updated && self.rel_infos[&rel].status == RelStatus::Unverified {
                    self.rel_infos.get_mut(&rel).expect("lattice relation").status =
                        RelStatus::Pending;
                }

                // Lower bound within tolerance of the upper bound: verified.
                if self.rel_infos[&rel].status == RelStatus::Pending {
                    let info = &self.rel_infos[&rel];
                    if info.lower_card_bound * self.tolerance >= info.upper_card_bound {
                        debug!(rel = %rel, "verified");
                        self.rel_infos.get_mut(&rel).expect("lattice relation").status =
                            RelStatus::Verified;
                    }
                }

                // Permanent exclusion: too expensive for any optimal plan,
                // or no way left to generate the relation at all.
                let too_expensive = self.rel_infos[&rel].lower_cost_bound > best_cost_ub;
                let generable = self.valid_decomposition(
                    rel,
                    lattice,
                    &[RelStatus::Verified, RelStatus::Pending, RelStatus::Unverified],
                );
                if too_expensive || !generable {
                    if self.rel_infos[&rel].status != RelStatus::Excluded {
                        debug!(rel = %rel, info = %self.rel_infos[&rel], "excluded");
                    }
                    self.rel_infos.get_mut(&rel).expect("lattice relation").status =
                        RelStatus::Excluded;
                }

                // Temporary exclusion: unreachable under the current budget.
                if self.rel_infos[&rel].status == RelStatus::Pending {
                    let over_budget = self.rel_infos[&rel].lower_card_bound >= limit;
                    let progressable = self.valid_decomposition(
                        rel,
                        lattice,
                        &[RelStatus::Verified, RelStatus::Pending],
                    );
                    if over_budget || !progressable {
                        debug!(rel = %rel, "temporarily excluded");
                        self.rel_infos.get_mut(&rel).expect("lattice relation").status =
                            RelStatus::Unverified;
                    }
                }
            }
        }
    }

    /// True iff some recorded decomposition of `rel` has both halves in one
    /// of the allowed statuses.
    pub fn valid_decomposition(
        &self,
        rel: TableSet,
        lattice: &RelationLattice,
        allowed: &[RelStatus],
    ) -> bool {
        for sub in lattice.subsets_of(rel) {
            let complement = rel.difference(sub);
            let sub_ok = self
                .rel_infos
                .get(&sub)
                .map(|info| allowed.contains(&info.status))
                .unwrap_or(false);
            let compl_ok = self
                .rel_infos
                .get(&complement)
                .map(|info| allowed.contains(&info.status))
                .unwrap_or(false);
            if sub_ok && compl_ok {
                return true;
            }
        }
        false
    }

    /// Relations currently in the given status, optionally skipping base
    /// tables.
    pub fn by_status(&self, status: RelStatus, ignore_base_tables: bool) -> Vec<TableSet> {
        self.rel_infos
            .iter()
            .filter(|(rel, info)| {
                info.status == status && (!ignore_base_tables || rel.len() > 1)
            })
            .map(|(rel, _)| *rel)
            .collect()
    }
}

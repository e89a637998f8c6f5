//! Probe plan trees.

use serde::Serialize;

use crate::query::{QueryInfo, TableSet};

/// A candidate join plan, executed against the engine as a probing query.
///
/// The variant set is closed: a plan is either a base-table access or a
/// binary join of two owned sub-plans. A planning invocation owns every node
/// it creates.
#[derive(Debug, Clone, Serialize)]
pub enum ProbePlan {
    /// Access to a single base table.
    Leaf {
        /// Ordinal of the accessed table.
        table: usize,
        result_rel: TableSet,
        cost: f64,
        /// Number of columns the probing query projects for this table.
        column_count: usize,
    },
    /// Binary join of two sub-plans.
    Join {
        left: Box<ProbePlan>,
        right: Box<ProbePlan>,
        /// Union of the children's result relations.
        result_rel: TableSet,
        cost: f64,
    },
}

impl ProbePlan {
    /// Plan accessing a single base table with the given access cost.
    pub fn leaf(query: &QueryInfo, table: usize, cost: f64) -> Self {
        ProbePlan::Leaf {
            table,
            result_rel: TableSet::singleton(table),
            cost,
            column_count: query.predicate_columns(table).len(),
        }
    }

    /// Plan joining the results of two sub-plans.
    pub fn join(left: ProbePlan, right: ProbePlan, cost: f64) -> Self {
        let result_rel = left.result_rel().union(right.result_rel());
        ProbePlan::Join {
            left: Box::new(left),
            right: Box::new(right),
            result_rel,
            cost,
        }
    }

    /// Relation produced by this plan.
    pub fn result_rel(&self) -> TableSet {
        match self {
            ProbePlan::Leaf { result_rel, .. } | ProbePlan::Join { result_rel, .. } => *result_rel,
        }
    }

    /// Cost of producing this plan's result.
    pub fn cost(&self) -> f64 {
        match self {
            ProbePlan::Leaf { cost, .. } | ProbePlan::Join { cost, .. } => *cost,
        }
    }

    /// True iff some node of this plan produces exactly `rel`.
    pub fn contains_rel(&self, rel: TableSet) -> bool {
        match self {
            ProbePlan::Leaf { result_rel, .. } => *result_rel == rel,
            ProbePlan::Join {
                left,
                right,
                result_rel,
                ..
            } => *result_rel == rel || left.contains_rel(rel) || right.contains_rel(rel),
        }
    }

    /// Table ordinals accessed by the plan's leaves, in join-tree order.
    pub fn leaf_tables(&self) -> Vec<usize> {
        let mut tables = Vec::new();
        self.collect_leaf_tables(&mut tables);
        tables
    }

    fn collect_leaf_tables(&self, tables: &mut Vec<usize>) {
        match self {
            ProbePlan::Leaf { table, .. } => tables.push(*table),
            ProbePlan::Join { left, right, .. } => {
                left.collect_leaf_tables(tables);
                right.collect_leaf_tables(tables);
            }
        }
    }
}

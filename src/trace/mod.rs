//! Execution-trace interpretation.
//!
//! A probe returns a structured trace mirroring the probed plan; each node
//! reports the row count the engine actually produced, or nothing when the
//! node was never executed. The interpreter turns that into per-relation
//! cardinalities plus an exactness classification: a count is only exact if
//! the node ran to completion, stayed under the cardinality cap, and every
//! result it consumed is exact as well.
//!
//! Engine-specific text parsing is the oracle's responsibility; this module
//! only consumes the structured form.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, OptimizeResult};
use crate::planner::ProbePlan;
use crate::query::TableSet;

/// How an observed cardinality relates to the true cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardStatus {
    /// No usable cardinality is known.
    Unknown,
    /// The observed count is a lower bound on the true cardinality.
    LowerBound,
    /// The observed count is the true cardinality.
    Exact,
}

/// One node of an execution trace. Serde-enabled so captured traces can be
/// stored and replayed as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceNode {
    /// Relation produced by the traced plan node.
    pub result_rel: TableSet,
    /// Row count the engine reported; `None` for a node that was never
    /// executed.
    pub rows: Option<u64>,
    /// Sub-traces, mirroring the plan's children. Empty for leaves.
    #[serde(default)]
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    pub fn leaf(result_rel: TableSet, rows: Option<u64>) -> Self {
        TraceNode {
            result_rel,
            rows,
            children: Vec::new(),
        }
    }

    pub fn join(result_rel: TableSet, rows: Option<u64>, left: TraceNode, right: TraceNode) -> Self {
        TraceNode {
            result_rel,
            rows,
            children: vec![left, right],
        }
    }
}

/// Interpreted result of one probe: observed cardinality per relation
/// (`-1` marks a branch that was never executed) and its exactness.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub rel_to_card: HashMap<TableSet, i64>,
    pub rel_to_status: HashMap<TableSet, CardStatus>,
}

/// Interpret a trace against the plan it was produced for, under the
/// cardinality cap `limit` that was active during the probe.
///
/// Fails with [`OptimizeError::InconsistentTrace`] when the two extraction
/// passes disagree, when a relation appears twice with conflicting counts,
/// when a traced relation is absent from the plan, or when a join relation
/// of the plan carries no count at all.
pub fn interpret(
    trace: &TraceNode,
    plan: &ProbePlan,
    limit: u64,
) -> OptimizeResult<ProbeOutcome> {
    let mut rel_to_card = HashMap::new();
    collect_cards(trace, &mut rel_to_card)?;

    // Cross-check against an independent flat extraction: both passes must
    // surface the same set of observed counts.
    let mut tree_counts: Vec<i64> = rel_to_card.values().copied().collect();
    let mut flat_counts = flat_join_counts(trace);
    tree_counts.sort_unstable();
    flat_counts.sort_unstable();
    if tree_counts != flat_counts {
        return Err(OptimizeError::InconsistentTrace(format!(
            "tree extraction {:?} disagrees with flat extraction {:?}",
            tree_counts, flat_counts
        )));
    }

    // Every traced relation must come from the probed plan.
    for rel in rel_to_card.keys() {
        if !plan.contains_rel(*rel) {
            return Err(OptimizeError::InconsistentTrace(format!(
                "extracted cardinality for relation {} not found in probe plan",
                rel
            )));
        }
    }

    let mut rel_to_status = HashMap::new();
    verify_rec(plan, limit, &rel_to_card, &mut rel_to_status)?;

    Ok(ProbeOutcome {
        rel_to_card,
        rel_to_status,
    })
}

/// Record counts for join relations of the trace. Base-table scans are
/// skipped; their cardinalities are verified separately by exact counts.
fn collect_cards(
    node: &TraceNode,
    rel_to_card: &mut HashMap<TableSet, i64>,
) -> OptimizeResult<()> {
    if node.result_rel.len() > 1 {
        let count = node.rows.map(|r| r as i64).unwrap_or(-1);
        if let Some(previous) = rel_to_card.insert(node.result_rel, count) {
            if previous != count {
                return Err(OptimizeError::InconsistentTrace(format!(
                    "relation {} observed with counts {} and {}",
                    node.result_rel, previous, count
                )));
            }
        }
    }
    for child in &node.children {
        collect_cards(child, rel_to_card)?;
    }
    Ok(())
}

/// Flat extraction of join-node counts via an explicit stack, independent of
/// the recursive pass above.
fn flat_join_counts(trace: &TraceNode) -> Vec<i64> {
    let mut counts = Vec::new();
    let mut stack = vec![trace];
    while let Some(node) = stack.pop() {
        if node.result_rel.len() > 1 {
            counts.push(node.rows.map(|r| r as i64).unwrap_or(-1));
        }
        for child in &node.children {
            stack.push(child);
        }
    }
    counts
}

/// Classify every relation of the plan bottom-up, writing results into the
/// output map.
///
/// A join's count is unknown when the branch never ran, and only a lower
/// bound when it reached the cap (the engine may then have short-circuited
/// the whole subtree) or when either input is itself a lower bound. An
/// empty or unexecuted join operand additionally downgrades its sibling's
/// subtree: early termination on one side can cut the other side short.
fn verify_rec(
    plan: &ProbePlan,
    limit: u64,
    rel_to_card: &HashMap<TableSet, i64>,
    rel_to_status: &mut HashMap<TableSet, CardStatus>,
) -> OptimizeResult<CardStatus> {
    let mut status = CardStatus::Exact;
    if let ProbePlan::Join {
        left,
        right,
        result_rel,
        ..
    } = plan
    {
        let status_left = verify_rec(left, limit, rel_to_card, rel_to_status)?;
        let status_right = verify_rec(right, limit, rel_to_card, rel_to_status)?;

        if left.result_rel().len() > 1 {
            let left_count = rel_to_card.get(&left.result_rel()).copied().unwrap_or(-1);
            if left_count <= 0 {
                mark_as_bounds(right, rel_to_status);
            }
        }
        if right.result_rel().len() > 1 {
            let right_count = rel_to_card.get(&right.result_rel()).copied().unwrap_or(-1);
            if right_count <= 0 {
                mark_as_bounds(left, rel_to_status);
            }
        }

        if status_left == CardStatus::LowerBound || status_right == CardStatus::LowerBound {
            status = CardStatus::LowerBound;
        }
        let count = rel_to_card.get(result_rel).copied().ok_or_else(|| {
            OptimizeError::InconsistentTrace(format!(
                "no observed count for join relation {}",
                result_rel
            ))
        })?;
        if count < 0 {
            status = CardStatus::Unknown;
        } else if count >= limit as i64 {
            status = CardStatus::LowerBound;
            mark_as_bounds(plan, rel_to_status);
        }
    }
    rel_to_status.insert(plan.result_rel(), status);
    Ok(status)
}

/// Downgrade every exact classification in the subtree to a lower bound.
fn mark_as_bounds(plan: &ProbePlan, rel_to_status: &mut HashMap<TableSet, CardStatus>) {
    let rel = plan.result_rel();
    if rel_to_status.get(&rel) == Some(&CardStatus::Exact) {
        rel_to_status.insert(rel, CardStatus::LowerBound);
    }
    if let ProbePlan::Join { left, right, .. } = plan {
        mark_as_bounds(left, rel_to_status);
        mark_as_bounds(right, rel_to_status);
    }
}

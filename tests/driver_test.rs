// tests/driver_test.rs
use std::collections::HashMap;

use veriprobe::config::OptimizerSettings;
use veriprobe::driver::Optimizer;
use veriprobe::error::{OptimizeError, OptimizeResult};
use veriprobe::planner::ProbePlan;
use veriprobe::probe::ProbeOracle;
use veriprobe::query::{QueryInfo, TableSet};
use veriprobe::status::RelStatus;
use veriprobe::trace::TraceNode;

/// Three-table chain a – b – c.
fn chain_query() -> QueryInfo {
    let mut query = QueryInfo::new(vec!["a", "b", "c"]);
    query
        .add_predicate("a.x = b.x", &[("a", "x"), ("b", "x")])
        .unwrap();
    query
        .add_predicate("b.y = c.y", &[("b", "y"), ("c", "y")])
        .unwrap();
    query
}

fn rel(tables: &[usize]) -> TableSet {
    let mut r = TableSet::EMPTY;
    for &t in tables {
        r.insert(t);
    }
    r
}

/// Oracle over a fixed set of true cardinalities. Probes report the true
/// count capped at the active limit, like an engine with a row cap on
/// every intermediate result.
struct MockOracle {
    true_cards: HashMap<TableSet, u64>,
    fail_probes: bool,
}

impl MockOracle {
    fn new(true_cards: HashMap<TableSet, u64>) -> Self {
        MockOracle {
            true_cards,
            fail_probes: false,
        }
    }

    fn capped_trace(&self, plan: &ProbePlan, limit: u64) -> TraceNode {
        let rel = plan.result_rel();
        let rows = self.true_cards.get(&rel).map(|&card| card.min(limit));
        match plan {
            ProbePlan::Leaf { .. } => TraceNode::leaf(rel, rows),
            ProbePlan::Join { left, right, .. } => TraceNode::join(
                rel,
                rows,
                self.capped_trace(left, limit),
                self.capped_trace(right, limit),
            ),
        }
    }
}

impl ProbeOracle for MockOracle {
    fn estimate(&mut self, _query: &QueryInfo, rel: TableSet) -> Option<f64> {
        self.true_cards.get(&rel).map(|&card| card as f64)
    }

    fn count_base_table(&mut self, _query: &QueryInfo, table: usize) -> OptimizeResult<u64> {
        Ok(self.true_cards[&TableSet::singleton(table)])
    }

    fn probe(
        &mut self,
        _query: &QueryInfo,
        plan: &ProbePlan,
        limit: u64,
    ) -> OptimizeResult<TraceNode> {
        if self.fail_probes {
            return Err(OptimizeError::Oracle("connection reset".to_string()));
        }
        Ok(self.capped_trace(plan, limit))
    }
}

fn chain_cards() -> HashMap<TableSet, u64> {
    let mut cards = HashMap::new();
    cards.insert(rel(&[0]), 100);
    cards.insert(rel(&[1]), 50);
    cards.insert(rel(&[2]), 80);
    cards.insert(rel(&[0, 1]), 20);
    cards.insert(rel(&[1, 2]), 40);
    cards.insert(rel(&[0, 1, 2]), 10);
    cards
}

#[test]
fn test_run_converges_to_verified_optimum() {
    let query = chain_query();
    let oracle = MockOracle::new(chain_cards());
    let mut optimizer = Optimizer::new(oracle, OptimizerSettings::default());

    let verdict = optimizer.optimize(&query).unwrap();

    assert!(!verdict.timed_out);
    assert!(verdict.probe_count >= 1);
    // Every lattice relation carries a final record.
    assert_eq!(verdict.rel_infos.len(), 6);
    // No composite relation is left undecided.
    for (r, info) in &verdict.rel_infos {
        if r.len() > 1 {
            assert_ne!(info.status, RelStatus::Pending, "undecided relation {}", r);
            assert_ne!(info.status, RelStatus::Unverified, "stalled relation {}", r);
        }
    }
    // The final result is pinned exactly.
    let abc = &verdict.rel_infos[&rel(&[0, 1, 2])];
    assert_eq!(abc.status, RelStatus::Verified);
    assert_eq!(abc.lower_card_bound, 10.0);
    assert_eq!(abc.upper_card_bound, 10.0);
    // Base tables keep their exact filtered counts.
    let base = &verdict.rel_infos[&rel(&[0])];
    assert_eq!(base.status, RelStatus::Verified);
    assert_eq!(base.lower_card_bound, 100.0);

    // A complete plan over verified cardinalities exists.
    let plan = verdict.final_plan.expect("complete verified plan");
    assert_eq!(plan.result_rel(), query.all_tables());
    assert!(plan.cost().is_finite());
}

#[test]
fn test_bounds_never_exceed_truth() {
    let query = chain_query();
    let truth = chain_cards();
    let oracle = MockOracle::new(truth.clone());
    let mut optimizer = Optimizer::new(oracle, OptimizerSettings::default());

    let verdict = optimizer.optimize(&query).unwrap();

    for (r, info) in &verdict.rel_infos {
        let true_card = truth[r] as f64;
        assert!(
            info.lower_card_bound <= true_card,
            "lower bound {} above truth {} for {}",
            info.lower_card_bound,
            true_card,
            r
        );
        assert!(
            info.upper_card_bound >= true_card,
            "upper bound {} below truth {} for {}",
            info.upper_card_bound,
            true_card,
            r
        );
    }
}

#[test]
fn test_zero_deadline_times_out_before_probing() {
    let query = chain_query();
    let oracle = MockOracle::new(chain_cards());
    let settings = OptimizerSettings {
        timeout_millis: 0,
        ..OptimizerSettings::default()
    };
    let mut optimizer = Optimizer::new(oracle, settings);

    let verdict = optimizer.optimize(&query).unwrap();

    assert!(verdict.timed_out);
    assert_eq!(verdict.probe_count, 0);
    // Nothing was verified beyond the base tables, so no complete plan.
    assert!(verdict.final_plan.is_none());
}

#[test]
fn test_oracle_failure_aborts_run() {
    let query = chain_query();
    let mut oracle = MockOracle::new(chain_cards());
    oracle.fail_probes = true;
    let mut optimizer = Optimizer::new(oracle, OptimizerSettings::default());

    let err = optimizer.optimize(&query);
    assert!(matches!(err, Err(OptimizeError::Oracle(_))));
}

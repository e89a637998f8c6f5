//! Unified error type for the optimizer.
//!
//! Timeouts are deliberately not an error: a run that hits its deadline
//! terminates gracefully and reports `timed_out` on the final
//! [`Verdict`](crate::driver::Verdict).

use thiserror::Error;

use crate::query::TableSet;

/// Result type for optimizer operations.
pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// Errors that can occur during a verified-optimization run.
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// Two independent derivations of cardinalities from an execution trace
    /// disagree, or a trace refers to a relation the probed plan never
    /// produces. No partial result is trusted.
    #[error("inconsistent trace extraction: {0}")]
    InconsistentTrace(String),

    /// An updated lower cardinality bound exceeds a previously recorded
    /// upper bound. Indicates an oracle inconsistency or a logic error.
    #[error("lower cardinality bound {lower} above upper bound {upper} for relation {rel}")]
    BoundViolation {
        rel: TableSet,
        lower: f64,
        upper: f64,
    },

    /// No finite-cost probe plan remains selectable while relations are
    /// still pending, and the cardinality budget cannot grow further.
    #[error("no feasible probe plan while relations remain pending")]
    NoFeasiblePlan,

    /// A predicate referenced a table alias that is not part of the query.
    #[error("unknown table alias: '{0}'")]
    UnknownAlias(String),

    /// A relation outside the plan space was used where a lattice relation
    /// is required.
    #[error("relation {0} not present in the plan space")]
    UnknownRelation(TableSet),

    /// The probing oracle failed to execute a probe. Never retried; the
    /// failure surfaces immediately.
    #[error("probe execution failed: {0}")]
    Oracle(String),
}

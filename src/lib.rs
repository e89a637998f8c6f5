//! # Veriprobe
//!
//! A verified query-plan optimizer: for a multi-way join query, search for
//! a join order whose true intermediate-result cardinalities are
//! empirically confirmed, not merely estimated, by issuing a bounded
//! sequence of capped probing executions against a real engine and
//! interpreting their measured row counts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              QueryInfo (tables + predicates)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [lattice]
//! ┌─────────────────────────────────────────────────────────┐
//! │   RelationLattice (valid relations + decompositions)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [driver loop]
//! ┌─────────────────────────────────────────────────────────┐
//! │  select probe  ─►  oracle executes  ─►  interpret trace  │
//! │  [probe]           [ProbeOracle]        [trace]          │
//! │       ▲                                     │            │
//! │       │      bounds + status propagation    ▼            │
//! │       └──────────  StatusTracker  ◄─────  update         │
//! │                    [status] + DP [planner]               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │    Verdict (RelInfo per relation, verified final plan)   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! SQL parsing, SQL generation, and engine connectivity are external
//! collaborators behind [`probe::ProbeOracle`]; the crate consumes parsed
//! query metadata and structured execution traces only.

pub mod config;
pub mod driver;
pub mod error;
pub mod lattice;
pub mod planner;
pub mod probe;
pub mod query;
pub mod status;
pub mod trace;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::OptimizerSettings;
    pub use crate::driver::{Optimizer, Verdict};
    pub use crate::error::{OptimizeError, OptimizeResult};
    pub use crate::lattice::RelationLattice;
    pub use crate::planner::ProbePlan;
    pub use crate::probe::ProbeOracle;
    pub use crate::query::{PredicateInfo, QueryInfo, TableSet};
    pub use crate::status::{CostModel, RelInfo, RelStatus, StatusTracker};
    pub use crate::trace::{CardStatus, ProbeOutcome, TraceNode};
}

// Also export the core types at crate root.
pub use driver::{Optimizer, Verdict};
pub use error::{OptimizeError, OptimizeResult};
pub use query::{QueryInfo, TableSet};
pub use status::{RelInfo, RelStatus};

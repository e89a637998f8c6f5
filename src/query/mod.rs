//! Query metadata: table sets, predicates, and per-query bookkeeping.
//!
//! SQL parsing is out of scope; callers construct [`QueryInfo`] from a list
//! of table aliases and the column pairs each predicate touches. Everything
//! downstream reasons about tables through [`TableSet`] ordinals only.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, OptimizeResult};

/// A set of base tables represented as a fixed-width bit vector over table
/// ordinals. Used as a map key throughout the optimizer; equality and hashing
/// are by bit pattern.
///
/// Table counts are bounded at 64. The plan space is exponential in the table
/// count, so practical queries sit far below this.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableSet(u64);

impl TableSet {
    /// The empty set. Only appears as a transient intermediate.
    pub const EMPTY: TableSet = TableSet(0);

    /// Build a set directly from its bit pattern. Bit `i` set means table
    /// `i` is a member.
    pub fn from_bits(bits: u64) -> Self {
        TableSet(bits)
    }

    /// A set containing a single table.
    pub fn singleton(table: usize) -> Self {
        debug_assert!(table < 64);
        TableSet(1 << table)
    }

    /// The set of all tables `0..n`.
    pub fn full(n: usize) -> Self {
        debug_assert!(n <= 64);
        if n == 64 {
            TableSet(u64::MAX)
        } else {
            TableSet((1u64 << n) - 1)
        }
    }

    pub fn insert(&mut self, table: usize) {
        debug_assert!(table < 64);
        self.0 |= 1 << table;
    }

    pub fn contains(&self, table: usize) -> bool {
        table < 64 && self.0 & (1 << table) != 0
    }

    /// Number of tables in the set.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: TableSet) -> TableSet {
        TableSet(self.0 | other.0)
    }

    /// Tables in `self` but not in `other`.
    pub fn difference(self, other: TableSet) -> TableSet {
        TableSet(self.0 & !other.0)
    }

    pub fn intersects(self, other: TableSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_subset_of(self, other: TableSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Lowest-numbered table in the set, if any.
    pub fn lowest(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Iterate over member table ordinals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let bits = self.0;
        (0..64).filter(move |t| bits & (1 << t) != 0)
    }
}

impl fmt::Display for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, table) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", table)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableSet{}", self)
    }
}

/// Metadata about a single conjunct of the WHERE clause. Decides whether the
/// predicate can be evaluated on a given relation.
#[derive(Debug, Clone)]
pub struct PredicateInfo {
    /// Original SQL text, kept for diagnostics only.
    pub sql: String,
    /// Tables the predicate refers to. The lattice builder assumes unary
    /// and binary predicates.
    pub tables: TableSet,
    /// Referenced columns as (table ordinal, column name) pairs.
    pub columns: Vec<(usize, String)>,
}

impl PredicateInfo {
    /// True iff the predicate can be evaluated on `rel`, i.e. every table it
    /// references is part of the relation.
    pub fn applicable(&self, rel: TableSet) -> bool {
        self.tables.is_subset_of(rel)
    }
}

impl fmt::Display for PredicateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pred({}) referring to {}", self.sql, self.tables)
    }
}

/// Parsed metadata about one input query: its tables, alias bookkeeping,
/// and predicate list.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    table_count: usize,
    all_tables: TableSet,
    id_to_alias: HashMap<usize, String>,
    alias_to_id: HashMap<String, usize>,
    predicates: Vec<PredicateInfo>,
}

impl QueryInfo {
    /// Create query metadata for the given table aliases. Ordinals are
    /// assigned in list order.
    pub fn new<S: Into<String>>(aliases: Vec<S>) -> Self {
        let mut id_to_alias = HashMap::new();
        let mut alias_to_id = HashMap::new();
        let mut count = 0;
        for alias in aliases {
            let alias = alias.into();
            id_to_alias.insert(count, alias.clone());
            alias_to_id.insert(alias, count);
            count += 1;
        }
        QueryInfo {
            table_count: count,
            all_tables: TableSet::full(count),
            id_to_alias,
            alias_to_id,
            predicates: Vec::new(),
        }
    }

    /// Register a predicate by the columns it touches, given as
    /// (alias, column) pairs. The referenced table set is derived from the
    /// column aliases.
    pub fn add_predicate(
        &mut self,
        sql: impl Into<String>,
        columns: &[(&str, &str)],
    ) -> OptimizeResult<()> {
        let mut tables = TableSet::EMPTY;
        let mut resolved = Vec::with_capacity(columns.len());
        for (alias, column) in columns {
            let id = self
                .ordinal(alias)
                .ok_or_else(|| OptimizeError::UnknownAlias(alias.to_string()))?;
            tables.insert(id);
            resolved.push((id, column.to_string()));
        }
        self.predicates.push(PredicateInfo {
            sql: sql.into(),
            tables,
            columns: resolved,
        });
        Ok(())
    }

    pub fn table_count(&self) -> usize {
        self.table_count
    }

    /// The relation joining every table of the query.
    pub fn all_tables(&self) -> TableSet {
        self.all_tables
    }

    pub fn predicates(&self) -> &[PredicateInfo] {
        &self.predicates
    }

    pub fn alias(&self, table: usize) -> Option<&str> {
        self.id_to_alias.get(&table).map(|s| s.as_str())
    }

    pub fn ordinal(&self, alias: &str) -> Option<usize> {
        self.alias_to_id.get(alias).copied()
    }

    /// All predicates that can be evaluated on the given relation.
    pub fn applicable_predicates(&self, rel: TableSet) -> Vec<&PredicateInfo> {
        self.predicates.iter().filter(|p| p.applicable(rel)).collect()
    }

    /// Distinct columns of `table` that appear in query predicates. Probing
    /// queries project exactly these columns.
    pub fn predicate_columns(&self, table: usize) -> BTreeSet<&str> {
        self.predicates
            .iter()
            .flat_map(|p| p.columns.iter())
            .filter(|(t, _)| *t == table)
            .map(|(_, c)| c.as_str())
            .collect()
    }

    /// Table aliases of a relation, sorted, for progress reporting.
    pub fn alias_set(&self, rel: TableSet) -> Vec<&str> {
        let mut aliases: Vec<&str> = rel.iter().filter_map(|t| self.alias(t)).collect();
        aliases.sort_unstable();
        aliases
    }
}

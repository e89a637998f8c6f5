//! Relation lattice: the restricted search space of joinable table subsets.
//!
//! A relation is *valid* when every table in it is reachable from its
//! lowest-numbered table by following predicate links inside the relation.
//! This keeps Cartesian-product joins out of the plan space, mirroring what
//! a typical cost-based planner considers.
//!
//! The lattice is built once per query and is immutable afterwards. Building
//! enumerates all `2^n - 1` nonempty table subsets, so the table count must
//! stay small enough for that to be tractable.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::query::{QueryInfo, TableSet};

/// All valid relations of a query plus their decomposition links.
///
/// Decompositions use [`BTreeSet`] so iteration order is deterministic; the
/// DP planner's tie-break depends on enumeration order, and a fixed order
/// makes plans reproducible across runs.
#[derive(Debug)]
pub struct RelationLattice {
    all_rels: HashSet<TableSet>,
    rels_by_card: HashMap<usize, BTreeSet<TableSet>>,
    subsets_of: HashMap<TableSet, BTreeSet<TableSet>>,
    supersets_of: HashMap<TableSet, BTreeSet<TableSet>>,
}

impl RelationLattice {
    /// Enumerate the plan space for the given query.
    pub fn build(query: &QueryInfo) -> Self {
        let all_rels = generate_rels(query);
        let rels_by_card = group_rels(&all_rels, query.table_count());
        let (subsets_of, supersets_of) = decompose_rels(&all_rels);
        RelationLattice {
            all_rels,
            rels_by_card,
            subsets_of,
            supersets_of,
        }
    }

    pub fn contains(&self, rel: TableSet) -> bool {
        self.all_rels.contains(&rel)
    }

    pub fn len(&self) -> usize {
        self.all_rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_rels.is_empty()
    }

    /// All valid relations, in no particular order.
    pub fn all_rels(&self) -> impl Iterator<Item = TableSet> + '_ {
        self.all_rels.iter().copied()
    }

    /// Valid relations joining exactly `card` tables, in ascending bit order.
    pub fn rels_with_card(&self, card: usize) -> impl Iterator<Item = TableSet> + '_ {
        self.rels_by_card
            .get(&card)
            .into_iter()
            .flat_map(|rels| rels.iter().copied())
    }

    /// Sub-relations `S ⊆ rel` such that both `S` and `rel \ S` are valid.
    /// Each decomposition appears twice, once per half.
    pub fn subsets_of(&self, rel: TableSet) -> impl Iterator<Item = TableSet> + '_ {
        self.subsets_of
            .get(&rel)
            .into_iter()
            .flat_map(|rels| rels.iter().copied())
    }

    /// Valid relations that `rel` can contribute to as one half of a
    /// decomposition.
    pub fn supersets_of(&self, rel: TableSet) -> impl Iterator<Item = TableSet> + '_ {
        self.supersets_of
            .get(&rel)
            .into_iter()
            .flat_map(|rels| rels.iter().copied())
    }
}

/// True iff the relation avoids Cartesian products: a reachability closure
/// seeded from the lowest-numbered table, repeatedly unioning in any
/// applicable predicate's tables that intersect the reachable set, must
/// cover the relation exactly.
pub fn is_valid(rel: TableSet, query: &QueryInfo) -> bool {
    let first = match rel.lowest() {
        Some(t) => t,
        None => return false,
    };
    let mut reachable = TableSet::singleton(first);
    let mut updated = true;
    while updated {
        updated = false;
        for pred in query.predicates() {
            if pred.applicable(rel) && pred.tables.intersects(reachable) {
                let widened = reachable.union(pred.tables);
                if widened != reachable {
                    reachable = widened;
                    updated = true;
                }
            }
        }
    }
    reachable == rel
}

fn generate_rels(query: &QueryInfo) -> HashSet<TableSet> {
    let n = query.table_count();
    let mut rels = HashSet::new();
    for bits in 1u64..(1u64 << n) {
        let rel = TableSet::from_bits(bits);
        if is_valid(rel, query) {
            rels.insert(rel);
        }
    }
    rels
}

fn group_rels(all_rels: &HashSet<TableSet>, table_count: usize) -> HashMap<usize, BTreeSet<TableSet>> {
    let mut by_card: HashMap<usize, BTreeSet<TableSet>> = HashMap::new();
    for k in 1..=table_count {
        by_card.insert(k, BTreeSet::new());
    }
    for rel in all_rels {
        by_card.entry(rel.len()).or_default().insert(*rel);
    }
    by_card
}

/// Record, for every valid relation, its binary decompositions into two
/// valid halves. `subsets_of[rel]` holds each half `S`; `supersets_of` links
/// both `S` and `rel \ S` back to `rel`.
#[allow(clippy::type_complexity)]
fn decompose_rels(
    all_rels: &HashSet<TableSet>,
) -> (
    HashMap<TableSet, BTreeSet<TableSet>>,
    HashMap<TableSet, BTreeSet<TableSet>>,
) {
    let mut subsets_of: HashMap<TableSet, BTreeSet<TableSet>> = HashMap::new();
    let mut supersets_of: HashMap<TableSet, BTreeSet<TableSet>> = HashMap::new();
    for rel in all_rels {
        subsets_of.insert(*rel, BTreeSet::new());
        supersets_of.insert(*rel, BTreeSet::new());
    }
    for rel in all_rels {
        for sub in all_rels {
            if sub.is_subset_of(*rel) {
                let complement = rel.difference(*sub);
                if all_rels.contains(&complement) {
                    subsets_of.get_mut(rel).expect("initialized above").insert(*sub);
                    supersets_of.get_mut(sub).expect("initialized above").insert(*rel);
                    supersets_of
                        .get_mut(&complement)
                        .expect("initialized above")
                        .insert(*rel);
                }
            }
        }
    }
    (subsets_of, supersets_of)
}

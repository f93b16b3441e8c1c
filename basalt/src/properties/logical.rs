use std::fmt::{Display, Formatter};

use crate::catalog::TableId;
use crate::column::{remap_col_set, ColRef, ColRefMap, ColRefSet, ColumnFactory};
use crate::constraint::ConstraintProperty;

/// Upper bound on the number of rows, `None` when unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MaxCard(Option<u64>);

impl MaxCard {
    pub fn unbounded() -> Self {
        Self(None)
    }

    pub fn new(rows: u64) -> Self {
        Self(Some(rows))
    }

    pub fn value(&self) -> Option<u64> {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Some(0)
    }

    /// Bound of the concatenation of both relations.
    pub fn plus(self, other: MaxCard) -> MaxCard {
        match (self.0, other.0) {
            (Some(l), Some(r)) => MaxCard(Some(l.saturating_add(r))),
            _ => MaxCard(None),
        }
    }

    /// Bound of the cross product of both relations.
    pub fn times(self, other: MaxCard) -> MaxCard {
        match (self.0, other.0) {
            (Some(0), _) | (_, Some(0)) => MaxCard(Some(0)),
            (Some(l), Some(r)) => MaxCard(Some(l.saturating_mul(r))),
            _ => MaxCard(None),
        }
    }

    pub fn min(self, other: MaxCard) -> MaxCard {
        match (self.0, other.0) {
            (Some(l), Some(r)) => MaxCard(Some(l.min(r))),
            (Some(v), None) | (None, Some(v)) => MaxCard(Some(v)),
            (None, None) => MaxCard(None),
        }
    }
}

impl Display for MaxCard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "unbounded"),
        }
    }
}

/// Candidate keys of a relation. Empty when no key is known.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct KeyCollection(Vec<ColRefSet>);

impl KeyCollection {
    pub fn new(keys: Vec<ColRefSet>) -> Self {
        let mut ret = Self(vec![]);
        for k in keys {
            ret.add(k);
        }
        ret
    }

    pub fn none() -> Self {
        Self(vec![])
    }

    /// Adds a key unless a subset of it is already known.
    pub fn add(&mut self, key: ColRefSet) {
        if key.is_empty() || self.0.iter().any(|k| k.is_subset(&key)) {
            return;
        }
        self.0.retain(|k| !key.is_subset(k));
        self.0.push(key);
    }

    pub fn keys(&self) -> &[ColRefSet] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `cols` contain a key, meaning rows are unique on `cols`.
    pub fn is_unique_on(&self, cols: &ColRefSet) -> bool {
        self.0.iter().any(|k| k.is_subset(cols))
    }

    /// Keys made of `cols` only.
    pub fn restricted_to(&self, cols: &ColRefSet) -> KeyCollection {
        Self(self.0.iter().filter(|k| k.is_subset(cols)).cloned().collect())
    }

    pub fn remapped(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> KeyCollection {
        Self(
            self.0
                .iter()
                .map(|k| remap_col_set(k, mapping, must_exist, factory))
                .collect(),
        )
    }
}

/// A partitioned table scan reachable below an operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartInfoEntry {
    pub scan_id: u32,
    pub table_id: TableId,
    pub part_keys: Vec<ColRef>,
}

/// Partitioned table consumers below an operator.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PartInfo(Vec<PartInfoEntry>);

impl PartInfo {
    pub fn new(entries: Vec<PartInfoEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[PartInfoEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_scan(&self, scan_id: u32) -> bool {
        self.0.iter().any(|e| e.scan_id == scan_id)
    }

    /// Entries of both, each scan id once.
    pub fn combine(&self, other: &PartInfo) -> PartInfo {
        let mut ret = self.clone();
        for e in &other.0 {
            if !ret.contains_scan(e.scan_id) {
                ret.0.push(e.clone());
            }
        }
        ret
    }
}

/// Derived relational properties shared by every expression of a memo group.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct LogicalProperty {
    output_cols: ColRefSet,
    outer_refs: ColRefSet,
    keys: KeyCollection,
    part_info: PartInfo,
    max_card: MaxCard,
    constraint: ConstraintProperty,
}

impl LogicalProperty {
    pub fn new(
        output_cols: ColRefSet,
        outer_refs: ColRefSet,
        keys: KeyCollection,
        part_info: PartInfo,
        max_card: MaxCard,
        constraint: ConstraintProperty,
    ) -> Self {
        Self {
            output_cols,
            outer_refs,
            keys,
            part_info,
            max_card,
            constraint,
        }
    }

    pub fn output_cols(&self) -> &ColRefSet {
        &self.output_cols
    }

    pub fn outer_refs(&self) -> &ColRefSet {
        &self.outer_refs
    }

    pub fn keys(&self) -> &KeyCollection {
        &self.keys
    }

    pub fn part_info(&self) -> &PartInfo {
        &self.part_info
    }

    pub fn max_card(&self) -> MaxCard {
        self.max_card
    }

    pub fn constraint(&self) -> &ConstraintProperty {
        &self.constraint
    }
}

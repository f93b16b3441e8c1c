//! Statistics of relations and the processors deriving them.
mod histogram;
pub use histogram::*;
pub mod derive;

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use crate::column::{ColId, ColRef, ColRefMap, ColRefSet};

/// Smallest row estimate of a relation that is not provably empty.
pub const MIN_ROWS: f64 = 1.0;
/// Selectivity of predicates without usable statistics.
pub const DEFAULT_SELECTIVITY: f64 = 0.4;
/// Row count assumed for tables without statistics.
pub const DEFAULT_ROWS: f64 = 1000.0;

/// Upper bound on the number of distinct values of a column set.
#[derive(Clone, PartialEq, Debug)]
pub struct UpperBoundNdvs {
    cols: ColRefSet,
    upper_bound: f64,
}

impl UpperBoundNdvs {
    pub fn new(cols: ColRefSet, upper_bound: f64) -> Self {
        Self { cols, upper_bound }
    }

    pub fn cols(&self) -> &ColRefSet {
        &self.cols
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Bound after the relation shrinks to `rows` rows.
    pub fn capped(&self, rows: f64) -> Self {
        Self {
            cols: self.cols.clone(),
            upper_bound: self.upper_bound.min(rows),
        }
    }

    /// Keeps the columns in `cols`, `None` when nothing is left.
    fn restricted_to(&self, cols: &ColRefSet) -> Option<Self> {
        let kept = self.cols.intersection(cols);
        if kept.is_empty() {
            None
        } else {
            Some(Self::new(kept, self.upper_bound))
        }
    }

    fn remapped(&self, mapping: &ColRefMap) -> Option<Self> {
        let mut cols = ColRefSet::new();
        for c in self.cols.iter() {
            cols.insert(mapping.get(c)?.clone());
        }
        Some(Self::new(cols, self.upper_bound))
    }
}

/// Derived statistics of a relation.
///
/// Created once by a processor in [`derive`] and never mutated after being cached in a group.
#[derive(Clone, PartialEq)]
pub struct Statistics {
    rows: f64,
    histograms: BTreeMap<ColId, Histogram>,
    widths: BTreeMap<ColId, f64>,
    empty: bool,
    upper_bound_ndvs: Vec<UpperBoundNdvs>,
}

impl Statistics {
    pub fn new(
        rows: f64,
        histograms: BTreeMap<ColId, Histogram>,
        widths: BTreeMap<ColId, f64>,
    ) -> Self {
        Self {
            rows: rows.max(MIN_ROWS),
            histograms,
            widths,
            empty: false,
            upper_bound_ndvs: vec![],
        }
    }

    /// Statistics of a provably empty relation producing `cols`.
    pub fn empty<'a, I: IntoIterator<Item = &'a ColRef>>(cols: I) -> Self {
        let mut histograms = BTreeMap::new();
        let mut widths = BTreeMap::new();
        for c in cols {
            histograms.insert(c.id(), Histogram::new(vec![], 0.0, 0.0, 0.0));
            widths.insert(c.id(), c.width());
        }
        Self {
            rows: MIN_ROWS,
            histograms,
            widths,
            empty: true,
            upper_bound_ndvs: vec![],
        }
    }

    pub fn with_upper_bound_ndvs(mut self, upper_bound_ndvs: Vec<UpperBoundNdvs>) -> Self {
        self.upper_bound_ndvs = upper_bound_ndvs;
        self
    }

    pub fn rows(&self) -> f64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn histogram(&self, col: ColId) -> Option<&Histogram> {
        self.histograms.get(&col)
    }

    pub fn histograms(&self) -> &BTreeMap<ColId, Histogram> {
        &self.histograms
    }

    pub fn width(&self, col: ColId) -> Option<f64> {
        self.widths.get(&col).copied()
    }

    pub fn widths(&self) -> &BTreeMap<ColId, f64> {
        &self.widths
    }

    /// Bytes per row.
    pub fn row_width(&self) -> f64 {
        self.widths.values().sum()
    }

    pub fn upper_bound_ndvs(&self) -> &[UpperBoundNdvs] {
        &self.upper_bound_ndvs
    }

    /// Upper bound on the distinct values of `col` recorded for any column set containing it.
    pub fn upper_bound_ndv(&self, col: &ColRef) -> Option<f64> {
        self.upper_bound_ndvs
            .iter()
            .filter(|u| u.cols.contains(col))
            .map(|u| u.upper_bound)
            .reduce(f64::min)
    }

    /// Best known estimate of the distinct values of `col`.
    pub fn ndv(&self, col: &ColRef) -> Option<f64> {
        let from_hist = self
            .histograms
            .get(&col.id())
            .filter(|h| h.is_well_defined() && !h.is_col_stats_missing())
            .map(|h| h.ndv());
        let bound = self.upper_bound_ndv(col);
        match (from_hist, bound) {
            (Some(h), Some(b)) => Some(h.min(b)),
            (Some(h), None) => Some(h.min(self.rows)),
            (None, b) => b,
        }
    }

    /// Upper bound records capped to `rows`, as after an operator that may only drop rows.
    pub(crate) fn capped_upper_bound_ndvs(&self, rows: f64) -> Vec<UpperBoundNdvs> {
        self.upper_bound_ndvs.iter().map(|u| u.capped(rows)).collect()
    }

    /// Keeps the histograms and bounds of `cols`.
    pub fn restricted_to(&self, cols: &ColRefSet) -> Statistics {
        Statistics {
            rows: self.rows,
            histograms: self
                .histograms
                .iter()
                .filter(|(id, _)| cols.contains_id(**id))
                .map(|(id, h)| (*id, h.clone()))
                .collect(),
            widths: self
                .widths
                .iter()
                .filter(|(id, _)| cols.contains_id(**id))
                .map(|(id, w)| (*id, *w))
                .collect(),
            empty: self.empty,
            upper_bound_ndvs: self
                .upper_bound_ndvs
                .iter()
                .filter_map(|u| u.restricted_to(cols))
                .collect(),
        }
    }

    /// Renames the columns `from[i]` to `to[i]`, dropping everything else.
    pub fn remapped(&self, from: &[ColRef], to: &[ColRef]) -> Statistics {
        let mapping = ColRefMap::from_pairs(from, to);
        let mut histograms = BTreeMap::new();
        let mut widths = BTreeMap::new();
        for (src, dst) in from.iter().zip(to.iter()) {
            if let Some(h) = self.histograms.get(&src.id()) {
                histograms.insert(dst.id(), h.clone());
            }
            widths.insert(
                dst.id(),
                self.widths.get(&src.id()).copied().unwrap_or_else(|| dst.width()),
            );
        }
        Statistics {
            rows: self.rows,
            histograms,
            widths,
            empty: self.empty,
            upper_bound_ndvs: self
                .upper_bound_ndvs
                .iter()
                .filter_map(|u| u.remapped(&mapping))
                .collect(),
        }
    }
}

impl Debug for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statistics")
            .field("rows", &self.rows)
            .field("empty", &self.empty)
            .field("histograms", &self.histograms)
            .field("upper_bound_ndvs", &self.upper_bound_ndvs)
            .finish()
    }
}

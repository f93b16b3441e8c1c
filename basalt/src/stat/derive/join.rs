use log::trace;

use crate::column::{ColRef, ColRefSet};
use crate::operator::JoinType;
use crate::optimizer::OptimizerConfig;
use crate::scalar::ScalarExpr;
use crate::stat::derive::combine_selectivities;
use crate::stat::{Histogram, Statistics, DEFAULT_SELECTIVITY, MIN_ROWS};

/// Join predicate split into column equalities across the inputs and everything else.
#[derive(Clone, Debug, Default)]
pub struct JoinPredicateInfo {
    equi: Vec<(ColRef, ColRef)>,
    others: usize,
}

impl JoinPredicateInfo {
    pub fn new(pred: &ScalarExpr, left_cols: &ColRefSet, right_cols: &ColRefSet) -> Self {
        let mut ret = Self::default();
        for conjunct in pred.conjuncts() {
            if conjunct.is_constant_true() {
                continue;
            }
            match conjunct.as_column_equality() {
                Some((l, r)) if left_cols.contains(l) && right_cols.contains(r) => {
                    ret.equi.push((l.clone(), r.clone()))
                }
                Some((l, r)) if left_cols.contains(r) && right_cols.contains(l) => {
                    ret.equi.push((r.clone(), l.clone()))
                }
                _ => ret.others += 1,
            }
        }
        ret
    }

    /// Equalities between columns at the same position, as set operations compare rows.
    pub fn from_pairs(left: &[ColRef], right: &[ColRef]) -> Self {
        Self {
            equi: left.iter().cloned().zip(right.iter().cloned()).collect(),
            others: 0,
        }
    }

    pub fn equi(&self) -> &[(ColRef, ColRef)] {
        &self.equi
    }

    pub fn is_cross_product(&self) -> bool {
        self.equi.is_empty() && self.others == 0
    }
}

fn equi_selectivity(
    left: &Statistics,
    right: &Statistics,
    l: &ColRef,
    r: &ColRef,
) -> (f64, Option<Histogram>) {
    if let (Some(hl), Some(hr)) = (left.histogram(l.id()), right.histogram(r.id())) {
        if let Some((hist, selectivity)) = hl.join_equality(hr) {
            return (selectivity, Some(hist));
        }
    }

    let ndv_l = left.ndv(l).unwrap_or(left.rows);
    let ndv_r = right.ndv(r).unwrap_or(right.rows);
    (1.0 / ndv_l.max(ndv_r).max(1.0), None)
}

fn merged(left: &Statistics, right: &Statistics, rows: f64) -> Statistics {
    let mut histograms = left.histograms.clone();
    histograms.extend(right.histograms.iter().map(|(k, v)| (*k, v.clone())));
    let mut widths = left.widths.clone();
    widths.extend(right.widths.iter().map(|(k, v)| (*k, *v)));

    let mut upper_bound_ndvs = left.capped_upper_bound_ndvs(rows);
    upper_bound_ndvs.extend(right.capped_upper_bound_ndvs(rows));

    Statistics {
        rows: rows.max(MIN_ROWS),
        histograms,
        widths,
        empty: left.empty || right.empty,
        upper_bound_ndvs,
    }
}

fn mark_empty(mut stats: Statistics) -> Statistics {
    for h in stats.histograms.values_mut() {
        *h = Histogram::new(vec![], 0.0, 0.0, 0.0);
    }
    stats.rows = MIN_ROWS;
    stats.empty = true;
    stats.upper_bound_ndvs = stats.capped_upper_bound_ndvs(0.0);
    stats
}

pub fn inner_join(
    left: &Statistics,
    right: &Statistics,
    preds: &JoinPredicateInfo,
    config: &OptimizerConfig,
) -> Statistics {
    if left.empty || right.empty {
        return mark_empty(merged(left, right, MIN_ROWS));
    }

    let mut selectivities = Vec::with_capacity(preds.equi.len() + preds.others);
    let mut join_histograms = Vec::new();
    for (l, r) in &preds.equi {
        let (selectivity, hist) = equi_selectivity(left, right, l, r);
        selectivities.push(selectivity);
        if let Some(h) = hist {
            join_histograms.push((l.id(), h.clone()));
            join_histograms.push((r.id(), h));
        }
    }
    selectivities.extend(std::iter::repeat(DEFAULT_SELECTIVITY).take(preds.others));

    let selectivity = combine_selectivities(selectivities, config.join_damping);
    let rows = (left.rows * right.rows * selectivity).max(MIN_ROWS);
    trace!("inner join: {} x {} -> {} rows", left.rows, right.rows, rows);

    let mut ret = merged(left, right, rows);
    ret.histograms.extend(join_histograms);
    ret
}

/// Rows of `left` having at least one match in `right`.
pub fn left_semi_join(
    left: &Statistics,
    right: &Statistics,
    preds: &JoinPredicateInfo,
    config: &OptimizerConfig,
) -> Statistics {
    if left.empty || right.empty {
        return mark_empty(left.clone());
    }

    let rows = if preds.is_cross_product() {
        left.rows
    } else {
        // Matching against one row per distinct right key bounds duplicates from the right
        let mut distinct_right = right.clone();
        if !preds.equi.is_empty() {
            let keys = preds
                .equi
                .iter()
                .map(|(_, r)| right.ndv(r).unwrap_or(right.rows))
                .collect();
            distinct_right.rows = super::combine_ndvs(keys, config.join_damping)
                .min(right.rows)
                .max(MIN_ROWS);
        }
        inner_join(left, &distinct_right, preds, config)
            .rows
            .min(left.rows)
    };
    trace!("left semi join: {} -> {} rows", left.rows, rows);

    Statistics {
        rows: rows.max(MIN_ROWS),
        histograms: left.histograms.clone(),
        widths: left.widths.clone(),
        empty: false,
        upper_bound_ndvs: left.capped_upper_bound_ndvs(rows),
    }
}

/// Rows of `left` without a match in `right`.
///
/// With `skip_histograms` the outer histograms are carried over as they are instead of removing
/// the matched values.
pub fn left_anti_semi_join(
    left: &Statistics,
    right: &Statistics,
    preds: &JoinPredicateInfo,
    not_in: bool,
    skip_histograms: bool,
    config: &OptimizerConfig,
) -> Statistics {
    if left.empty {
        return left.clone();
    }
    if right.empty {
        return left.clone();
    }

    // NOT IN over a set holding null is never true
    let right_has_nulls = not_in
        && preds.equi.iter().any(|(_, r)| {
            right
                .histogram(r.id())
                .map(|h| h.is_well_defined() && h.null_freq() > 0.0)
                .unwrap_or(false)
        });

    let rows = if right_has_nulls {
        MIN_ROWS
    } else {
        let semi = left_semi_join(left, right, preds, config);
        (left.rows - semi.rows).max(MIN_ROWS)
    };
    trace!("left anti semi join: {} -> {} rows", left.rows, rows);

    let mut histograms = left.histograms.clone();
    if !(skip_histograms || config.skip_lasj_histograms) {
        for (l, r) in &preds.equi {
            if let (Some(hl), Some(hr)) = (left.histogram(l.id()), right.histogram(r.id())) {
                histograms.insert(l.id(), hl.anti_join(hr));
            }
        }
    }

    Statistics {
        rows,
        histograms,
        widths: left.widths.clone(),
        empty: false,
        upper_bound_ndvs: left.capped_upper_bound_ndvs(rows),
    }
}

/// Inner join rows plus the unmatched outer rows padded with nulls.
pub fn left_outer_join(
    left: &Statistics,
    right: &Statistics,
    preds: &JoinPredicateInfo,
    config: &OptimizerConfig,
) -> Statistics {
    if left.empty {
        return mark_empty(merged(left, right, MIN_ROWS));
    }

    let inner = inner_join(left, right, preds, config);
    let anti = left_anti_semi_join(left, right, preds, false, false, config);
    let (inner_rows, anti_rows) = if right.empty {
        (0.0, left.rows)
    } else {
        (inner.rows, anti.rows)
    };
    let rows = (inner_rows + anti_rows).max(left.rows);
    trace!(
        "left outer join: inner {} + unmatched {} -> {} rows",
        inner_rows,
        anti_rows,
        rows
    );

    let mut ret = merged(left, right, rows);
    ret.empty = false;
    for id in left.histograms.keys() {
        let hist = match (inner.histogram(*id), anti.histogram(*id)) {
            (Some(i), Some(a)) if inner_rows > 0.0 => i.union_all(inner_rows, a, anti_rows),
            (_, Some(a)) => a.clone(),
            (Some(i), None) => i.clone(),
            (None, None) => continue,
        };
        ret.histograms.insert(*id, hist);
    }

    let null_fraction = anti_rows / rows;
    for id in right.histograms.keys() {
        let hist = if right.empty {
            Histogram::null_only()
        } else {
            match inner.histogram(*id) {
                Some(h) => h.with_null_padding(null_fraction),
                None => continue,
            }
        };
        ret.histograms.insert(*id, hist);
    }

    ret
}

/// Dispatches on the join semantics.
pub fn join(
    join_type: JoinType,
    left: &Statistics,
    right: &Statistics,
    preds: &JoinPredicateInfo,
    config: &OptimizerConfig,
) -> Statistics {
    match join_type {
        JoinType::Inner => inner_join(left, right, preds, config),
        JoinType::LeftOuter => left_outer_join(left, right, preds, config),
        JoinType::LeftSemi => left_semi_join(left, right, preds, config),
        JoinType::LeftAntiSemi => {
            left_anti_semi_join(left, right, preds, false, false, config)
        }
        JoinType::LeftAntiSemiNotIn => {
            left_anti_semi_join(left, right, preds, true, false, config)
        }
    }
}

use std::collections::BTreeMap;

use log::trace;

use crate::column::{ColRef, ColRefSet};
use crate::optimizer::OptimizerConfig;
use crate::stat::derive::combine_ndvs;
use crate::stat::{Histogram, Statistics, UpperBoundNdvs, DEFAULT_SELECTIVITY, MIN_ROWS};

/// Statistics of grouping `input` by `group_cols`, producing `agg_cols` besides the keys.
pub fn group_by(
    input: &Statistics,
    group_cols: &[ColRef],
    agg_cols: &[ColRef],
    config: &OptimizerConfig,
) -> Statistics {
    let all_cols = group_cols.iter().chain(agg_cols.iter());
    if input.is_empty() {
        // Scalar aggregates still produce one row
        if !group_cols.is_empty() {
            return Statistics::empty(all_cols);
        }
    }

    let rows = if group_cols.is_empty() {
        MIN_ROWS
    } else {
        let group_set: ColRefSet = group_cols.iter().collect();
        let ndvs = group_cols
            .iter()
            .map(|c| {
                input
                    .ndv(c)
                    .unwrap_or_else(|| (input.rows * DEFAULT_SELECTIVITY).max(MIN_ROWS))
            })
            .collect();
        let mut rows = combine_ndvs(ndvs, config.join_damping).min(input.rows);

        // A bound recorded over a subset of the keys bounds the groups only when it covers them all
        for bound in input.upper_bound_ndvs() {
            if group_set.is_subset(bound.cols()) && bound.cols().len() == group_set.len() {
                rows = rows.min(bound.upper_bound());
            }
        }
        rows.max(MIN_ROWS)
    };
    trace!("group by: {} -> {} rows", input.rows, rows);

    let mut histograms = BTreeMap::new();
    let mut widths = BTreeMap::new();
    for c in group_cols {
        if let Some(h) = input.histogram(c.id()) {
            histograms.insert(c.id(), h.grouped());
        }
        widths.insert(
            c.id(),
            input.width(c.id()).unwrap_or_else(|| c.width()),
        );
    }
    for c in agg_cols {
        let hist = if c.is_boolean() {
            Histogram::default_bool_histogram()
        } else {
            Histogram::default_histogram()
        };
        histograms.insert(c.id(), hist);
        widths.insert(c.id(), c.width());
    }

    let mut upper_bound_ndvs: Vec<UpperBoundNdvs> = input
        .capped_upper_bound_ndvs(rows)
        .into_iter()
        .filter(|u| u.cols().iter().all(|c| group_cols.contains(c)))
        .collect();
    if !group_cols.is_empty() {
        upper_bound_ndvs.push(UpperBoundNdvs::new(group_cols.iter().collect(), rows));
    }

    Statistics {
        rows,
        histograms,
        widths,
        empty: false,
        upper_bound_ndvs,
    }
}

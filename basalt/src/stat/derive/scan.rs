use std::collections::BTreeMap;

use log::trace;

use crate::catalog::{table_stats_if_exists, MetadataAccessor, TableDesc};
use crate::column::{ColRef, ColumnKind};
use crate::datum::Datum;
use crate::error::OptResult;
use crate::optimizer::OptimizerConfig;
use crate::stat::{Histogram, Statistics, UpperBoundNdvs};

fn default_histogram_of(col: &ColRef) -> Histogram {
    if col.is_boolean() {
        Histogram::default_bool_histogram()
    } else {
        Histogram::default_histogram()
    }
}

fn position(col: &ColRef, idx: usize) -> usize {
    match col.kind() {
        ColumnKind::Table { attno, .. } if *attno >= 0 => *attno as usize,
        _ => idx,
    }
}

/// Statistics of scanning `table` into `cols`.
///
/// Tables without statistics in the catalog get the configured default row count.
pub fn table_scan(
    table: &TableDesc,
    cols: &[ColRef],
    md: &dyn MetadataAccessor,
    config: &OptimizerConfig,
) -> OptResult<Statistics> {
    let table_stats = table_stats_if_exists(md, table.id())?;
    let rows = table_stats
        .as_ref()
        .map(|s| s.rows)
        .unwrap_or(config.default_rows);
    trace!("scan {}: {} rows", table.name(), rows);

    let mut histograms = BTreeMap::new();
    let mut widths = BTreeMap::new();
    for (idx, col) in cols.iter().enumerate() {
        let hist = table_stats
            .as_ref()
            .and_then(|s| s.histograms.get(&position(col, idx)))
            .cloned()
            .unwrap_or_else(|| default_histogram_of(col));
        histograms.insert(col.id(), hist);
        widths.insert(col.id(), col.width());
    }

    Ok(Statistics::new(rows, histograms, widths))
}

/// Statistics of literal rows. `rows[i][j]` is the value of `cols[j]` in row `i`.
pub fn const_table(cols: &[ColRef], rows: &[Vec<Datum>]) -> Statistics {
    if rows.is_empty() {
        return Statistics::empty(cols);
    }

    let mut histograms = BTreeMap::new();
    let mut widths = BTreeMap::new();
    for (idx, col) in cols.iter().enumerate() {
        let hist = Histogram::from_values(rows.iter().filter_map(|r| r.get(idx)));
        histograms.insert(col.id(), hist);
        widths.insert(col.id(), col.width());
    }

    let count = rows.len() as f64;
    let bounds = cols
        .iter()
        .map(|c| UpperBoundNdvs::new(vec![c.clone()].into_iter().collect(), count))
        .collect();
    Statistics::new(count, histograms, widths).with_upper_bound_ndvs(bounds)
}

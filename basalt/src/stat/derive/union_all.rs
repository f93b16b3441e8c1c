use std::collections::BTreeMap;

use log::trace;

use crate::column::ColRef;
use crate::stat::{Histogram, Statistics, UpperBoundNdvs, MIN_ROWS};

/// Statistics of `UNION ALL` of two inputs, each mapped position-wise to `output_cols`.
pub fn union_all(
    first: &Statistics,
    first_cols: &[ColRef],
    second: &Statistics,
    second_cols: &[ColRef],
    output_cols: &[ColRef],
) -> Statistics {
    match (first.is_empty(), second.is_empty()) {
        (true, true) => return Statistics::empty(output_cols),
        (false, true) => return first.remapped(first_cols, output_cols),
        (true, false) => return second.remapped(second_cols, output_cols),
        (false, false) => {}
    }

    let rows = first.rows + second.rows;
    trace!("union all: {} + {} -> {} rows", first.rows, second.rows, rows);

    let mut histograms = BTreeMap::new();
    let mut widths = BTreeMap::new();
    for ((out, l), r) in output_cols.iter().zip(first_cols).zip(second_cols) {
        let hist = match (first.histogram(l.id()), second.histogram(r.id())) {
            (Some(hl), Some(hr)) => hl.union_all(first.rows, hr, second.rows),
            (Some(h), None) | (None, Some(h)) => h.clone(),
            (None, None) => Histogram::default_histogram(),
        };
        histograms.insert(out.id(), hist);

        let width = first
            .width(l.id())
            .or_else(|| second.width(r.id()))
            .unwrap_or_else(|| out.width());
        widths.insert(out.id(), width);
    }

    // A column is bounded by what both sides contribute, but only recorded when a side knew
    // more than its row count
    let mut upper_bound_ndvs = Vec::new();
    for ((out, l), r) in output_cols.iter().zip(first_cols).zip(second_cols) {
        let (lb, rb) = (first.upper_bound_ndv(l), second.upper_bound_ndv(r));
        if lb.is_none() && rb.is_none() {
            continue;
        }
        let bound = lb.unwrap_or(first.rows) + rb.unwrap_or(second.rows);
        upper_bound_ndvs.push(UpperBoundNdvs::new(
            std::iter::once(out).collect(),
            bound.min(rows),
        ));
    }

    Statistics {
        rows: rows.max(MIN_ROWS),
        histograms,
        widths,
        empty: false,
        upper_bound_ndvs,
    }
}

/// Folds [`union_all`] over any number of inputs.
pub fn union_all_n(
    inputs: &[&Statistics],
    input_cols: &[Vec<ColRef>],
    output_cols: &[ColRef],
) -> Statistics {
    let mut iter = inputs.iter().zip(input_cols);
    let mut acc = match iter.next() {
        Some((stats, cols)) => stats.remapped(cols, output_cols),
        None => return Statistics::empty(output_cols),
    };
    for (stats, cols) in iter {
        acc = union_all(&acc, output_cols, stats, cols, output_cols);
    }
    acc
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use maplit::btreemap;

    use crate::column::ColumnFactory;
    use crate::stat::derive::{union_all, union_all_n};
    use crate::stat::{Histogram, Statistics, UpperBoundNdvs, MIN_ROWS};

    #[test]
    fn test_union_all_rows() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let out = factory.create(DataType::Int32, "out");

        let values: Vec<ScalarValue> = (0..3).map(|v| ScalarValue::Int32(Some(v))).collect();
        let first = Statistics::new(
            30.0,
            btreemap! { a.id() => Histogram::from_values(&values) },
            BTreeMap::new(),
        );
        let second = Statistics::new(12.0, BTreeMap::new(), BTreeMap::new());

        {
            // Non empty inputs add up
            let ret = union_all(&first, &[a.clone()], &second, &[b.clone()], &[out.clone()]);
            assert_eq!(42.0, ret.rows());
            assert!(!ret.is_empty());
            assert!(ret.histogram(out.id()).is_some());
        }

        {
            // Neither side has a histogram
            let ret = union_all(&second, &[b.clone()], &second, &[b.clone()], &[out.clone()]);
            assert_eq!(24.0, ret.rows());
            assert!(!ret.histogram(out.id()).unwrap().is_well_defined());
        }

        {
            let e1 = Statistics::empty(vec![&a]);
            let e2 = Statistics::empty(vec![&b]);
            let ret = union_all(&e1, &[a.clone()], &e2, &[b.clone()], &[out.clone()]);
            assert!(ret.is_empty());
            assert_eq!(MIN_ROWS, ret.rows());
        }

        {
            let ret = union_all_n(
                &[&first, &second, &second],
                &[vec![a.clone()], vec![b.clone()], vec![b.clone()]],
                &[out.clone()],
            );
            assert_eq!(54.0, ret.rows());
        }
    }

    #[test]
    fn test_union_all_widens_upper_bounds() {
        let factory = ColumnFactory::new();
        let x = factory.create(DataType::Int32, "x");
        let b = factory.create(DataType::Int32, "b");
        let out = factory.create(DataType::Int32, "out");

        let first = Statistics::new(3.0, BTreeMap::new(), BTreeMap::new())
            .with_upper_bound_ndvs(vec![UpperBoundNdvs::new(
                std::iter::once(&x).collect(),
                3.0,
            )]);
        let values: Vec<ScalarValue> = (0..100).map(|v| ScalarValue::Int32(Some(v))).collect();
        let second = Statistics::new(
            100.0,
            btreemap! { b.id() => Histogram::from_values(&values) },
            BTreeMap::new(),
        );

        let ret = union_all(&first, &[x.clone()], &second, &[b.clone()], &[out.clone()]);
        assert_eq!(103.0, ret.rows());
        assert_eq!(Some(103.0), ret.upper_bound_ndv(&out));
        assert!(ret.ndv(&out).unwrap() >= 100.0);

        // Without bounds on either side nothing is recorded
        let ret = union_all(&second, &[b.clone()], &second, &[b.clone()], &[out.clone()]);
        assert!(ret.upper_bound_ndvs().is_empty());
    }
}

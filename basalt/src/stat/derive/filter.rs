use std::collections::BTreeMap;

use log::trace;

use crate::catalog::MetadataAccessor;
use crate::column::ColRef;
use crate::constraint::{constraint_from_scalar, Constraint, ConstraintProperty};
use crate::error::OptResult;
use crate::optimizer::OptimizerConfig;
use crate::scalar::ScalarExpr;
use crate::stat::derive::combine_selectivities;
use crate::stat::{Histogram, Statistics, DEFAULT_SELECTIVITY, MIN_ROWS};

/// Statistics after filtering `input` by `pred`.
///
/// Conjuncts restricting a single column are applied to its histogram. `col = col` uses the
/// larger distinct count of both sides, anything else the default selectivity.
pub fn filter(
    input: &Statistics,
    pred: &ScalarExpr,
    md: &dyn MetadataAccessor,
    config: &OptimizerConfig,
) -> OptResult<Statistics> {
    if input.is_empty() {
        return Ok(input.clone());
    }
    if pred.is_constant_false() || ConstraintProperty::from_predicate(pred, md)?.is_contradiction() {
        trace!("filter: contradiction");
        return Ok(empty_like(input));
    }

    let mut ret = input.clone();
    let mut selectivities = Vec::new();
    for conjunct in pred.conjuncts() {
        if conjunct.is_constant_true() {
            continue;
        }

        if let Some((l, r)) = conjunct.as_column_equality() {
            let ndv = ndv_or_default(l, input)
                .max(ndv_or_default(r, input))
                .max(1.0);
            selectivities.push(1.0 / ndv);
            continue;
        }

        let interval = constraint_from_scalar(conjunct, md)?.and_then(|c| match c.as_ref() {
            Constraint::Interval(i) => Some(i.clone()),
            _ => None,
        });
        let hist = interval
            .as_ref()
            .and_then(|i| ret.histogram(i.column().id()).map(|h| (i, h)));
        match hist {
            Some((i, h)) if h.is_well_defined() => {
                let (filtered, selectivity) = h.filter(i.ranges(), i.include_null());
                ret.histograms.insert(i.column().id(), filtered);
                selectivities.push(selectivity);
            }
            _ => selectivities.push(DEFAULT_SELECTIVITY),
        }
    }

    let selectivity = combine_selectivities(selectivities, config.join_damping);
    let rows = (input.rows * selectivity).max(MIN_ROWS);
    trace!("filter: {} -> {} rows", input.rows, rows);

    ret.rows = rows;
    ret.upper_bound_ndvs = input.capped_upper_bound_ndvs(rows);
    Ok(ret)
}

fn ndv_or_default(col: &ColRef, stats: &Statistics) -> f64 {
    stats
        .ndv(col)
        .unwrap_or(stats.rows * DEFAULT_SELECTIVITY)
}

/// Empty statistics over the columns of `input`.
fn empty_like(input: &Statistics) -> Statistics {
    let mut histograms = BTreeMap::new();
    for id in input.histograms.keys() {
        histograms.insert(*id, Histogram::new(vec![], 0.0, 0.0, 0.0));
    }
    Statistics {
        rows: MIN_ROWS,
        histograms,
        widths: input.widths.clone(),
        empty: true,
        upper_bound_ndvs: input.capped_upper_bound_ndvs(0.0),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator as BinaryOp;
    use maplit::btreemap;

    use crate::catalog::InMemoryCatalog;
    use crate::column::ColumnFactory;
    use crate::optimizer::OptimizerConfig;
    use crate::scalar::{and_all, binary, col, eq, lit};
    use crate::stat::derive::filter;
    use crate::stat::{Histogram, Statistics, MIN_ROWS};

    fn int(v: i32) -> ScalarValue {
        ScalarValue::Int32(Some(v))
    }

    #[test]
    fn test_filter_histogram_and_default() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Utf8, "b");
        let values: Vec<ScalarValue> = (0..10).map(int).collect();
        let input = Statistics::new(
            10.0,
            btreemap! { a.id() => Histogram::from_values(&values) },
            BTreeMap::new(),
        );
        let md = InMemoryCatalog::new();
        let config = OptimizerConfig::default();

        {
            // a < 5 keeps half of the values
            let pred = binary(col(&a), BinaryOp::Lt, lit(int(5)));
            let ret = filter(&input, &pred, &md, &config).unwrap();
            assert!((ret.rows() - 5.0).abs() < 1e-6);
        }

        {
            // Predicate on a column without statistics
            let pred = eq(col(&b), lit(ScalarValue::Utf8(Some("x".to_string()))));
            let ret = filter(&input, &pred, &md, &config).unwrap();
            assert!((ret.rows() - 4.0).abs() < 1e-6);
        }

        {
            let pred = and_all(vec![
                binary(col(&a), BinaryOp::Lt, lit(int(2))),
                binary(col(&a), BinaryOp::Gt, lit(int(5))),
            ])
            .unwrap();
            let ret = filter(&input, &pred, &md, &config).unwrap();
            assert!(ret.is_empty());
            assert_eq!(MIN_ROWS, ret.rows());
        }
    }
}

use log::trace;

use crate::column::ColRef;
use crate::scalar::ScalarExpr;
use crate::stat::{Histogram, Statistics, UpperBoundNdvs};

/// Statistics of projecting `input` and computing `computed` on top of it.
///
/// Columns already known to `input` keep their histograms. A computed column copies the
/// histogram of a column it renames, gets a singleton histogram when it is a constant, and a
/// default histogram otherwise.
pub fn project(input: &Statistics, computed: &[(ColRef, ScalarExpr)]) -> Statistics {
    let mut ret = input.clone();

    for (col, expr) in computed {
        if ret.histograms.contains_key(&col.id()) {
            continue;
        }

        let hist = match expr {
            ScalarExpr::Ident(src) => input.histogram(src.id()).cloned(),
            ScalarExpr::Const(v) => Some(Histogram::for_constant(v.clone())),
            _ => None,
        }
        .unwrap_or_else(|| {
            if col.is_boolean() {
                Histogram::default_bool_histogram()
            } else {
                Histogram::default_histogram()
            }
        });
        trace!("project: histogram of {} is {:?}", col, hist);

        ret.histograms.insert(col.id(), hist);
        ret.widths.insert(col.id(), col.width());
        // A new column cannot have more distinct values than the relation has rows
        ret.upper_bound_ndvs.push(UpperBoundNdvs::new(
            vec![col.clone()].into_iter().collect(),
            input.rows,
        ));
    }

    ret
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator as BinaryOp;

    use crate::column::ColumnFactory;
    use crate::scalar::{binary, col, lit};
    use crate::stat::derive::project;
    use crate::stat::{Histogram, Statistics};

    #[test]
    fn test_project_new_boolean_column() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let flag = factory.create(DataType::Boolean, "flag");
        let input = Statistics::new(250.0, BTreeMap::new(), BTreeMap::new());

        let expr = binary(col(&a), BinaryOp::Gt, lit(ScalarValue::Int32(Some(5))));
        let ret = project(&input, &[(flag.clone(), expr)]);

        assert_eq!(
            &Histogram::default_bool_histogram(),
            ret.histogram(flag.id()).unwrap()
        );
        assert_eq!(Some(250.0), ret.upper_bound_ndv(&flag));
        assert_eq!(250.0, ret.rows());
    }

    #[test]
    fn test_project_constant_and_rename() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let c = factory.create(DataType::Int32, "c");
        let values: Vec<ScalarValue> = (0..4).map(|v| ScalarValue::Int32(Some(v))).collect();
        let input = Statistics::new(
            4.0,
            maplit::btreemap! { a.id() => Histogram::from_values(&values) },
            BTreeMap::new(),
        );

        let ret = project(
            &input,
            &[
                (b.clone(), col(&a)),
                (c.clone(), lit(ScalarValue::Int32(Some(7)))),
            ],
        );
        assert_eq!(input.histogram(a.id()), ret.histogram(b.id()));
        assert_eq!(
            &Histogram::for_constant(ScalarValue::Int32(Some(7))),
            ret.histogram(c.id()).unwrap()
        );
    }
}

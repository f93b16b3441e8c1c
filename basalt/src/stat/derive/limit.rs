use log::trace;

use crate::stat::{Statistics, MIN_ROWS};

/// Statistics after keeping at most `limit_rows` rows of `input`.
pub fn limit(input: &Statistics, limit_rows: f64) -> Statistics {
    let rows = if input.is_empty() {
        MIN_ROWS
    } else {
        limit_rows.max(MIN_ROWS)
    };
    trace!("limit: {} -> {} rows", input.rows, rows);

    Statistics {
        rows,
        histograms: input.histograms.clone(),
        widths: input.widths.clone(),
        empty: input.is_empty(),
        upper_bound_ndvs: input.capped_upper_bound_ndvs(rows),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use arrow_schema::DataType;

    use crate::column::ColumnFactory;
    use crate::stat::derive::limit;
    use crate::stat::{Statistics, UpperBoundNdvs, MIN_ROWS};

    #[test]
    fn test_limit() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let input = Statistics::new(100.0, BTreeMap::new(), BTreeMap::new())
            .with_upper_bound_ndvs(vec![UpperBoundNdvs::new(
                vec![a.clone()].into_iter().collect(),
                50.0,
            )]);

        let ret = limit(&input, 10.0);
        assert_eq!(10.0, ret.rows());
        assert_eq!(Some(10.0), ret.upper_bound_ndv(&a));

        assert_eq!(MIN_ROWS, limit(&input, 0.0).rows());

        let empty = Statistics::empty(vec![&a]);
        let ret = limit(&empty, 10.0);
        assert!(ret.is_empty());
        assert_eq!(MIN_ROWS, ret.rows());
    }
}

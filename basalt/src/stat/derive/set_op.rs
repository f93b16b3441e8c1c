//! Set operations other than `UNION ALL`, expressed as semi and anti semi joins.
use crate::column::ColRef;
use crate::optimizer::OptimizerConfig;
use crate::stat::derive::{group_by, left_anti_semi_join, left_semi_join, JoinPredicateInfo};
use crate::stat::Statistics;

/// `EXCEPT ALL`: rows of the outer input without a match in the inner input.
pub fn difference_all(
    outer: &Statistics,
    outer_cols: &[ColRef],
    inner: &Statistics,
    inner_cols: &[ColRef],
    output_cols: &[ColRef],
    config: &OptimizerConfig,
) -> Statistics {
    let preds = JoinPredicateInfo::from_pairs(outer_cols, inner_cols);
    left_anti_semi_join(outer, inner, &preds, false, true, config).remapped(outer_cols, output_cols)
}

/// `EXCEPT`: distinct outer rows without a match in the inner input.
pub fn difference(
    outer: &Statistics,
    outer_cols: &[ColRef],
    inner: &Statistics,
    inner_cols: &[ColRef],
    output_cols: &[ColRef],
    config: &OptimizerConfig,
) -> Statistics {
    let distinct = group_by(outer, outer_cols, &[], config);
    let preds = JoinPredicateInfo::from_pairs(outer_cols, inner_cols);
    left_anti_semi_join(&distinct, inner, &preds, false, false, config)
        .remapped(outer_cols, output_cols)
}

/// `INTERSECT ALL`: outer rows with a match in the inner input.
pub fn intersect_all(
    outer: &Statistics,
    outer_cols: &[ColRef],
    inner: &Statistics,
    inner_cols: &[ColRef],
    output_cols: &[ColRef],
    config: &OptimizerConfig,
) -> Statistics {
    let preds = JoinPredicateInfo::from_pairs(outer_cols, inner_cols);
    left_semi_join(outer, inner, &preds, config).remapped(outer_cols, output_cols)
}

/// `INTERSECT`: distinct outer rows with a match in the inner input.
pub fn intersect(
    outer: &Statistics,
    outer_cols: &[ColRef],
    inner: &Statistics,
    inner_cols: &[ColRef],
    output_cols: &[ColRef],
    config: &OptimizerConfig,
) -> Statistics {
    let distinct = group_by(outer, outer_cols, &[], config);
    let preds = JoinPredicateInfo::from_pairs(outer_cols, inner_cols);
    left_semi_join(&distinct, inner, &preds, config).remapped(outer_cols, output_cols)
}

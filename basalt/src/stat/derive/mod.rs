//! Statistics processors.
//!
//! Each processor is a pure function from child statistics and the parameters of one operator
//! shape to a new [`Statistics`](crate::stat::Statistics). Inputs are never modified.
mod filter;
pub use filter::*;
mod group_by;
pub use group_by::*;
mod join;
pub use join::*;
mod limit;
pub use limit::*;
mod project;
pub use project::*;
mod scan;
pub use scan::*;
mod set_op;
pub use set_op::*;
mod union_all;
pub use union_all::*;

/// Combines independent selectivities.
///
/// With damping the most selective predicate counts fully and every following one contributes
/// with a square root backoff, which keeps correlated predicates from underestimating rows.
pub(crate) fn combine_selectivities(mut selectivities: Vec<f64>, damping: bool) -> f64 {
    if !damping {
        return selectivities.iter().product();
    }

    selectivities.sort_by(|l, r| l.total_cmp(r));
    let mut exponent = 1.0;
    let mut ret = 1.0;
    for s in selectivities {
        ret *= s.powf(exponent);
        exponent /= 2.0;
    }
    ret
}

/// Product of distinct value counts, damped the same way as selectivities.
pub(crate) fn combine_ndvs(mut ndvs: Vec<f64>, damping: bool) -> f64 {
    if !damping {
        return ndvs.iter().product();
    }

    ndvs.sort_by(|l, r| r.total_cmp(l));
    let mut exponent = 1.0;
    let mut ret = 1.0;
    for n in ndvs {
        ret *= n.max(1.0).powf(exponent);
        exponent /= 2.0;
    }
    ret
}

#[cfg(test)]
mod tests {
    use crate::stat::derive::{combine_ndvs, combine_selectivities};

    fn assert_close(expected: f64, actual: f64) {
        assert!((expected - actual).abs() < 1e-9, "expected {} got {}", expected, actual);
    }

    #[test]
    fn test_damping() {
        assert_close(0.01, combine_selectivities(vec![0.1, 0.1], false));
        assert_close(0.1 * 0.1f64.sqrt(), combine_selectivities(vec![0.1, 0.1], true));
        assert_close(1.0, combine_selectivities(vec![], true));

        assert_close(400.0, combine_ndvs(vec![16.0, 100.0], true));
        assert_close(1600.0, combine_ndvs(vec![16.0, 100.0], false));
    }
}

use std::fmt::{Debug, Formatter};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;

use datafusion_common::ScalarValue;
use datafusion_expr::Operator as BinaryOp;
use itertools::Itertools;

use crate::column::{ColRef, ColRefMap, ColRefSet};
use crate::constraint::{Constraint, ConstraintRef, ConstraintTrait, Range};
use crate::datum::Datum;
use crate::error::{OptError, OptResult};
use crate::scalar::{and_all, binary, col, is_null, lit, or_all, ScalarExpr};

/// Values a single column may take: a union of disjoint ranges, plus null when
/// `include_null` is set.
#[derive(Clone, PartialEq)]
pub struct ConstraintInterval {
    column: ColRef,
    used: ColRefSet,
    ranges: Vec<Range>,
    include_null: bool,
}

impl ConstraintInterval {
    pub fn new(column: ColRef, ranges: Vec<Range>, include_null: bool) -> Self {
        let used = std::iter::once(&column).collect();
        Self {
            column,
            used,
            ranges: Range::normalize(ranges),
            include_null,
        }
    }

    /// Any value, null included.
    pub fn unbounded(column: ColRef) -> Self {
        Self::new(column, vec![Range::unbounded()], true)
    }

    pub fn not_null(column: ColRef) -> Self {
        Self::new(column, vec![Range::unbounded()], false)
    }

    pub fn null_only(column: ColRef) -> Self {
        Self::new(column, vec![], true)
    }

    /// Interval satisfying `column op value`, `None` when the operator has no interval form.
    pub fn from_comparison(column: ColRef, op: BinaryOp, value: &Datum) -> Option<Self> {
        if value.is_null() {
            // Nothing compares true against null
            return match op {
                BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq => Some(Self::new(column, vec![], false)),
                BinaryOp::IsNotDistinctFrom => Some(Self::null_only(column)),
                BinaryOp::IsDistinctFrom => Some(Self::not_null(column)),
                _ => None,
            };
        }

        let v = value.clone();
        let ranges = match op {
            BinaryOp::Eq | BinaryOp::IsNotDistinctFrom => vec![Range::point(v)],
            BinaryOp::NotEq | BinaryOp::IsDistinctFrom => vec![
                Range::less_than(v.clone(), false),
                Range::greater_than(v, false),
            ],
            BinaryOp::Lt => vec![Range::less_than(v, false)],
            BinaryOp::LtEq => vec![Range::less_than(v, true)],
            BinaryOp::Gt => vec![Range::greater_than(v, false)],
            BinaryOp::GtEq => vec![Range::greater_than(v, true)],
            _ => return None,
        };

        let include_null = matches!(op, BinaryOp::IsDistinctFrom);
        Some(Self::new(column, ranges, include_null))
    }

    pub fn column(&self) -> &ColRef {
        &self.column
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn include_null(&self) -> bool {
        self.include_null
    }

    /// The constant a point interval pins the column to.
    pub fn as_point(&self) -> Option<&Datum> {
        match (self.ranges.as_slice(), self.include_null) {
            ([r], false) => r.as_point(),
            _ => None,
        }
    }

    pub fn intersect(&self, other: &ConstraintInterval) -> ConstraintInterval {
        debug_assert_eq!(self.column, other.column);
        let ranges = self
            .ranges
            .iter()
            .cartesian_product(other.ranges.iter())
            .filter_map(|(l, r)| l.intersect(r))
            .collect();
        Self::new(
            self.column.clone(),
            ranges,
            self.include_null && other.include_null,
        )
    }

    pub fn union(&self, other: &ConstraintInterval) -> ConstraintInterval {
        debug_assert_eq!(self.column, other.column);
        let ranges = self
            .ranges
            .iter()
            .chain(other.ranges.iter())
            .cloned()
            .collect();
        Self::new(
            self.column.clone(),
            ranges,
            self.include_null || other.include_null,
        )
    }

    pub fn complement(&self) -> ConstraintInterval {
        Self::new(
            self.column.clone(),
            Range::complement(&self.ranges),
            !self.include_null,
        )
    }

    fn range_to_scalar(&self, range: &Range) -> Option<ScalarExpr> {
        if let Some(v) = range.as_point() {
            return Some(binary(col(&self.column), BinaryOp::Eq, lit(v.clone())));
        }

        let lower = match range.start() {
            Unbounded => None,
            Included(v) => Some(binary(col(&self.column), BinaryOp::GtEq, lit(v.clone()))),
            Excluded(v) => Some(binary(col(&self.column), BinaryOp::Gt, lit(v.clone()))),
        };
        let upper = match range.end() {
            Unbounded => None,
            Included(v) => Some(binary(col(&self.column), BinaryOp::LtEq, lit(v.clone()))),
            Excluded(v) => Some(binary(col(&self.column), BinaryOp::Lt, lit(v.clone()))),
        };
        and_all(lower.into_iter().chain(upper))
    }
}

impl ConstraintTrait for ConstraintInterval {
    fn is_contradiction(&self) -> bool {
        self.ranges.is_empty() && !self.include_null
    }

    fn is_unbounded(&self) -> bool {
        self.include_null && matches!(self.ranges.as_slice(), [r] if r.is_unbounded())
    }

    fn used_columns(&self) -> &ColRefSet {
        &self.used
    }

    fn constraint_on_column(&self, col: &ColRef) -> Option<ConstraintRef> {
        if &self.column == col {
            Some(Arc::new(Constraint::Interval(self.clone())))
        } else {
            None
        }
    }

    fn constraint_on_columns(&self, cols: &ColRefSet) -> Option<ConstraintRef> {
        if cols.contains(&self.column) {
            Some(Arc::new(Constraint::Interval(self.clone())))
        } else {
            None
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<Constraint> {
        let column = match mapping.get(&self.column) {
            Some(mapped) => mapped.clone(),
            None if must_exist => {
                return Err(OptError::UnmappedColumn {
                    column: self.column.id(),
                }
                .into())
            }
            None => self.column.clone(),
        };

        Ok(Constraint::Interval(Self::new(
            column,
            self.ranges.clone(),
            self.include_null,
        )))
    }

    fn to_scalar(&self) -> ScalarExpr {
        if self.is_unbounded() {
            return lit(ScalarValue::Boolean(Some(true)));
        }

        let mut disjuncts = Vec::with_capacity(self.ranges.len() + 1);
        for range in &self.ranges {
            match self.range_to_scalar(range) {
                Some(e) => disjuncts.push(e),
                // An unbounded range only excludes null
                None => disjuncts.push(crate::scalar::not(is_null(col(&self.column)))),
            }
        }
        if self.include_null {
            disjuncts.push(is_null(col(&self.column)));
        }

        or_all(disjuncts).unwrap_or_else(|| lit(ScalarValue::Boolean(Some(false))))
    }
}

impl Debug for ConstraintInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in ({})",
            self.column,
            self.ranges.iter().map(|r| format!("{:?}", r)).join(", ")
        )?;
        if self.include_null {
            write!(f, " or null")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator as BinaryOp;

    use crate::column::ColumnFactory;
    use crate::constraint::{ConstraintInterval, ConstraintTrait};

    fn int(v: i32) -> ScalarValue {
        ScalarValue::Int32(Some(v))
    }

    #[test]
    fn test_from_comparison() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");

        let ne = ConstraintInterval::from_comparison(a.clone(), BinaryOp::NotEq, &int(5)).unwrap();
        assert_eq!("a#0 in ((-inf, 5), (5, inf))", format!("{:?}", ne));

        let eq_null =
            ConstraintInterval::from_comparison(a.clone(), BinaryOp::Eq, &ScalarValue::Int32(None))
                .unwrap();
        assert!(eq_null.is_contradiction());

        assert!(ConstraintInterval::from_comparison(a, BinaryOp::Plus, &int(1)).is_none());
    }

    #[test]
    fn test_intersect_union_complement() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");

        let lt5 = ConstraintInterval::from_comparison(a.clone(), BinaryOp::Lt, &int(5)).unwrap();
        let gt7 = ConstraintInterval::from_comparison(a.clone(), BinaryOp::Gt, &int(7)).unwrap();

        assert!(lt5.intersect(&gt7).is_contradiction());

        let either = lt5.union(&gt7);
        assert_eq!(2, either.ranges().len());
        let complement = either.complement();
        assert_eq!("a#0 in ([5, 7]) or null", format!("{:?}", complement));

        assert!(ConstraintInterval::unbounded(a.clone()).is_unbounded());
        assert!(ConstraintInterval::unbounded(a).complement().is_contradiction());
    }

    #[test]
    fn test_to_scalar() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");

        let point = ConstraintInterval::from_comparison(a.clone(), BinaryOp::Eq, &int(3)).unwrap();
        assert_eq!("a#0 = 3", point.to_scalar().to_string());
        assert_eq!(Some(&int(3)), point.as_point());

        let null_only = ConstraintInterval::null_only(a);
        assert_eq!("a#0 IS NULL", null_only.to_scalar().to_string());
    }
}

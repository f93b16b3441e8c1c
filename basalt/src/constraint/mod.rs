//! Column constraints.
//!
//! A [`Constraint`] describes the values columns of a relation may take. Constraints are derived
//! from predicates and combined bottom up through the plan. They are conservative: every row the
//! relation can produce satisfies the constraint, so a constraint that admits nothing proves the
//! relation is empty.
//!
//! Conjunctions and disjunctions keep their children flattened, a conjunction never holds another
//! conjunction, so contradiction checks are a plain scan over children. Each of them indexes its
//! single column children with one of the [`LookupStrategy`]s.

mod array;
mod interval;
mod lookup;
mod negation;
mod property;
mod range;

pub use array::*;
pub use interval::*;
pub use lookup::*;
pub use negation::*;
pub use property::*;
pub use range::*;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use datafusion_expr::Operator as BinaryOp;
use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;

use crate::catalog::{comparison_exists, scalar_op_props_if_exists, MetadataAccessor};
use crate::column::{ColId, ColRef, ColRefMap, ColRefSet};
use crate::error::OptResult;
use crate::scalar::ScalarExpr;

pub type ConstraintRef = Arc<Constraint>;

#[enum_dispatch(Constraint)]
pub trait ConstraintTrait {
    /// Whether the constraint admits no value at all.
    fn is_contradiction(&self) -> bool;

    /// Whether the constraint admits every value, null included.
    fn is_unbounded(&self) -> bool;

    fn used_columns(&self) -> &ColRefSet;

    /// Projection onto one column, `None` when nothing is known about it.
    fn constraint_on_column(&self, col: &ColRef) -> Option<ConstraintRef>;

    /// Projection onto a column set, `None` when nothing is known about it.
    fn constraint_on_columns(&self, cols: &ColRefSet) -> Option<ConstraintRef>;

    /// Copy with every column substituted through `mapping`.
    ///
    /// With `must_exist` an unmapped column is an error, otherwise it is kept.
    fn copy_with_remapped_columns(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<Constraint>;

    fn to_scalar(&self) -> ScalarExpr;
}

#[enum_dispatch]
#[derive(Clone, PartialEq, EnumAsInner)]
pub enum Constraint {
    Interval(ConstraintInterval),
    Conjunction(ConstraintConjunction),
    Disjunction(ConstraintDisjunction),
    Negation(ConstraintNegation),
}

impl Debug for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Interval(c) => write!(f, "{:?}", c),
            Constraint::Conjunction(c) => write!(f, "{:?}", c),
            Constraint::Disjunction(c) => write!(f, "{:?}", c),
            Constraint::Negation(c) => write!(f, "{:?}", c),
        }
    }
}

/// Combines intervals on the same column in place, in order of first occurrence.
fn merge_intervals<F>(children: Vec<ConstraintRef>, combine: F) -> Vec<ConstraintRef>
where
    F: Fn(&ConstraintInterval, &ConstraintInterval) -> ConstraintInterval,
{
    let mut merged: Vec<ConstraintRef> = Vec::with_capacity(children.len());
    let mut interval_pos: HashMap<ColId, usize> = HashMap::new();

    for child in children {
        if let Some(interval) = child.as_interval() {
            let col_id = interval.column().id();
            if let Some(pos) = interval_pos.get(&col_id).copied() {
                let combined = merged[pos].as_interval().map(|e| combine(e, interval));
                if let Some(c) = combined {
                    merged[pos] = Arc::new(Constraint::Interval(c));
                    continue;
                }
            }
            interval_pos.insert(col_id, merged.len());
        }
        merged.push(child);
    }

    merged
}

/// Conjunction of `children`, flattened, with intervals on one column intersected.
///
/// Unbounded children are dropped. Returns `None` when nothing is left, the only child when
/// one is left.
pub fn conjunction(
    children: Vec<ConstraintRef>,
    strategy: LookupStrategy,
) -> Option<ConstraintRef> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child.as_ref() {
            Constraint::Conjunction(conj) => flat.extend(conj.children().iter().cloned()),
            _ => flat.push(child),
        }
    }

    let mut merged = merge_intervals(flat, |l, r| l.intersect(r));
    merged.retain(|c| !c.is_unbounded());

    match merged.len() {
        0 => None,
        1 => merged.pop(),
        _ => Some(Arc::new(Constraint::Conjunction(ConstraintConjunction::new(
            merged, strategy,
        )))),
    }
}

/// Disjunction of `children`, flattened, with intervals on one column united.
///
/// Returns `None` when any child is unbounded or no child is given, and drops contradicting
/// children unless all of them contradict.
pub fn disjunction(
    children: Vec<ConstraintRef>,
    strategy: LookupStrategy,
) -> Option<ConstraintRef> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child.as_ref() {
            Constraint::Disjunction(disj) => flat.extend(disj.children().iter().cloned()),
            _ => flat.push(child),
        }
    }

    if flat.iter().any(|c| c.is_unbounded()) {
        return None;
    }

    let first_contradiction = flat.iter().find(|c| c.is_contradiction()).cloned();
    flat.retain(|c| !c.is_contradiction());

    let mut merged = merge_intervals(flat, |l, r| l.union(r));
    if merged.iter().any(|c| c.is_unbounded()) {
        return None;
    }

    match merged.len() {
        0 => first_contradiction,
        1 => merged.pop(),
        _ => Some(Arc::new(Constraint::Disjunction(ConstraintDisjunction::new(
            merged, strategy,
        )))),
    }
}

/// Negation of `child`. Intervals are complemented and double negations removed.
pub fn negation(child: ConstraintRef) -> ConstraintRef {
    match child.as_ref() {
        Constraint::Interval(interval) => Arc::new(Constraint::Interval(interval.complement())),
        Constraint::Negation(neg) => neg.child().clone(),
        _ => Arc::new(Constraint::Negation(ConstraintNegation::new(child))),
    }
}

/// Constraint implied by a predicate, `None` when the predicate tells nothing about column
/// values.
///
/// Comparisons are only converted when the catalog knows the comparison and the operator
/// yields null on null input, so that rows failing the interval can never pass the predicate.
pub fn constraint_from_scalar(
    expr: &ScalarExpr,
    md: &dyn MetadataAccessor,
) -> OptResult<Option<ConstraintRef>> {
    Ok(convert_predicate(expr, md)?.map(|(c, _)| c))
}

/// Converts `expr`, also telling whether the constraint is exact: it admits no row for which
/// the predicate is false. Only exact constraints may be negated, since negating one that
/// admits too much would exclude rows passing the negated predicate.
fn convert_predicate(
    expr: &ScalarExpr,
    md: &dyn MetadataAccessor,
) -> OptResult<Option<(ConstraintRef, bool)>> {
    match expr {
        ScalarExpr::Binary {
            op: BinaryOp::And, ..
        } => {
            let mut children = Vec::new();
            let mut exact = true;
            for conjunct in expr.conjuncts() {
                match convert_predicate(conjunct, md)? {
                    Some((c, child_exact)) => {
                        exact &= child_exact;
                        children.push(c);
                    }
                    None => exact = false,
                }
            }
            Ok(conjunction(children, LookupStrategy::Hash).map(|c| (c, exact)))
        }
        ScalarExpr::Binary {
            op: BinaryOp::Or, ..
        } => {
            let mut children = Vec::new();
            let mut exact = true;
            for disjunct in expr.disjuncts() {
                match convert_predicate(disjunct, md)? {
                    Some((c, child_exact)) => {
                        exact &= child_exact;
                        children.push(c);
                    }
                    None => return Ok(None),
                }
            }
            Ok(disjunction(children, LookupStrategy::Hash).map(|c| (c, exact)))
        }
        ScalarExpr::Not(child) => match convert_predicate(child, md)? {
            Some((c, true)) => Ok(Some((negation(c), true))),
            _ => Ok(None),
        },
        ScalarExpr::IsNull(child) => Ok(child.as_column().map(|c| {
            let interval = ConstraintInterval::null_only(c.clone());
            (Arc::new(Constraint::Interval(interval)) as ConstraintRef, true)
        })),
        ScalarExpr::Binary { .. } => {
            let (col, op, value) = match expr.as_column_comparison() {
                Some(cmp) => cmp,
                None => return Ok(None),
            };

            if !comparison_exists(md, op, col.data_type(), &value.get_datatype())? {
                return Ok(None);
            }
            let strict = match scalar_op_props_if_exists(md, op)? {
                Some(props) => props.returns_null_on_null_input,
                None => return Ok(None),
            };
            if !strict && !matches!(op, BinaryOp::IsDistinctFrom | BinaryOp::IsNotDistinctFrom) {
                return Ok(None);
            }

            Ok(ConstraintInterval::from_comparison(col.clone(), op, value)
                .map(|i| (Arc::new(Constraint::Interval(i)) as ConstraintRef, true)))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator as BinaryOp;

    use crate::catalog::InMemoryCatalog;
    use crate::column::{ColRef, ColRefMap, ColRefSet, ColumnFactory};
    use crate::constraint::{
        conjunction, constraint_from_scalar, disjunction, negation, Constraint,
        ConstraintConjunction, ConstraintInterval, ConstraintRef, ConstraintTrait,
        LookupStrategy,
    };
    use crate::scalar::{and_all, binary, col, is_null, lit, not, or_all};

    fn int(v: i32) -> ScalarValue {
        ScalarValue::Int32(Some(v))
    }

    fn cmp(c: &ColRef, op: BinaryOp, v: i32) -> ConstraintRef {
        Arc::new(Constraint::Interval(
            ConstraintInterval::from_comparison(c.clone(), op, &int(v)).unwrap(),
        ))
    }

    #[test]
    fn test_array_and_hash_lookup_agree() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let c = factory.create(DataType::Int32, "c");

        // Raw children, so several of them constrain the same column
        let children = vec![
            cmp(&a, BinaryOp::Gt, 1),
            cmp(&a, BinaryOp::Lt, 10),
            cmp(&b, BinaryOp::Eq, 3),
            disjunction(
                vec![cmp(&a, BinaryOp::Eq, 1), cmp(&b, BinaryOp::Eq, 2)],
                LookupStrategy::Hash,
            )
            .unwrap(),
            negation(
                conjunction(
                    vec![cmp(&b, BinaryOp::Gt, 5), cmp(&c, BinaryOp::Lt, 0)],
                    LookupStrategy::Hash,
                )
                .unwrap(),
            ),
            negation(cmp(&c, BinaryOp::Eq, 7)),
        ];

        let array = ConstraintConjunction::new(children.clone(), LookupStrategy::Array);
        let hash = ConstraintConjunction::new(children, LookupStrategy::Hash);

        for column in [&a, &b, &c] {
            assert_eq!(
                array.constraint_on_column(column),
                hash.constraint_on_column(column)
            );
        }

        let projected = hash.constraint_on_column(&a).unwrap();
        assert_eq!("a#0 in ((1, 10))", format!("{:?}", projected));
    }

    #[test]
    fn test_conjunction_contradiction() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");

        let contradiction = Arc::new(Constraint::Interval(ConstraintInterval::new(
            b.clone(),
            vec![],
            false,
        )));
        assert!(contradiction.is_contradiction());

        for strategy in [LookupStrategy::Array, LookupStrategy::Hash] {
            let conj = ConstraintConjunction::new(
                vec![cmp(&a, BinaryOp::Gt, 1), contradiction.clone()],
                strategy,
            );
            assert!(conj.is_contradiction());
        }

        // Intersecting disjoint intervals on one column
        let merged = conjunction(
            vec![cmp(&a, BinaryOp::Lt, 1), cmp(&a, BinaryOp::Gt, 5)],
            LookupStrategy::Hash,
        )
        .unwrap();
        assert!(merged.is_contradiction());
    }

    #[test]
    fn test_conjunction_is_flattened() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let c = factory.create(DataType::Int32, "c");

        let inner = conjunction(
            vec![cmp(&a, BinaryOp::Gt, 1), cmp(&b, BinaryOp::Gt, 1)],
            LookupStrategy::Hash,
        )
        .unwrap();
        let outer = conjunction(
            vec![inner, cmp(&c, BinaryOp::Gt, 1), cmp(&a, BinaryOp::Lt, 4)],
            LookupStrategy::Hash,
        )
        .unwrap();

        let conj = outer.as_conjunction().unwrap();
        assert_eq!(3, conj.children().len());
        assert!(conj
            .children()
            .iter()
            .all(|c| !matches!(c.as_ref(), Constraint::Conjunction(_))));
        assert_eq!(
            "a#0 in ((1, 4))",
            format!("{:?}", outer.constraint_on_column(&a).unwrap())
        );
    }

    #[test]
    fn test_disjunction_projection() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");

        let both = |x: i32, y: i32| {
            conjunction(
                vec![cmp(&a, BinaryOp::Eq, x), cmp(&b, BinaryOp::Eq, y)],
                LookupStrategy::Hash,
            )
            .unwrap()
        };
        let disj = disjunction(vec![both(1, 2), both(3, 4)], LookupStrategy::Hash).unwrap();

        assert_eq!(
            "a#0 in ([1, 1], [3, 3])",
            format!("{:?}", disj.constraint_on_column(&a).unwrap())
        );

        // A branch without a bound on the column makes the projection unknown
        let partial = disjunction(
            vec![cmp(&a, BinaryOp::Eq, 1), cmp(&b, BinaryOp::Eq, 1)],
            LookupStrategy::Hash,
        )
        .unwrap();
        assert!(partial.constraint_on_column(&a).is_none());

        let on_ab: ColRefSet = vec![a.clone(), b.clone()].into_iter().collect();
        assert_eq!(Some(partial.clone()), partial.constraint_on_columns(&on_ab));
    }

    #[test]
    fn test_remap_requires_mapping_when_must_exist() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let x = factory.create(DataType::Int32, "x");

        let conj = conjunction(
            vec![cmp(&a, BinaryOp::Gt, 1), cmp(&b, BinaryOp::Gt, 1)],
            LookupStrategy::Hash,
        )
        .unwrap();

        let mut mapping = ColRefMap::new();
        mapping.insert(&a, x.clone());

        assert!(conj.copy_with_remapped_columns(&mapping, true).is_err());

        let copy = conj.copy_with_remapped_columns(&mapping, false).unwrap();
        assert!(copy.used_columns().contains(&x));
        assert!(copy.used_columns().contains(&b));
        assert!(!copy.used_columns().contains(&a));
    }

    #[test]
    fn test_from_scalar() {
        let factory = ColumnFactory::new();
        let catalog = InMemoryCatalog::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");

        let pred = and_all(vec![
            binary(col(&a), BinaryOp::Gt, lit(int(1))),
            binary(lit(int(10)), BinaryOp::Gt, col(&a)),
            or_all(vec![
                binary(col(&b), BinaryOp::Eq, lit(int(1))),
                is_null(col(&b)),
            ])
            .unwrap(),
        ])
        .unwrap();

        let constraint = constraint_from_scalar(&pred, &catalog).unwrap().unwrap();
        assert!(!constraint.is_contradiction());
        assert_eq!(
            "a#0 in ((1, 10))",
            format!("{:?}", constraint.constraint_on_column(&a).unwrap())
        );
        assert_eq!(
            "b#1 in ([1, 1]) or null",
            format!("{:?}", constraint.constraint_on_column(&b).unwrap())
        );

        // Unknown comparison yields no constraint
        let s = factory.create(DataType::Utf8, "s");
        let unknown = binary(col(&s), BinaryOp::Eq, lit(int(1)));
        assert!(constraint_from_scalar(&unknown, &catalog).unwrap().is_none());

        let contradiction = and_all(vec![
            binary(col(&a), BinaryOp::Eq, lit(int(1))),
            binary(col(&a), BinaryOp::Eq, lit(int(2))),
        ])
        .unwrap();
        assert!(constraint_from_scalar(&contradiction, &catalog)
            .unwrap()
            .unwrap()
            .is_contradiction());
    }

    #[test]
    fn test_negation_of_partial_conversion() {
        let factory = ColumnFactory::new();
        let catalog = InMemoryCatalog::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");

        // a = 5, b = 6 satisfies it, though `a = b` has no constraint
        let pred = and_all(vec![
            binary(col(&a), BinaryOp::Eq, lit(int(5))),
            not(and_all(vec![
                binary(col(&a), BinaryOp::Gt, lit(int(1))),
                binary(col(&a), BinaryOp::Eq, col(&b)),
            ])
            .unwrap()),
        ])
        .unwrap();
        let constraint = constraint_from_scalar(&pred, &catalog).unwrap().unwrap();
        assert!(!constraint.is_contradiction());
        assert_eq!(
            "a#0 in ([5, 5])",
            format!("{:?}", constraint.constraint_on_column(&a).unwrap())
        );
        assert!(constraint_from_scalar(&not(binary(col(&a), BinaryOp::Eq, col(&b))), &catalog)
            .unwrap()
            .is_none());

        // Fully converted children are still negated
        let negated = and_all(vec![
            binary(col(&a), BinaryOp::Eq, lit(int(5))),
            not(binary(col(&a), BinaryOp::Gt, lit(int(1)))),
        ])
        .unwrap();
        assert!(constraint_from_scalar(&negated, &catalog)
            .unwrap()
            .unwrap()
            .is_contradiction());
    }
}

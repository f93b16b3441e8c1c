//! Scalar expressions carried by relational operators: predicates, projections and aggregates.

use std::collections::hash_map::DefaultHasher;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use arrow_schema::DataType;
use datafusion_common::ScalarValue;
use datafusion_expr::{AggregateFunction, Operator as BinaryOp};
use itertools::Itertools;

use crate::column::{remap_col, ColRef, ColRefMap, ColRefSet, ColumnFactory};
use crate::datum::Datum;

#[derive(Clone, Hash, PartialEq, Eq)]
pub enum ScalarExpr {
    Ident(ColRef),
    Const(Datum),
    Binary {
        op: BinaryOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    Not(Box<ScalarExpr>),
    IsNull(Box<ScalarExpr>),
    Cast {
        expr: Box<ScalarExpr>,
        data_type: DataType,
    },
    Func {
        name: String,
        args: Vec<ScalarExpr>,
        return_type: DataType,
    },
    Aggregate {
        func: AggregateFunction,
        args: Vec<ScalarExpr>,
        distinct: bool,
    },
}

pub fn col(col: &ColRef) -> ScalarExpr {
    ScalarExpr::Ident(col.clone())
}

pub fn lit(value: Datum) -> ScalarExpr {
    ScalarExpr::Const(value)
}

pub fn binary(left: ScalarExpr, op: BinaryOp, right: ScalarExpr) -> ScalarExpr {
    ScalarExpr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn eq(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    binary(left, BinaryOp::Eq, right)
}

pub fn is_null(expr: ScalarExpr) -> ScalarExpr {
    ScalarExpr::IsNull(Box::new(expr))
}

pub fn not(expr: ScalarExpr) -> ScalarExpr {
    ScalarExpr::Not(Box::new(expr))
}

/// Conjunction of predicates, `None` when `exprs` is empty.
pub fn and_all<I: IntoIterator<Item = ScalarExpr>>(exprs: I) -> Option<ScalarExpr> {
    exprs
        .into_iter()
        .reduce(|acc, e| binary(acc, BinaryOp::And, e))
}

/// Disjunction of predicates, `None` when `exprs` is empty.
pub fn or_all<I: IntoIterator<Item = ScalarExpr>>(exprs: I) -> Option<ScalarExpr> {
    exprs
        .into_iter()
        .reduce(|acc, e| binary(acc, BinaryOp::Or, e))
}

pub fn aggregate(func: AggregateFunction, args: Vec<ScalarExpr>) -> ScalarExpr {
    ScalarExpr::Aggregate {
        func,
        args,
        distinct: false,
    }
}

impl ScalarExpr {
    pub fn used_columns(&self) -> ColRefSet {
        let mut ret = ColRefSet::new();
        self.collect_columns(&mut ret);
        ret
    }

    fn collect_columns(&self, cols: &mut ColRefSet) {
        match self {
            ScalarExpr::Ident(c) => cols.insert(c.clone()),
            ScalarExpr::Const(_) => {}
            ScalarExpr::Binary { left, right, .. } => {
                left.collect_columns(cols);
                right.collect_columns(cols);
            }
            ScalarExpr::Not(e) | ScalarExpr::IsNull(e) => e.collect_columns(cols),
            ScalarExpr::Cast { expr, .. } => expr.collect_columns(cols),
            ScalarExpr::Func { args, .. } | ScalarExpr::Aggregate { args, .. } => {
                args.iter().for_each(|a| a.collect_columns(cols))
            }
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ScalarExpr::Ident(c) => c.data_type().clone(),
            ScalarExpr::Const(v) => v.get_datatype(),
            ScalarExpr::Binary { op, left, .. } => {
                if is_boolean_op(*op) {
                    DataType::Boolean
                } else {
                    left.data_type()
                }
            }
            ScalarExpr::Not(_) | ScalarExpr::IsNull(_) => DataType::Boolean,
            ScalarExpr::Cast { data_type, .. } => data_type.clone(),
            ScalarExpr::Func { return_type, .. } => return_type.clone(),
            ScalarExpr::Aggregate { func, args, .. } => match func {
                AggregateFunction::Count => DataType::Int64,
                AggregateFunction::Avg => DataType::Float64,
                _ => args
                    .first()
                    .map(|a| a.data_type())
                    .unwrap_or(DataType::Int64),
            },
        }
    }

    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Splits a predicate into its top level conjuncts.
    pub fn conjuncts(&self) -> Vec<&ScalarExpr> {
        match self {
            ScalarExpr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut ret = left.conjuncts();
                ret.extend(right.conjuncts());
                ret
            }
            other => vec![other],
        }
    }

    pub fn disjuncts(&self) -> Vec<&ScalarExpr> {
        match self {
            ScalarExpr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let mut ret = left.disjuncts();
                ret.extend(right.disjuncts());
                ret
            }
            other => vec![other],
        }
    }

    pub fn as_column(&self) -> Option<&ColRef> {
        match self {
            ScalarExpr::Ident(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_constant_false(&self) -> bool {
        matches!(self, ScalarExpr::Const(ScalarValue::Boolean(Some(false))))
    }

    pub fn is_constant_true(&self) -> bool {
        matches!(self, ScalarExpr::Const(ScalarValue::Boolean(Some(true))))
    }

    /// Matches `col op const` or `const op col`, with the operator turned around for the
    /// latter form.
    pub fn as_column_comparison(&self) -> Option<(&ColRef, BinaryOp, &Datum)> {
        match self {
            ScalarExpr::Binary { op, left, right } => {
                match (left.as_ref(), right.as_ref()) {
                    (ScalarExpr::Ident(c), ScalarExpr::Const(v)) => Some((c, *op, v)),
                    (ScalarExpr::Const(v), ScalarExpr::Ident(c)) => {
                        op.swap().map(|swapped| (c, swapped, v))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Matches `col = col`.
    pub fn as_column_equality(&self) -> Option<(&ColRef, &ColRef)> {
        match self {
            ScalarExpr::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (ScalarExpr::Ident(l), ScalarExpr::Ident(r)) => Some((l, r)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn has_aggregate(&self) -> bool {
        match self {
            ScalarExpr::Aggregate { .. } => true,
            ScalarExpr::Ident(_) | ScalarExpr::Const(_) => false,
            ScalarExpr::Binary { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            ScalarExpr::Not(e) | ScalarExpr::IsNull(e) => e.has_aggregate(),
            ScalarExpr::Cast { expr, .. } => expr.has_aggregate(),
            ScalarExpr::Func { args, .. } => args.iter().any(|a| a.has_aggregate()),
        }
    }

    pub fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> ScalarExpr {
        match self {
            ScalarExpr::Ident(c) => ScalarExpr::Ident(remap_col(c, mapping, must_exist, factory)),
            ScalarExpr::Const(v) => ScalarExpr::Const(v.clone()),
            ScalarExpr::Binary { op, left, right } => ScalarExpr::Binary {
                op: *op,
                left: Box::new(left.copy_with_remapped_columns(mapping, must_exist, factory)),
                right: Box::new(right.copy_with_remapped_columns(mapping, must_exist, factory)),
            },
            ScalarExpr::Not(e) => {
                ScalarExpr::Not(Box::new(e.copy_with_remapped_columns(mapping, must_exist, factory)))
            }
            ScalarExpr::IsNull(e) => ScalarExpr::IsNull(Box::new(
                e.copy_with_remapped_columns(mapping, must_exist, factory),
            )),
            ScalarExpr::Cast { expr, data_type } => ScalarExpr::Cast {
                expr: Box::new(expr.copy_with_remapped_columns(mapping, must_exist, factory)),
                data_type: data_type.clone(),
            },
            ScalarExpr::Func {
                name,
                args,
                return_type,
            } => ScalarExpr::Func {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.copy_with_remapped_columns(mapping, must_exist, factory))
                    .collect(),
                return_type: return_type.clone(),
            },
            ScalarExpr::Aggregate {
                func,
                args,
                distinct,
            } => ScalarExpr::Aggregate {
                func: func.clone(),
                args: args
                    .iter()
                    .map(|a| a.copy_with_remapped_columns(mapping, must_exist, factory))
                    .collect(),
                distinct: *distinct,
            },
        }
    }
}

pub(crate) fn is_boolean_op(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::IsDistinctFrom
            | BinaryOp::IsNotDistinctFrom
    )
}

impl Display for ScalarExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarExpr::Ident(c) => write!(f, "{}", c),
            ScalarExpr::Const(v) => write!(f, "{}", v),
            ScalarExpr::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            ScalarExpr::Not(e) => write!(f, "NOT ({})", e),
            ScalarExpr::IsNull(e) => write!(f, "{} IS NULL", e),
            ScalarExpr::Cast { expr, data_type } => write!(f, "CAST({} AS {:?})", expr, data_type),
            ScalarExpr::Func { name, args, .. } => {
                write!(f, "{}({})", name, args.iter().map(|a| a.to_string()).join(", "))
            }
            ScalarExpr::Aggregate {
                func,
                args,
                distinct,
            } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                write!(
                    f,
                    "{}({}{})",
                    func,
                    distinct,
                    args.iter().map(|a| a.to_string()).join(", ")
                )
            }
        }
    }
}

impl Debug for ScalarExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

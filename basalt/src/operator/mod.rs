//! Contains relational operators such as join, projection, limit, etc.
//!
//! They are classified into two categories: logical and physical. We separate logical and
//! physical operators in two enums since they implement different traits. Logical operators
//! implement the derivation contract of [`LogicalOperatorTrait`], computing a memo group's
//! [`LogicalProperty`] and [`Statistics`] from the already derived properties of its inputs.
//! Physical operators implement [`PhysicalOperatorTrait`] for required properties and cost.
//!
//! Several physical operators reuse the parameters of their logical counterpart, e.g.
//! [`PhysicalOperator::PhysicalHashJoin`] wraps the same [`Join`] as
//! [`LogicalOperator::LogicalJoin`].
mod logical;
pub use logical::*;
mod physical;
pub use physical::*;
mod table_scan;
pub use table_scan::*;
mod filter;
pub use filter::*;
mod projection;
pub use projection::*;
mod aggregate;
pub use aggregate::*;
mod limit;
pub use limit::*;
mod join;
pub use join::*;
mod set_op;
pub use set_op::*;
mod cte;
pub use cte::*;
mod enforcer;
pub use enforcer::*;

use std::collections::hash_map::DefaultHasher;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use enumset::EnumSet;

use crate::column::{combine_hashes, ColRefMap, ColRefSet, ColumnFactory};
use crate::constraint::ConstraintProperty;
use crate::error::{OptError, OptResult};
use crate::optimizer::OptimizerContext;
use crate::properties::{KeyCollection, LogicalProperty, MaxCard, PartInfo};
use crate::rules::RuleId;
use crate::stat::Statistics;

#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum Operator {
    Logical(LogicalOperator),
    Physical(PhysicalOperator),
}

impl Operator {
    /// Structural hash used for memo deduplication.
    pub fn hash_value(&self) -> u64 {
        match self {
            Operator::Logical(op) => op.hash_value(),
            Operator::Physical(op) => {
                let mut hasher = DefaultHasher::new();
                op.hash(&mut hasher);
                hasher.finish()
            }
        }
    }

    /// Whether both operators are interchangeable in the memo.
    pub fn matches(&self, other: &Operator) -> bool {
        match (self, other) {
            (Operator::Logical(l), Operator::Logical(r)) => l.matches(r),
            (Operator::Physical(l), Operator::Physical(r)) => l == r,
            _ => false,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Logical(op) => Display::fmt(op, f),
            Operator::Physical(op) => Display::fmt(op, f),
        }
    }
}

#[enum_dispatch(LogicalOperator, PhysicalOperator)]
pub trait DisplayFields {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result;
}

/// Access to the derived properties of an expression's inputs.
///
/// Inputs are always derived before the expression itself, so a derivation only reads what
/// this handle exposes plus the operator's own parameters.
pub struct DeriveHandle<'a> {
    context: &'a OptimizerContext,
    input_props: Vec<&'a LogicalProperty>,
    input_stats: Vec<&'a Statistics>,
}

impl<'a> DeriveHandle<'a> {
    pub fn new(
        context: &'a OptimizerContext,
        input_props: Vec<&'a LogicalProperty>,
        input_stats: Vec<&'a Statistics>,
    ) -> Self {
        Self {
            context,
            input_props,
            input_stats,
        }
    }

    pub fn context(&self) -> &'a OptimizerContext {
        self.context
    }

    pub fn arity(&self) -> usize {
        self.input_props.len()
    }

    pub fn input_prop(&self, idx: usize) -> &'a LogicalProperty {
        self.input_props[idx]
    }

    pub fn input_stats(&self, idx: usize) -> &'a Statistics {
        self.input_stats[idx]
    }

    /// Union of the output columns of all inputs.
    pub fn input_output_cols(&self) -> ColRefSet {
        let mut ret = ColRefSet::new();
        for p in &self.input_props {
            ret.union_with(p.output_cols());
        }
        ret
    }

    /// Union of the outer references of all inputs.
    pub fn input_outer_refs(&self) -> ColRefSet {
        let mut ret = ColRefSet::new();
        for p in &self.input_props {
            ret.union_with(p.outer_refs());
        }
        ret
    }

    /// Partition info of all inputs combined.
    pub fn input_part_info(&self) -> PartInfo {
        self.input_props
            .iter()
            .fold(PartInfo::default(), |acc, p| acc.combine(p.part_info()))
    }
}

/// Derivation contract every logical operator implements.
#[enum_dispatch(LogicalOperator)]
pub trait LogicalOperatorTrait {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet;

    /// Columns used by the operator's own scalar expressions.
    fn used_columns(&self) -> ColRefSet {
        ColRefSet::new()
    }

    /// Columns used but produced neither locally nor by an input.
    fn derive_outer_references(&self, handle: &DeriveHandle) -> ColRefSet {
        self.used_columns()
            .union(&handle.input_outer_refs())
            .difference(&handle.input_output_cols())
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection;

    fn derive_partition_info(&self, handle: &DeriveHandle) -> OptResult<PartInfo> {
        Ok(handle.input_part_info())
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard>;

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty>;

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        prop: &LogicalProperty,
    ) -> OptResult<Statistics>;

    /// Rules worth trying on expressions of this operator.
    fn candidate_xforms(&self) -> EnumSet<RuleId>;

    /// Operator kind combined with the operator's discriminating parameters.
    fn hash_value(&self) -> u64;

    fn matches(&self, other: &LogicalOperator) -> bool;

    /// Copy with every column substituted through `mapping`.
    ///
    /// With `must_exist` unmapped columns get fresh copies recorded in `mapping`, otherwise they
    /// are kept.
    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator;
}

pub(crate) fn hash_kind<K: Hash + ?Sized>(kind: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    hasher.finish()
}

pub(crate) fn hash_all<I: IntoIterator<Item = u64>>(kind: &str, values: I) -> u64 {
    values.into_iter().fold(hash_kind(kind), combine_hashes)
}

/// Derives the logical property of `operator` over inputs exposed by `handle`.
pub fn derive_logical_prop(
    operator: &LogicalOperator,
    handle: &DeriveHandle,
) -> OptResult<LogicalProperty> {
    if handle.context().is_cancelled() {
        return Err(OptError::Cancelled.into());
    }

    let output_cols = operator.derive_output_columns(handle);
    let outer_refs = operator.derive_outer_references(handle);
    let keys = operator.derive_keys(handle);
    let part_info = operator.derive_partition_info(handle)?;
    let constraint = operator.derive_constraint(handle)?;
    let max_card = if constraint.is_contradiction() {
        MaxCard::new(0)
    } else {
        operator.derive_max_card(handle)?
    };

    Ok(LogicalProperty::new(
        output_cols,
        outer_refs,
        keys,
        part_info,
        max_card,
        constraint,
    ))
}

/// Derives the statistics of `operator`, whose logical property is `prop`.
pub fn derive_statistics(
    operator: &LogicalOperator,
    handle: &DeriveHandle,
    prop: &LogicalProperty,
) -> OptResult<Statistics> {
    if handle.context().is_cancelled() {
        return Err(OptError::Cancelled.into());
    }
    if prop.max_card().is_zero() {
        return Ok(Statistics::empty(prop.output_cols().iter()));
    }
    operator.derive_statistics(handle, prop)
}

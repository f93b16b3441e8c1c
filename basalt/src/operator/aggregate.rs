use std::fmt::Formatter;

use enumset::EnumSet;
use itertools::Itertools;

use crate::column::{
    equals_col_seq, hash_col, hash_col_seq, remap_col, remap_cols, ColRef, ColRefMap, ColRefSet,
    ColumnFactory,
};
use crate::constraint::ConstraintProperty;
use crate::error::OptResult;
use crate::operator::{
    hash_all, DeriveHandle, DerivePropContext, DerivePropResult, DisplayFields, LogicalOperator,
    LogicalOperatorTrait, PhysicalOperatorTrait,
};
use crate::optimizer::Optimizer;
use crate::properties::{
    DistributionSpec, KeyCollection, LogicalProperty, MaxCard, PhysicalPropertySet,
};
use crate::rules::RuleId;
use crate::scalar::ScalarExpr;
use crate::stat::derive::group_by;
use crate::stat::Statistics;

/// Groups input rows on `group_cols` and computes `aggs` per group.
///
/// Without grouping columns this is a scalar aggregate producing exactly one row.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct GroupBy {
    group_cols: Vec<ColRef>,
    aggs: Vec<(ColRef, ScalarExpr)>,
}

impl GroupBy {
    pub fn new(group_cols: Vec<ColRef>, aggs: Vec<(ColRef, ScalarExpr)>) -> Self {
        Self { group_cols, aggs }
    }

    pub fn group_cols(&self) -> &[ColRef] {
        &self.group_cols
    }

    pub fn aggs(&self) -> &[(ColRef, ScalarExpr)] {
        &self.aggs
    }

    pub fn agg_cols(&self) -> Vec<ColRef> {
        self.aggs.iter().map(|(c, _)| c.clone()).collect()
    }

    /// Whether this only removes duplicates.
    pub fn is_distinct(&self) -> bool {
        self.aggs.is_empty() && !self.group_cols.is_empty()
    }
}

impl LogicalOperatorTrait for GroupBy {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.group_cols
            .iter()
            .chain(self.aggs.iter().map(|(c, _)| c))
            .collect()
    }

    fn used_columns(&self) -> ColRefSet {
        let mut ret: ColRefSet = self.group_cols.iter().collect();
        for (_, e) in &self.aggs {
            ret.union_with(&e.used_columns());
        }
        ret
    }

    fn derive_keys(&self, _handle: &DeriveHandle) -> KeyCollection {
        KeyCollection::new(vec![self.group_cols.iter().collect()])
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        if self.group_cols.is_empty() {
            Ok(MaxCard::new(1))
        } else {
            Ok(handle.input_prop(0).max_card())
        }
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        Ok(handle
            .input_prop(0)
            .constraint()
            .restricted_to(&self.group_cols.iter().collect()))
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(group_by(
            handle.input_stats(0),
            &self.group_cols,
            &self.agg_cols(),
            handle.context().config(),
        ))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::GroupBy2HashAgg.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalGroupBy",
            std::iter::once(hash_col_seq(&self.group_cols)).chain(
                self.aggs
                    .iter()
                    .map(|(c, e)| hash_all("", [hash_col(c), e.hash_value()])),
            ),
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalGroupBy(o) => {
                equals_col_seq(Some(&self.group_cols), Some(&o.group_cols)) && self.aggs == o.aggs
            }
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator {
        let group_cols = remap_cols(&self.group_cols, mapping, must_exist, factory);
        let aggs = self
            .aggs
            .iter()
            .map(|(c, e)| {
                let e = e.copy_with_remapped_columns(mapping, must_exist, factory);
                (remap_col(c, mapping, must_exist, factory), e)
            })
            .collect();
        LogicalOperator::LogicalGroupBy(GroupBy::new(group_cols, aggs))
    }
}

impl PhysicalOperatorTrait for GroupBy {
    /// Groups are either colocated by hashing on the grouping columns or all gathered on one
    /// segment.
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        let singleton = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
        let mut ret = vec![DerivePropResult::new(singleton.clone(), singleton, 1)];
        if !self.group_cols.is_empty() {
            let hashed =
                PhysicalPropertySet::with_dist(DistributionSpec::hashed(self.group_cols.clone()));
            ret.push(DerivePropResult::new(hashed.clone(), hashed, 1));
        }
        Ok(ret)
    }
}

impl DisplayFields for GroupBy {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("group_cols", &self.group_cols)
            .field(
                "aggs",
                &self
                    .aggs
                    .iter()
                    .map(|(c, e)| format!("{} := {}", c, e))
                    .join(", "),
            )
            .finish()
    }
}

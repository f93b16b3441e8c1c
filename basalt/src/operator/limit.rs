use std::fmt::Formatter;

use enumset::EnumSet;

use crate::column::{remap_col, ColRefMap, ColRefSet, ColumnFactory};
use crate::constraint::ConstraintProperty;
use crate::error::OptResult;
use crate::operator::{
    hash_all, hash_kind, DeriveHandle, DerivePropContext, DerivePropResult, DisplayFields,
    LogicalOperator, LogicalOperatorTrait, PhysicalOperatorTrait,
};
use crate::optimizer::Optimizer;
use crate::properties::{
    DistributionSpec, KeyCollection, LogicalProperty, MaxCard, OrderSpec, Ordering,
    PhysicalPropertySet,
};
use crate::rules::RuleId;
use crate::stat::derive::limit;
use crate::stat::Statistics;

/// Skips `offset` rows in `orders` and keeps at most `count` of the rest.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Limit {
    offset: u64,
    count: Option<u64>,
    orders: OrderSpec,
}

impl Limit {
    pub fn new(offset: u64, count: Option<u64>, orders: OrderSpec) -> Self {
        Self {
            offset,
            count,
            orders,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn orders(&self) -> &OrderSpec {
        &self.orders
    }

    /// Limit equivalent to applying `self` to the output of `inner`.
    ///
    /// `None` when the orderings differ.
    pub fn merge_over(&self, inner: &Limit) -> Option<Limit> {
        if !self.orders.is_empty() && self.orders != inner.orders {
            return None;
        }
        let remaining = inner.count.map(|c| c.saturating_sub(self.offset));
        let count = match (remaining, self.count) {
            (Some(l), Some(r)) => Some(l.min(r)),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        };
        Some(Limit::new(
            inner.offset.saturating_add(self.offset),
            count,
            inner.orders.clone(),
        ))
    }
}

impl LogicalOperatorTrait for Limit {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet {
        handle.input_prop(0).output_cols().clone()
    }

    fn used_columns(&self) -> ColRefSet {
        self.orders.used_columns()
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        handle.input_prop(0).keys().clone()
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        let bound = self.count.map(MaxCard::new).unwrap_or_default();
        Ok(handle.input_prop(0).max_card().min(bound))
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        Ok(handle.input_prop(0).constraint().clone())
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        let input = handle.input_stats(0);
        let after_offset = (input.rows() - self.offset as f64).max(0.0);
        let rows = match self.count {
            Some(c) => after_offset.min(c as f64),
            None => after_offset,
        };
        Ok(limit(input, rows))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::Limit2PhysicalLimit | RuleId::PushLimitBelowProject | RuleId::MergeLimits
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalLimit",
            [
                hash_kind(&self.offset),
                hash_kind(&self.count),
                hash_kind(&self.orders),
            ],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalLimit(o) => self == o,
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator {
        let orders = self
            .orders
            .orders()
            .iter()
            .map(|o| {
                Ordering::new(
                    remap_col(o.column(), mapping, must_exist, factory),
                    o.asc(),
                    o.null_first(),
                )
            })
            .collect();
        LogicalOperator::LogicalLimit(Limit::new(
            self.offset,
            self.count,
            OrderSpec::new(orders),
        ))
    }
}

impl PhysicalOperatorTrait for Limit {
    /// Only a single stream of rows can be limited.
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        let prop = PhysicalPropertySet::new(DistributionSpec::Singleton, self.orders.clone());
        Ok(vec![DerivePropResult::new(prop.clone(), prop, 1)])
    }
}

impl DisplayFields for Limit {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("offset", &self.offset)
            .field("count", &self.count)
            .field("orders", &format!("{}", self.orders))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::operator::Limit;
    use crate::properties::OrderSpec;

    #[test]
    fn test_merge_over() {
        let inner = Limit::new(2, Some(10), OrderSpec::default());

        // Skip 3 of the 10 remaining, keep 5
        let outer = Limit::new(3, Some(5), OrderSpec::default());
        assert_eq!(
            Some(Limit::new(5, Some(5), OrderSpec::default())),
            outer.merge_over(&inner)
        );

        // Only 2 rows left after skipping 8
        let outer = Limit::new(8, None, OrderSpec::default());
        assert_eq!(
            Some(Limit::new(10, Some(2), OrderSpec::default())),
            outer.merge_over(&inner)
        );
    }
}

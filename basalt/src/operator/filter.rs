use std::fmt::Formatter;

use enumset::EnumSet;

use crate::column::{ColRefMap, ColRefSet, ColumnFactory};
use crate::constraint::ConstraintProperty;
use crate::error::OptResult;
use crate::operator::{
    hash_all, DeriveHandle, DerivePropContext, DerivePropResult, DisplayFields, LogicalOperator,
    LogicalOperatorTrait, PhysicalOperatorTrait,
};
use crate::optimizer::Optimizer;
use crate::properties::{KeyCollection, LogicalProperty, MaxCard};
use crate::rules::RuleId;
use crate::scalar::ScalarExpr;
use crate::stat::derive::filter;
use crate::stat::Statistics;

/// Keeps the rows satisfying `predicate`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Select {
    predicate: ScalarExpr,
}

impl Select {
    pub fn new(predicate: ScalarExpr) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> &ScalarExpr {
        &self.predicate
    }
}

impl LogicalOperatorTrait for Select {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet {
        handle.input_prop(0).output_cols().clone()
    }

    fn used_columns(&self) -> ColRefSet {
        self.predicate.used_columns()
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        handle.input_prop(0).keys().clone()
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        if self.predicate.is_constant_false() {
            return Ok(MaxCard::new(0));
        }
        Ok(handle.input_prop(0).max_card())
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        let local = ConstraintProperty::from_predicate(&self.predicate, handle.context().md())?;
        Ok(handle.input_prop(0).constraint().conjoin(&local))
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        let ctx = handle.context();
        filter(
            handle.input_stats(0),
            &self.predicate,
            ctx.md(),
            ctx.config(),
        )
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::Select2Filter.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all("LogicalSelect", [self.predicate.hash_value()])
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalSelect(o) => self.predicate == o.predicate,
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator {
        LogicalOperator::LogicalSelect(Select::new(
            self.predicate
                .copy_with_remapped_columns(mapping, must_exist, factory),
        ))
    }
}

impl PhysicalOperatorTrait for Select {
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(vec![context.pass_through_unary()])
    }
}

impl DisplayFields for Select {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("predicate", &format!("{}", self.predicate))
            .finish()
    }
}

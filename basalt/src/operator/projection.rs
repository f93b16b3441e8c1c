use std::fmt::Formatter;
use std::sync::Arc;

use enumset::EnumSet;
use itertools::Itertools;

use crate::column::{hash_col, remap_col, ColRef, ColRefMap, ColRefSet, ColumnFactory};
use crate::constraint::{
    conjunction, Constraint, ConstraintInterval, ConstraintProperty, LookupStrategy, Range,
};
use crate::error::OptResult;
use crate::operator::{
    hash_all, DeriveHandle, DerivePropContext, DerivePropResult, DisplayFields, LogicalOperator,
    LogicalOperatorTrait, PhysicalOperatorTrait,
};
use crate::optimizer::Optimizer;
use crate::properties::{KeyCollection, LogicalProperty, MaxCard};
use crate::rules::RuleId;
use crate::scalar::ScalarExpr;
use crate::stat::derive::project;
use crate::stat::Statistics;

/// Passes input columns through and computes `exprs` on top of them.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Project {
    exprs: Vec<(ColRef, ScalarExpr)>,
}

impl Project {
    pub fn new(exprs: Vec<(ColRef, ScalarExpr)>) -> Self {
        Self { exprs }
    }

    pub fn exprs(&self) -> &[(ColRef, ScalarExpr)] {
        &self.exprs
    }

    pub fn defined_columns(&self) -> ColRefSet {
        self.exprs.iter().map(|(c, _)| c).collect()
    }
}

impl LogicalOperatorTrait for Project {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet {
        handle
            .input_prop(0)
            .output_cols()
            .union(&self.defined_columns())
    }

    fn used_columns(&self) -> ColRefSet {
        let mut ret = ColRefSet::new();
        for (_, e) in &self.exprs {
            ret.union_with(&e.used_columns());
        }
        ret
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        handle.input_prop(0).keys().clone()
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        Ok(handle.input_prop(0).max_card())
    }

    /// Renamed columns join the equivalence class of their source, constants become point
    /// intervals.
    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        let mut classes = Vec::new();
        let mut intervals = Vec::new();
        for (col, expr) in &self.exprs {
            match expr {
                ScalarExpr::Ident(src) => {
                    classes.push(vec![col.clone(), src.clone()].into_iter().collect())
                }
                ScalarExpr::Const(v) if v.is_null() => intervals.push(Arc::new(
                    Constraint::Interval(ConstraintInterval::null_only(col.clone())),
                )),
                ScalarExpr::Const(v) => intervals.push(Arc::new(Constraint::Interval(
                    ConstraintInterval::new(col.clone(), vec![Range::point(v.clone())], false),
                ))),
                _ => {}
            }
        }

        let local = ConstraintProperty::new(classes, conjunction(intervals, LookupStrategy::Hash));
        Ok(handle.input_prop(0).constraint().conjoin(&local))
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(project(handle.input_stats(0), &self.exprs))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::Project2ComputeScalar.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalProject",
            self.exprs
                .iter()
                .map(|(c, e)| hash_all("", [hash_col(c), e.hash_value()])),
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalProject(o) => self.exprs == o.exprs,
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator {
        let exprs = self
            .exprs
            .iter()
            .map(|(c, e)| {
                let e = e.copy_with_remapped_columns(mapping, must_exist, factory);
                (remap_col(c, mapping, must_exist, factory), e)
            })
            .collect();
        LogicalOperator::LogicalProject(Project::new(exprs))
    }
}

impl PhysicalOperatorTrait for Project {
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(vec![context.pass_through_unary()])
    }
}

impl DisplayFields for Project {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field(
                "exprs",
                &self
                    .exprs
                    .iter()
                    .map(|(c, e)| format!("{} := {}", c, e))
                    .join(", "),
            )
            .finish()
    }
}

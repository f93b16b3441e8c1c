use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use crate::column::{ColRef, ColRefMap, ColRefSet};
use crate::constraint::{
    conjunction, disjunction, ColumnLookup, Constraint, ConstraintRef, ConstraintTrait,
    LookupStrategy,
};
use crate::error::OptResult;
use crate::scalar::{and_all, or_all, ScalarExpr};

/// Flattened children of a conjunction or disjunction with their column index.
#[derive(Clone)]
struct ConstraintArray {
    children: Vec<ConstraintRef>,
    used: ColRefSet,
    lookup: ColumnLookup,
}

impl ConstraintArray {
    fn new(children: Vec<ConstraintRef>, strategy: LookupStrategy) -> Self {
        let mut used = ColRefSet::new();
        for child in &children {
            used.union_with(child.used_columns());
        }
        let lookup = ColumnLookup::build(strategy, &children);
        Self {
            children,
            used,
            lookup,
        }
    }

    /// Children constraining only `col`.
    fn single_column_children(&self, col: &ColRef) -> Arc<Vec<ConstraintRef>> {
        self.lookup.lookup(&self.children, col)
    }

    fn multi_column_children<'a>(
        &'a self,
        col: &'a ColRef,
    ) -> impl Iterator<Item = &'a ConstraintRef> + 'a {
        self.children.iter().filter(move |c| {
            let used = c.used_columns();
            used.len() > 1 && used.contains(col)
        })
    }

    fn remapped_children(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<Vec<ConstraintRef>> {
        self.children
            .iter()
            .map(|c| {
                c.copy_with_remapped_columns(mapping, must_exist)
                    .map(Arc::new)
            })
            .try_collect()
    }
}

/// Logical AND of constraints.
#[derive(Clone)]
pub struct ConstraintConjunction {
    inner: ConstraintArray,
}

impl ConstraintConjunction {
    /// Children must already be flattened, see [`conjunction`] for the normalizing constructor.
    pub(crate) fn new(children: Vec<ConstraintRef>, strategy: LookupStrategy) -> Self {
        debug_assert!(children
            .iter()
            .all(|c| !matches!(c.as_ref(), Constraint::Conjunction(_))));
        Self {
            inner: ConstraintArray::new(children, strategy),
        }
    }

    pub fn children(&self) -> &[ConstraintRef] {
        &self.inner.children
    }

    pub fn lookup_strategy(&self) -> LookupStrategy {
        self.inner.lookup.strategy()
    }
}

impl ConstraintTrait for ConstraintConjunction {
    fn is_contradiction(&self) -> bool {
        self.inner.children.iter().any(|c| c.is_contradiction())
    }

    fn is_unbounded(&self) -> bool {
        self.inner.children.iter().all(|c| c.is_unbounded())
    }

    fn used_columns(&self) -> &ColRefSet {
        &self.inner.used
    }

    fn constraint_on_column(&self, col: &ColRef) -> Option<ConstraintRef> {
        if !self.inner.used.contains(col) {
            return None;
        }

        let single = self.inner.single_column_children(col);
        let projections = single
            .iter()
            .chain(self.inner.multi_column_children(col))
            .filter_map(|c| c.constraint_on_column(col))
            .filter(|c| !c.is_unbounded())
            .collect::<Vec<_>>();

        conjunction(projections, LookupStrategy::Array)
    }

    fn constraint_on_columns(&self, cols: &ColRefSet) -> Option<ConstraintRef> {
        let projections = self
            .inner
            .children
            .iter()
            .filter(|c| !c.used_columns().is_disjoint(cols))
            .filter_map(|c| c.constraint_on_columns(cols))
            .filter(|c| !c.is_unbounded())
            .collect::<Vec<_>>();

        conjunction(projections, LookupStrategy::Array)
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<Constraint> {
        let children = self.inner.remapped_children(mapping, must_exist)?;
        Ok(Constraint::Conjunction(Self::new(
            children,
            self.lookup_strategy(),
        )))
    }

    fn to_scalar(&self) -> ScalarExpr {
        and_all(self.inner.children.iter().map(|c| c.to_scalar()))
            .unwrap_or_else(|| crate::scalar::lit(true.into()))
    }
}

impl PartialEq for ConstraintConjunction {
    fn eq(&self, other: &Self) -> bool {
        self.inner.children == other.inner.children
    }
}

impl Debug for ConstraintConjunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.inner
                .children
                .iter()
                .map(|c| format!("{:?}", c))
                .join(" AND ")
        )
    }
}

/// Logical OR of constraints.
#[derive(Clone)]
pub struct ConstraintDisjunction {
    inner: ConstraintArray,
}

impl ConstraintDisjunction {
    /// Children must already be flattened, see [`disjunction`] for the normalizing constructor.
    pub(crate) fn new(children: Vec<ConstraintRef>, strategy: LookupStrategy) -> Self {
        debug_assert!(children
            .iter()
            .all(|c| !matches!(c.as_ref(), Constraint::Disjunction(_))));
        Self {
            inner: ConstraintArray::new(children, strategy),
        }
    }

    pub fn children(&self) -> &[ConstraintRef] {
        &self.inner.children
    }

    pub fn lookup_strategy(&self) -> LookupStrategy {
        self.inner.lookup.strategy()
    }
}

impl ConstraintTrait for ConstraintDisjunction {
    fn is_contradiction(&self) -> bool {
        self.inner.children.iter().all(|c| c.is_contradiction())
    }

    fn is_unbounded(&self) -> bool {
        self.inner.children.iter().any(|c| c.is_unbounded())
    }

    fn used_columns(&self) -> &ColRefSet {
        &self.inner.used
    }

    fn constraint_on_column(&self, col: &ColRef) -> Option<ConstraintRef> {
        if !self.inner.used.contains(col) {
            return None;
        }

        // Every branch must bound the column, a branch without a bound admits any value
        let mut projections = Vec::with_capacity(self.inner.children.len());
        for child in self.inner.children.iter().filter(|c| !c.is_contradiction()) {
            match child.constraint_on_column(col) {
                Some(c) if !c.is_unbounded() => projections.push(c),
                _ => return None,
            }
        }

        disjunction(projections, LookupStrategy::Array)
    }

    fn constraint_on_columns(&self, cols: &ColRefSet) -> Option<ConstraintRef> {
        let mut projections = Vec::with_capacity(self.inner.children.len());
        for child in self.inner.children.iter().filter(|c| !c.is_contradiction()) {
            match child.constraint_on_columns(cols) {
                Some(c) if !c.is_unbounded() => projections.push(c),
                _ => return None,
            }
        }

        disjunction(projections, LookupStrategy::Array)
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<Constraint> {
        let children = self.inner.remapped_children(mapping, must_exist)?;
        Ok(Constraint::Disjunction(Self::new(
            children,
            self.lookup_strategy(),
        )))
    }

    fn to_scalar(&self) -> ScalarExpr {
        or_all(self.inner.children.iter().map(|c| c.to_scalar()))
            .unwrap_or_else(|| crate::scalar::lit(false.into()))
    }
}

impl PartialEq for ConstraintDisjunction {
    fn eq(&self, other: &Self) -> bool {
        self.inner.children == other.inner.children
    }
}

impl Debug for ConstraintDisjunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.inner
                .children
                .iter()
                .map(|c| format!("{:?}", c))
                .join(" OR ")
        )
    }
}

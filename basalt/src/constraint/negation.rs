use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::column::{ColRef, ColRefMap, ColRefSet};
use crate::constraint::{negation, Constraint, ConstraintRef, ConstraintTrait};
use crate::error::OptResult;
use crate::scalar::{not, ScalarExpr};

/// Logical NOT of a constraint that has no direct complement, e.g. of a conjunction over
/// several columns.
#[derive(Clone, PartialEq)]
pub struct ConstraintNegation {
    child: ConstraintRef,
}

impl ConstraintNegation {
    pub(crate) fn new(child: ConstraintRef) -> Self {
        Self { child }
    }

    pub fn child(&self) -> &ConstraintRef {
        &self.child
    }
}

impl ConstraintTrait for ConstraintNegation {
    fn is_contradiction(&self) -> bool {
        self.child.is_unbounded()
    }

    fn is_unbounded(&self) -> bool {
        self.child.is_contradiction()
    }

    fn used_columns(&self) -> &ColRefSet {
        self.child.used_columns()
    }

    fn constraint_on_column(&self, col: &ColRef) -> Option<ConstraintRef> {
        let used = self.used_columns();
        if used.len() == 1 && used.contains(col) {
            self.child
                .constraint_on_column(col)
                .map(|c| negation(c))
        } else {
            None
        }
    }

    fn constraint_on_columns(&self, cols: &ColRefSet) -> Option<ConstraintRef> {
        if self.used_columns().is_subset(cols) {
            Some(Arc::new(Constraint::Negation(self.clone())))
        } else {
            None
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<Constraint> {
        let child = self.child.copy_with_remapped_columns(mapping, must_exist)?;
        Ok(Constraint::Negation(Self::new(Arc::new(child))))
    }

    fn to_scalar(&self) -> ScalarExpr {
        not(self.child.to_scalar())
    }
}

impl Debug for ConstraintNegation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NOT {:?}", self.child)
    }
}

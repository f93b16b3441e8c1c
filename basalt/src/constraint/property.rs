use std::sync::Arc;

use crate::catalog::MetadataAccessor;
use crate::column::{ColRefMap, ColRefSet};
use crate::constraint::{
    conjunction, constraint_from_scalar, disjunction, ConstraintRef, ConstraintTrait,
    LookupStrategy,
};
use crate::error::OptResult;
use crate::scalar::ScalarExpr;

/// Derived constraint property of a relation: column equivalence classes plus a constraint on
/// column values.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct ConstraintProperty {
    equiv_classes: Vec<ColRefSet>,
    constraint: Option<ConstraintRef>,
}

/// Unions classes sharing a column until all classes are disjoint. Singleton classes are
/// dropped.
fn merge_equiv_classes(classes: Vec<ColRefSet>) -> Vec<ColRefSet> {
    let mut merged: Vec<ColRefSet> = Vec::with_capacity(classes.len());
    for class in classes {
        let mut current = class;
        let mut i = 0;
        while i < merged.len() {
            if merged[i].is_disjoint(&current) {
                i += 1;
            } else {
                current.union_with(&merged.swap_remove(i));
                i = 0;
            }
        }
        merged.push(current);
    }
    merged.retain(|c| c.len() > 1);
    merged
}

/// Copies what is known about each column of a class onto the other members.
fn propagate(classes: &[ColRefSet], constraint: Option<ConstraintRef>) -> Option<ConstraintRef> {
    let constraint = constraint?;
    let mut children = vec![constraint.clone()];
    for class in classes {
        for src in class.iter() {
            let on_src = match constraint.constraint_on_column(src) {
                Some(c) => c,
                None => continue,
            };
            for dst in class.iter().filter(|c| *c != src) {
                let mut mapping = ColRefMap::new();
                mapping.insert(src, dst.clone());
                if let Ok(copy) = on_src.copy_with_remapped_columns(&mapping, false) {
                    children.push(Arc::new(copy));
                }
            }
        }
    }

    if children.len() == 1 {
        Some(constraint)
    } else {
        conjunction(children, LookupStrategy::Hash)
    }
}

impl ConstraintProperty {
    pub fn new(equiv_classes: Vec<ColRefSet>, constraint: Option<ConstraintRef>) -> Self {
        let equiv_classes = merge_equiv_classes(equiv_classes);
        let constraint = propagate(&equiv_classes, constraint);
        Self {
            equiv_classes,
            constraint,
        }
    }

    /// Property implied by a filter predicate: `col = col` conjuncts become equivalence
    /// classes, the rest is converted to a constraint.
    pub fn from_predicate(pred: &ScalarExpr, md: &dyn MetadataAccessor) -> OptResult<Self> {
        let mut classes = Vec::new();
        let mut constraints = Vec::new();
        for conjunct in pred.conjuncts() {
            if let Some((l, r)) = conjunct.as_column_equality() {
                classes.push(vec![l.clone(), r.clone()].into_iter().collect());
            } else if let Some(c) = constraint_from_scalar(conjunct, md)? {
                constraints.push(c);
            }
        }

        Ok(Self::new(
            classes,
            conjunction(constraints, LookupStrategy::Hash),
        ))
    }

    pub fn equiv_classes(&self) -> &[ColRefSet] {
        &self.equiv_classes
    }

    pub fn constraint(&self) -> Option<&ConstraintRef> {
        self.constraint.as_ref()
    }

    pub fn is_contradiction(&self) -> bool {
        self.constraint
            .as_ref()
            .map(|c| c.is_contradiction())
            .unwrap_or(false)
    }

    /// Both properties hold, as for a filter over a relation or an inner join.
    pub fn conjoin(&self, other: &ConstraintProperty) -> ConstraintProperty {
        let classes = self
            .equiv_classes
            .iter()
            .chain(other.equiv_classes.iter())
            .cloned()
            .collect();
        let constraint = conjunction(
            self.constraint
                .iter()
                .chain(other.constraint.iter())
                .cloned()
                .collect(),
            LookupStrategy::Hash,
        );
        Self::new(classes, constraint)
    }

    /// Either property holds, as for rows of a union.
    pub fn disjoin(&self, other: &ConstraintProperty) -> ConstraintProperty {
        let mut classes = Vec::new();
        for l in &self.equiv_classes {
            for r in &other.equiv_classes {
                let common = l.intersection(r);
                if common.len() > 1 {
                    classes.push(common);
                }
            }
        }
        let constraint = match (&self.constraint, &other.constraint) {
            (Some(l), Some(r)) => disjunction(vec![l.clone(), r.clone()], LookupStrategy::Hash),
            _ => None,
        };
        Self::new(classes, constraint)
    }

    /// Keeps only what is known about `cols`.
    pub fn restricted_to(&self, cols: &ColRefSet) -> ConstraintProperty {
        let classes = self
            .equiv_classes
            .iter()
            .map(|c| c.intersection(cols))
            .collect();
        let constraint = self
            .constraint
            .as_ref()
            .and_then(|c| c.constraint_on_columns(cols));
        Self::new(classes, constraint)
    }

    pub fn copy_with_remapped_columns(
        &self,
        mapping: &ColRefMap,
        must_exist: bool,
    ) -> OptResult<ConstraintProperty> {
        let mut classes = Vec::with_capacity(self.equiv_classes.len());
        for class in &self.equiv_classes {
            let mut remapped = ColRefSet::new();
            for c in class.iter() {
                match mapping.get(c) {
                    Some(mapped) => remapped.insert(mapped.clone()),
                    None if must_exist => {
                        return Err(crate::error::OptError::UnmappedColumn { column: c.id() }.into())
                    }
                    None => remapped.insert(c.clone()),
                }
            }
            classes.push(remapped);
        }

        let constraint = match &self.constraint {
            Some(c) => Some(Arc::new(c.copy_with_remapped_columns(mapping, must_exist)?)),
            None => None,
        };
        Ok(Self::new(classes, constraint))
    }
}

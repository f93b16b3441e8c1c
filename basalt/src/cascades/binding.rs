use std::rc::Rc;
use std::vec::IntoIter;

use itertools::Itertools;

use crate::cascades::memo::Memo;
use crate::cascades::{CascadesOptimizer, GroupExprId};
use crate::rules::{OptExpression, Pattern};

type OptExpr = OptExpression<CascadesOptimizer>;

/// Enumerates every way `pattern` matches logical expressions of the memo.
#[derive(Clone)]
pub(super) struct Binding<'a, 'b> {
    group_expr_ids: Rc<Vec<GroupExprId>>,
    memo: &'a Memo,
    pattern: &'b Pattern,
}

pub(super) struct BindingIterator<'a, 'b, I> {
    binding: Binding<'a, 'b>,
    iter: I,
}

impl<'a, 'b> Clone for BindingIterator<'a, 'b, IntoIter<OptExpr>> {
    fn clone(&self) -> Self {
        let iter = self.binding.clone().bind();
        Self {
            binding: self.binding.clone(),
            iter,
        }
    }
}

impl<'a, 'b, I> Iterator for BindingIterator<'a, 'b, I>
where
    I: Iterator<Item = OptExpr>,
{
    type Item = OptExpr;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

impl<'a, 'b> IntoIterator for Binding<'a, 'b> {
    type IntoIter = BindingIterator<'a, 'b, IntoIter<OptExpr>>;
    type Item = OptExpr;

    fn into_iter(self) -> Self::IntoIter {
        let iter = self.clone().bind();
        BindingIterator {
            binding: self,
            iter,
        }
    }
}

impl<'a, 'b> Binding<'a, 'b> {
    pub(super) fn new(group_expr_id: GroupExprId, pattern: &'b Pattern, memo: &'a Memo) -> Self {
        Self {
            group_expr_ids: Rc::new(vec![group_expr_id]),
            memo,
            pattern,
        }
    }

    fn bind(self) -> IntoIter<OptExpr> {
        if self.pattern.binds_group {
            return self
                .group_expr_ids
                .first()
                .map(|group_expr_id| OptExpr::with_group_handle(group_expr_id.group_id))
                .into_iter()
                .collect::<Vec<OptExpr>>()
                .into_iter();
        }

        let matched_group_ids: Vec<GroupExprId> = {
            self.group_expr_ids
                .iter()
                .filter(|group_expr_id| {
                    self.memo[**group_expr_id].matches_without_children(self.pattern)
                })
                .copied()
                .collect()
        };

        if let Some(children_patterns) = &self.pattern.children {
            matched_group_ids
                .into_iter()
                .flat_map(move |group_expr_id| {
                    let logical_group_expr = &self.memo[group_expr_id];
                    let children_bindings = children_patterns
                        .iter()
                        .zip(logical_group_expr.input_group_ids())
                        .map(|(pattern, group_id)| Binding {
                            group_expr_ids: Rc::new(self.memo[group_id].logical_group_expr_ids()),
                            pattern,
                            memo: self.memo,
                        })
                        .multi_cartesian_product();

                    children_bindings
                        .into_iter()
                        .map(move |inputs| OptExpression::with_expr_handle(group_expr_id, inputs))
                })
                .collect::<Vec<OptExpr>>()
                .into_iter()
        } else {
            matched_group_ids
                .into_iter()
                .map(|group_expr_id| {
                    OptExpression::with_expr_handle(
                        group_expr_id,
                        self.memo[group_expr_id]
                            .inputs()
                            .iter()
                            .map(|group_id| OptExpr::with_group_handle(*group_id))
                            .collect::<Vec<OptExpr>>(),
                    )
                })
                .collect::<Vec<OptExpr>>()
                .into_iter()
        }
    }
}

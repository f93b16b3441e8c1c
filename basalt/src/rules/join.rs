use anyhow::bail;
use datafusion_common::ScalarValue;

use crate::error::OptResult;
use crate::operator::LogicalOperator::{
    LogicalDynamicGet, LogicalGet, LogicalIndexApply, LogicalJoin, LogicalSelect,
};
use crate::operator::Operator::Logical;
use crate::operator::{IndexApply, Join, JoinType, Operator, Select};
use crate::optimizer::Optimizer;
use crate::rules::RulePromise::{Low, Medium};
use crate::rules::{
    pattern, OptExpression, PatterBuilder, Pattern, Rule, RuleId, RulePromise, RuleResult,
};
use crate::scalar::{and_all, lit, ScalarExpr};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref JOIN_COMMUTATIVITY_RULE_PATTERN: Pattern = {
        pattern(is_inner_join)
        .finish()
    };
    static ref JOIN_ASSOCIATIVITY_RULE_PATTERN: Pattern = {
        pattern(is_inner_join)
            .leaf(is_inner_join)
            .group()
        .finish()
    };
    static ref INNER_JOIN_SEMI_JOIN_SWAP_RULE_PATTERN: Pattern = {
        pattern(is_inner_join)
            .leaf(InnerJoinSemiJoinSwapRule::matches)
            .group()
        .finish()
    };
    static ref INNER_JOIN_ANTI_SEMI_JOIN_SWAP_RULE_PATTERN: Pattern = {
        pattern(is_inner_join)
            .leaf(InnerJoinAntiSemiJoinSwapRule::matches)
            .group()
        .finish()
    };
    static ref INNER_JOIN_2_INDEX_APPLY_RULE_PATTERN: Pattern = {
        pattern(is_inner_join)
            .group()
            .leaf(|op| matches!(op, Logical(LogicalGet(_)) | Logical(LogicalDynamicGet(_))))
        .finish()
    };
}

fn is_inner_join(op: &Operator) -> bool {
    match op {
        Logical(LogicalJoin(join)) => matches!(join.join_type(), JoinType::Inner),
        _ => false,
    }
}

fn join_of<'a, O: Optimizer>(expr: &'a OptExpression<O>, ctx: &'a O) -> OptResult<&'a Join> {
    match expr.get_operator(ctx)? {
        Logical(LogicalJoin(join)) => Ok(join),
        _ => bail!("Pattern mismatch"),
    }
}

fn true_predicate() -> ScalarExpr {
    lit(ScalarValue::Boolean(Some(true)))
}

/// Commutate inner join inputs.
#[derive(Clone)]
pub struct JoinCommutativityRule {}

impl JoinCommutativityRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for JoinCommutativityRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        let op = input.get_operator(ctx)?.clone();
        let ret = OptExpression::with_operator(op, vec![input[1].clone(), input[0].clone()]);
        result.add(ret);
        Ok(())
    }

    fn pattern(&self) -> &Pattern {
        &JOIN_COMMUTATIVITY_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::JoinCommutativity
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

/// Rotates `(A join B) join C` into `A join (B join C)`.
///
/// Conjuncts referencing only `B` and `C` move to the new lower join, the rest stay on top. The
/// rotation is skipped when the new lower join would be a cross product.
#[derive(Clone)]
pub struct JoinAssociativityRule {}

impl JoinAssociativityRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for JoinAssociativityRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        let upper = join_of(&input, ctx)?;
        let lower = join_of(&input[0], ctx)?;

        let (a, b, c) = (
            input[0][0].clone(),
            input[0][1].clone(),
            input[1].clone(),
        );
        let bc_cols = b
            .logical_prop(ctx)?
            .output_cols()
            .union(c.logical_prop(ctx)?.output_cols());

        let (lower_preds, upper_preds): (Vec<ScalarExpr>, Vec<ScalarExpr>) = lower
            .predicate()
            .conjuncts()
            .into_iter()
            .chain(upper.predicate().conjuncts())
            .filter(|p| !p.is_constant_true())
            .cloned()
            .partition(|p| p.used_columns().is_subset(&bc_cols));

        let lower_pred = match and_all(lower_preds) {
            Some(p) => p,
            None => return Ok(()),
        };
        let upper_pred = and_all(upper_preds).unwrap_or_else(true_predicate);

        let new_lower = OptExpression::with_operator(
            Logical(LogicalJoin(Join::new(JoinType::Inner, lower_pred))),
            vec![b, c],
        );
        result.add(OptExpression::with_operator(
            Logical(LogicalJoin(Join::new(JoinType::Inner, upper_pred))),
            vec![a, new_lower],
        ));
        Ok(())
    }

    fn pattern(&self) -> &Pattern {
        &JOIN_ASSOCIATIVITY_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::JoinAssociativity
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

/// Swaps a semi join below an inner join with it.
///
/// `(A semi B) join C` becomes `(A join C) semi B`. The inner join can't reference `B`, since a
/// semi join only produces the columns of `A`.
fn swap_with_inner_join<O: Optimizer>(
    input: &OptExpression<O>,
    ctx: &O,
    result: &mut RuleResult<O>,
) -> OptResult<()> {
    let inner = join_of(input, ctx)?;
    let semi = join_of(&input[0], ctx)?;

    let (a, b, c) = (
        input[0][0].clone(),
        input[0][1].clone(),
        input[1].clone(),
    );
    let new_inner = OptExpression::with_operator(Logical(LogicalJoin(inner.clone())), vec![a, c]);
    result.add(OptExpression::with_operator(
        Logical(LogicalJoin(semi.clone())),
        vec![new_inner, b],
    ));
    Ok(())
}

#[derive(Clone)]
pub struct InnerJoinSemiJoinSwapRule {}

impl InnerJoinSemiJoinSwapRule {
    pub fn new() -> Self {
        Self {}
    }

    fn matches(op: &Operator) -> bool {
        match op {
            Logical(LogicalJoin(join)) => join.join_type() == JoinType::LeftSemi,
            _ => false,
        }
    }
}

impl Rule for InnerJoinSemiJoinSwapRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        swap_with_inner_join(&input, ctx, result)
    }

    fn pattern(&self) -> &Pattern {
        &INNER_JOIN_SEMI_JOIN_SWAP_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::InnerJoinSemiJoinSwap
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

#[derive(Clone)]
pub struct InnerJoinAntiSemiJoinSwapRule {}

impl InnerJoinAntiSemiJoinSwapRule {
    pub fn new() -> Self {
        Self {}
    }

    fn matches(op: &Operator) -> bool {
        match op {
            Logical(LogicalJoin(join)) => matches!(
                join.join_type(),
                JoinType::LeftAntiSemi | JoinType::LeftAntiSemiNotIn
            ),
            _ => false,
        }
    }
}

impl Rule for InnerJoinAntiSemiJoinSwapRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        swap_with_inner_join(&input, ctx, result)
    }

    fn pattern(&self) -> &Pattern {
        &INNER_JOIN_ANTI_SEMI_JOIN_SWAP_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::InnerJoinAntiSemiJoinSwap
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

/// Turns an inner join with a table scan as inner input into an index apply.
///
/// The join predicate moves into a select over the scan, evaluated per outer row with the outer
/// columns it references bound. Table keys serve as indexes: the predicate must reference all
/// columns of one of them, and at least one outer column.
#[derive(Clone)]
pub struct InnerJoin2IndexApplyRule {}

impl InnerJoin2IndexApplyRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for InnerJoin2IndexApplyRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        let join = join_of(&input, ctx)?;
        let used = join.predicate().used_columns();
        let outer_cols = input[0].logical_prop(ctx)?.output_cols();
        let inner_keys = input[1].logical_prop(ctx)?.keys();

        let outer_refs: Vec<_> = outer_cols
            .iter()
            .filter(|c| used.contains(c))
            .cloned()
            .collect();
        let has_index = inner_keys.keys().iter().any(|key| key.is_subset(&used));
        if outer_refs.is_empty() || !has_index {
            return Ok(());
        }

        let inner = OptExpression::with_operator(
            Logical(LogicalSelect(Select::new(join.predicate().clone()))),
            vec![OptExpression::with_group_handle(input[1].group_handle(ctx)?)],
        );
        result.add(OptExpression::with_operator(
            Logical(LogicalIndexApply(IndexApply::new(
                JoinType::Inner,
                true_predicate(),
                outer_refs,
            ))),
            vec![input[0].clone(), inner],
        ));
        Ok(())
    }

    fn pattern(&self) -> &Pattern {
        &INNER_JOIN_2_INDEX_APPLY_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::InnerJoin2IndexApply
    }

    fn rule_promise(&self) -> RulePromise {
        Low
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;

    use crate::cascades::CascadesOptimizer;
    use crate::operator::LogicalOperator::{LogicalIndexApply, LogicalJoin, LogicalSelect};
    use crate::operator::Operator::Logical;
    use crate::operator::{IndexApply, Join, JoinType, Select};
    use crate::optimizer::OptimizerContext;
    use crate::plan::LogicalPlanBuilder;
    use crate::properties::PhysicalPropertySet;
    use crate::rules::{
        InnerJoin2IndexApplyRule, InnerJoinSemiJoinSwapRule, JoinAssociativityRule,
        JoinCommutativityRule, OptExpression,
    };
    use crate::scalar::{and_all, col, eq, lit};
    use crate::test_utils::{scan_columns, table_and_columns, table_with_columns};

    #[test]
    fn test_join_commutativity() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let right = builder.get(t2, b.clone()).build().unwrap().root();
        let pred = eq(col(&a[0]), col(&b[0]));
        let plan = builder
            .get(t1, a)
            .join(JoinType::Inner, pred.clone(), right)
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&JoinCommutativityRule::new().into())
            .unwrap();

        let (left, right) = optimizer.root_input_groups();
        let expected = OptExpression::with_operator(
            Logical(LogicalJoin(Join::new(JoinType::Inner, pred))),
            vec![
                OptExpression::with_group_handle(right),
                OptExpression::with_group_handle(left),
            ],
        );
        assert_eq!(vec![expected], results);
    }

    #[test]
    fn test_join_associativity() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);
        let (t3, c) = table_and_columns(factory, 3, "t3", &[("c", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let t2_plan = builder.get(t2, b.clone()).build().unwrap().root();
        let t3_plan = builder.get(t3, c.clone()).build().unwrap().root();
        let a_b = eq(col(&a[0]), col(&b[0]));
        let b_c = eq(col(&b[0]), col(&c[0]));
        let a_c = eq(col(&a[0]), col(&c[0]));
        let plan = builder
            .get(t1, a)
            .join(JoinType::Inner, a_b.clone(), t2_plan)
            .join(
                JoinType::Inner,
                and_all(vec![b_c.clone(), a_c.clone()]).unwrap(),
                t3_plan,
            )
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&JoinAssociativityRule::new().into())
            .unwrap();

        // A join (B join C on b = c) on a = b and a = c
        assert_eq!(1, results.len());
        let upper = results[0].get_operator(&optimizer).unwrap();
        assert_eq!(
            &Logical(LogicalJoin(Join::new(
                JoinType::Inner,
                and_all(vec![a_b, a_c]).unwrap()
            ))),
            upper
        );
        let lower = results[0][1].get_operator(&optimizer).unwrap();
        assert_eq!(
            &Logical(LogicalJoin(Join::new(JoinType::Inner, b_c))),
            lower
        );
    }

    #[test]
    fn test_associativity_skips_cross_product() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);
        let (t3, c) = table_and_columns(factory, 3, "t3", &[("c", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let t2_plan = builder.get(t2, b.clone()).build().unwrap().root();
        let t3_plan = builder.get(t3, c.clone()).build().unwrap().root();
        let plan = builder
            .get(t1, a.clone())
            .join(JoinType::Inner, eq(col(&a[0]), col(&b[0])), t2_plan)
            .join(JoinType::Inner, eq(col(&a[0]), col(&c[0])), t3_plan)
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&JoinAssociativityRule::new().into())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_inner_join_semi_join_swap() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);
        let (t3, c) = table_and_columns(factory, 3, "t3", &[("c", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let t2_plan = builder.get(t2, b.clone()).build().unwrap().root();
        let t3_plan = builder.get(t3, c.clone()).build().unwrap().root();
        let semi_pred = eq(col(&a[0]), col(&b[0]));
        let inner_pred = eq(col(&a[0]), col(&c[0]));
        let plan = builder
            .get(t1, a)
            .join(JoinType::LeftSemi, semi_pred.clone(), t2_plan)
            .join(JoinType::Inner, inner_pred.clone(), t3_plan)
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&InnerJoinSemiJoinSwapRule::new().into())
            .unwrap();

        assert_eq!(1, results.len());
        assert_eq!(
            &Logical(LogicalJoin(Join::new(JoinType::LeftSemi, semi_pred))),
            results[0].get_operator(&optimizer).unwrap()
        );
        assert_eq!(
            &Logical(LogicalJoin(Join::new(JoinType::Inner, inner_pred))),
            results[0][0].get_operator(&optimizer).unwrap()
        );
    }

    #[test]
    fn test_inner_join_to_index_apply() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let t2 = Arc::new(
            table_with_columns(2, "t2", &[("b", DataType::Int32)])
                .as_ref()
                .clone()
                .with_keys(vec![vec![0]]),
        );
        let b = scan_columns(factory, &t2);

        let mut builder = LogicalPlanBuilder::new();
        let right = builder.get(t2, b.clone()).build().unwrap().root();
        let pred = eq(col(&a[0]), col(&b[0]));
        let plan = builder
            .get(t1, a.clone())
            .join(JoinType::Inner, pred.clone(), right)
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&InnerJoin2IndexApplyRule::new().into())
            .unwrap();

        let (left, right) = optimizer.root_input_groups();
        let expected = OptExpression::with_operator(
            Logical(LogicalIndexApply(IndexApply::new(
                JoinType::Inner,
                lit(ScalarValue::Boolean(Some(true))),
                a,
            ))),
            vec![
                OptExpression::with_group_handle(left),
                OptExpression::with_operator(
                    Logical(LogicalSelect(Select::new(pred))),
                    vec![OptExpression::with_group_handle(right)],
                ),
            ],
        );
        assert_eq!(vec![expected], results);
    }

    #[test]
    fn test_index_apply_needs_inner_key() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let right = builder.get(t2, b.clone()).build().unwrap().root();
        let plan = builder
            .get(t1, a.clone())
            .join(JoinType::Inner, eq(col(&a[0]), col(&b[0])), right)
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&InnerJoin2IndexApplyRule::new().into())
            .unwrap();
        assert!(results.is_empty());
    }
}

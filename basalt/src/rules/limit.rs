use anyhow::bail;

use crate::error::OptResult;
use crate::operator::LogicalOperator::{LogicalLimit, LogicalProject};
use crate::operator::Operator;
use crate::operator::Operator::Logical;
use crate::optimizer::Optimizer;
use crate::rules::RulePromise::Medium;
use crate::rules::{
    pattern, OptExpression, PatterBuilder, Pattern, Rule, RuleId, RulePromise, RuleResult,
};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref PUSH_LIMIT_BELOW_PROJECT_RULE_PATTERN: Pattern = {
        pattern(is_limit)
            .leaf(|op| matches!(op, Logical(LogicalProject(_))))
        .finish()
    };
    static ref MERGE_LIMITS_RULE_PATTERN: Pattern = {
        pattern(is_limit)
            .leaf(is_limit)
        .finish()
    };
}

fn is_limit(op: &Operator) -> bool {
    matches!(op, Logical(LogicalLimit(_)))
}

/// Pushes a limit below a projection not computing any of the columns it orders by.
#[derive(Clone)]
pub struct PushLimitBelowProjectRule {}

impl PushLimitBelowProjectRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushLimitBelowProjectRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        let limit = match input.get_operator(ctx)? {
            Logical(LogicalLimit(limit)) => limit,
            _ => bail!("Pattern mismatch"),
        };
        let project = match input[0].get_operator(ctx)? {
            Logical(LogicalProject(project)) => project,
            _ => bail!("Pattern mismatch"),
        };

        if !limit
            .orders()
            .used_columns()
            .is_disjoint(&project.defined_columns())
        {
            return Ok(());
        }

        let new_limit = OptExpression::with_operator(
            Logical(LogicalLimit(limit.clone())),
            input[0].inputs().to_vec(),
        );
        result.add(OptExpression::with_operator(
            Logical(LogicalProject(project.clone())),
            vec![new_limit],
        ));
        Ok(())
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_LIMIT_BELOW_PROJECT_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::PushLimitBelowProject
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

/// Replaces a limit over a limit with a single one.
#[derive(Clone)]
pub struct MergeLimitsRule {}

impl MergeLimitsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for MergeLimitsRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        let (outer, inner) = match (input.get_operator(ctx)?, input[0].get_operator(ctx)?) {
            (Logical(LogicalLimit(outer)), Logical(LogicalLimit(inner))) => (outer, inner),
            _ => bail!("Pattern mismatch"),
        };

        if let Some(merged) = outer.merge_over(inner) {
            result.add(OptExpression::with_operator(
                Logical(LogicalLimit(merged)),
                input[0].inputs().to_vec(),
            ));
        }
        Ok(())
    }

    fn pattern(&self) -> &Pattern {
        &MERGE_LIMITS_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::MergeLimits
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;

    use crate::cascades::CascadesOptimizer;
    use crate::operator::LogicalOperator::{LogicalLimit, LogicalProject};
    use crate::operator::Operator::Logical;
    use crate::operator::{Limit, Project};
    use crate::optimizer::OptimizerContext;
    use crate::plan::LogicalPlanBuilder;
    use crate::properties::{OrderSpec, Ordering, PhysicalPropertySet};
    use crate::rules::{MergeLimitsRule, OptExpression, PushLimitBelowProjectRule};
    use crate::scalar::lit;
    use crate::test_utils::table_and_columns;

    #[test]
    fn test_push_limit_below_project() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let one = factory.create(DataType::Int32, "one");

        // Ordered by a column of the input
        {
            let exprs = vec![(one.clone(), lit(ScalarValue::Int32(Some(1))))];
            let orders = OrderSpec::new(vec![Ordering::new(a[0].clone(), true, false)]);
            let plan = LogicalPlanBuilder::new()
                .get(t1.clone(), a.clone())
                .project(exprs.clone())
                .limit(0, Some(10), orders.clone())
                .build()
                .unwrap();

            let optimizer = CascadesOptimizer::new(
                OptimizerContext::default(),
                plan,
                PhysicalPropertySet::any(),
            )
            .unwrap();
            let results = optimizer
                .apply_to_root(&PushLimitBelowProjectRule::new().into())
                .unwrap();

            let scan_group = optimizer.group_below_root(2);
            let expected = OptExpression::with_operator(
                Logical(LogicalProject(Project::new(exprs))),
                vec![OptExpression::with_operator(
                    Logical(LogicalLimit(Limit::new(0, Some(10), orders))),
                    vec![OptExpression::with_group_handle(scan_group)],
                )],
            );
            assert_eq!(vec![expected], results);
        }

        // Ordered by a computed column
        {
            let exprs = vec![(one.clone(), lit(ScalarValue::Int32(Some(1))))];
            let orders = OrderSpec::new(vec![Ordering::new(one.clone(), true, false)]);
            let plan = LogicalPlanBuilder::new()
                .get(t1, a)
                .project(exprs)
                .limit(0, Some(10), orders)
                .build()
                .unwrap();

            let optimizer = CascadesOptimizer::new(
                OptimizerContext::default(),
                plan,
                PhysicalPropertySet::any(),
            )
            .unwrap();
            let results = optimizer
                .apply_to_root(&PushLimitBelowProjectRule::new().into())
                .unwrap();
            assert!(results.is_empty());
        }
    }

    #[test]
    fn test_merge_limits() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);

        let plan = LogicalPlanBuilder::new()
            .get(t1, a)
            .limit(2, Some(10), OrderSpec::default())
            .limit(3, Some(5), OrderSpec::default())
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&MergeLimitsRule::new().into())
            .unwrap();

        let scan_group = optimizer.group_below_root(2);
        let expected = OptExpression::with_operator(
            Logical(LogicalLimit(Limit::new(5, Some(5), OrderSpec::default()))),
            vec![OptExpression::with_group_handle(scan_group)],
        );
        assert_eq!(vec![expected], results);
    }
}

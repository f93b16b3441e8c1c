use anyhow::bail;

use crate::error::OptResult;
use crate::operator::LogicalOperator::{LogicalJoin, LogicalSetOp};
use crate::operator::Operator::{Logical, Physical};
use crate::operator::PhysicalOperator::{
    PhysicalHashJoin, PhysicalHashSetOp, PhysicalNestedLoopJoin, PhysicalUnionAll,
};
use crate::operator::{
    HashSetOp, LogicalOperator, NestedLoopJoin, Operator, PhysicalOperator, SetOpKind,
};
use crate::optimizer::Optimizer;
use crate::rules::RulePromise::High;
use crate::rules::{
    pattern, OptExpression, PatterBuilder, Pattern, Rule, RuleId, RulePromise, RuleResult,
};
use crate::stat::derive::JoinPredicateInfo;

/// Implementation rule replacing a logical operator with the physical operator wrapping the
/// same parameters.
macro_rules! one_to_one_rule {
    ($(#[$doc:meta])* $rule:ident, $id:ident, $pattern:ident, $logical:ident => $physical:ident) => {
        lazy_static! {
            static ref $pattern: Pattern =
                pattern(|op| matches!(op, Logical(LogicalOperator::$logical(_)))).finish();
        }

        $(#[$doc])*
        #[derive(Clone)]
        pub struct $rule {}

        impl $rule {
            pub fn new() -> Self {
                Self {}
            }
        }

        impl Rule for $rule {
            fn apply<O: Optimizer>(
                &self,
                input: OptExpression<O>,
                ctx: &O,
                result: &mut RuleResult<O>,
            ) -> OptResult<()> {
                if let Logical(LogicalOperator::$logical(op)) = input.get_operator(ctx)? {
                    let ret =
                        input.clone_with_inputs(Physical(PhysicalOperator::$physical(op.clone())));
                    result.add(ret);
                    Ok(())
                } else {
                    bail!("Pattern mismatch")
                }
            }

            fn pattern(&self) -> &Pattern {
                &$pattern
            }

            fn rule_id(&self) -> RuleId {
                RuleId::$id
            }

            fn rule_promise(&self) -> RulePromise {
                High
            }
        }
    };
}

one_to_one_rule!(
    /// Transforms table get to table scan.
    Get2TableScanRule, Get2TableScan, GET_TO_TABLE_SCAN_RULE_PATTERN,
    LogicalGet => PhysicalTableScan
);
one_to_one_rule!(
    DynamicGet2DynamicTableScanRule, DynamicGet2DynamicTableScan,
    DYNAMIC_GET_TO_DYNAMIC_TABLE_SCAN_RULE_PATTERN,
    LogicalDynamicGet => PhysicalDynamicTableScan
);
one_to_one_rule!(
    ConstTableGet2ConstTableScanRule, ConstTableGet2ConstTableScan,
    CONST_TABLE_GET_TO_CONST_TABLE_SCAN_RULE_PATTERN,
    LogicalConstTableGet => PhysicalConstTableScan
);
one_to_one_rule!(
    Select2FilterRule, Select2Filter, SELECT_TO_FILTER_RULE_PATTERN,
    LogicalSelect => PhysicalFilter
);
one_to_one_rule!(
    Project2ComputeScalarRule, Project2ComputeScalar, PROJECT_TO_COMPUTE_SCALAR_RULE_PATTERN,
    LogicalProject => PhysicalComputeScalar
);
one_to_one_rule!(
    /// Every aggregation, distinct or not, is implemented by hashing on the grouping columns.
    GroupBy2HashAggRule, GroupBy2HashAgg, GROUP_BY_TO_HASH_AGG_RULE_PATTERN,
    LogicalGroupBy => PhysicalHashAgg
);
one_to_one_rule!(
    Limit2PhysicalLimitRule, Limit2PhysicalLimit, LIMIT_TO_PHYSICAL_LIMIT_RULE_PATTERN,
    LogicalLimit => PhysicalLimit
);
one_to_one_rule!(
    IndexApply2IndexNestedLoopJoinRule, IndexApply2IndexNestedLoopJoin,
    INDEX_APPLY_TO_INDEX_NESTED_LOOP_JOIN_RULE_PATTERN,
    LogicalIndexApply => PhysicalIndexNestedLoopJoin
);
one_to_one_rule!(
    /// The producer and the body of a CTE run one after the other.
    CteAnchor2SequenceRule, CteAnchor2Sequence, CTE_ANCHOR_TO_SEQUENCE_RULE_PATTERN,
    LogicalCteAnchor => PhysicalSequence
);
one_to_one_rule!(
    CteProducer2PhysicalRule, CteProducer2Physical, CTE_PRODUCER_TO_PHYSICAL_RULE_PATTERN,
    LogicalCteProducer => PhysicalCteProducer
);
one_to_one_rule!(
    CteConsumer2PhysicalRule, CteConsumer2Physical, CTE_CONSUMER_TO_PHYSICAL_RULE_PATTERN,
    LogicalCteConsumer => PhysicalCteConsumer
);

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref JOIN_TO_HASH_JOIN_RULE_PATTERN: Pattern = {
        pattern(is_join)
        .finish()
    };
    static ref JOIN_TO_NESTED_LOOP_JOIN_RULE_PATTERN: Pattern = {
        pattern(is_join)
        .finish()
    };
    static ref UNION_ALL_TO_PHYSICAL_UNION_ALL_RULE_PATTERN: Pattern = {
        pattern(|op| matches!(op, Logical(LogicalSetOp(s)) if s.kind() == SetOpKind::UnionAll))
        .finish()
    };
    static ref SET_OP_TO_HASH_SET_OP_RULE_PATTERN: Pattern = {
        pattern(|op| matches!(op, Logical(LogicalSetOp(s)) if s.kind() != SetOpKind::UnionAll))
        .finish()
    };
}

fn is_join(op: &Operator) -> bool {
    matches!(op, Logical(LogicalJoin(_)))
}

/// Transforms equi join to hash join.
#[derive(Clone)]
pub struct Join2HashJoinRule {}

impl Join2HashJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for Join2HashJoinRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        if let Logical(LogicalJoin(join)) = input.get_operator(ctx)? {
            let preds = JoinPredicateInfo::new(
                join.predicate(),
                input[0].logical_prop(ctx)?.output_cols(),
                input[1].logical_prop(ctx)?.output_cols(),
            );
            // Nothing to hash on
            if preds.equi().is_empty() {
                return Ok(());
            }

            let hash_join_op = Physical(PhysicalHashJoin(join.clone()));
            result.add(input.clone_with_inputs(hash_join_op));
            Ok(())
        } else {
            bail!("Pattern mismatch")
        }
    }

    fn pattern(&self) -> &Pattern {
        &JOIN_TO_HASH_JOIN_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::Join2HashJoin
    }

    fn rule_promise(&self) -> RulePromise {
        High
    }
}

/// Transforms any join to nested loop join.
#[derive(Clone)]
pub struct Join2NestedLoopJoinRule {}

impl Join2NestedLoopJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for Join2NestedLoopJoinRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        if let Logical(LogicalJoin(join)) = input.get_operator(ctx)? {
            let nlj_op = Physical(PhysicalNestedLoopJoin(NestedLoopJoin::new(join.clone())));
            result.add(input.clone_with_inputs(nlj_op));
            Ok(())
        } else {
            bail!("Pattern mismatch")
        }
    }

    fn pattern(&self) -> &Pattern {
        &JOIN_TO_NESTED_LOOP_JOIN_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::Join2NestedLoopJoin
    }

    fn rule_promise(&self) -> RulePromise {
        High
    }
}

#[derive(Clone)]
pub struct UnionAll2PhysicalUnionAllRule {}

impl UnionAll2PhysicalUnionAllRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for UnionAll2PhysicalUnionAllRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        match input.get_operator(ctx)? {
            Logical(LogicalSetOp(set_op)) if set_op.kind() == SetOpKind::UnionAll => {
                result.add(input.clone_with_inputs(Physical(PhysicalUnionAll(set_op.clone()))));
                Ok(())
            }
            _ => bail!("Pattern mismatch"),
        }
    }

    fn pattern(&self) -> &Pattern {
        &UNION_ALL_TO_PHYSICAL_UNION_ALL_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::UnionAll2PhysicalUnionAll
    }

    fn rule_promise(&self) -> RulePromise {
        High
    }
}

/// Implements every set operation but union all by hashing whole rows.
#[derive(Clone)]
pub struct SetOp2HashSetOpRule {}

impl SetOp2HashSetOpRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for SetOp2HashSetOpRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        match input.get_operator(ctx)? {
            Logical(LogicalSetOp(set_op)) if set_op.kind() != SetOpKind::UnionAll => {
                let hash_set_op = Physical(PhysicalHashSetOp(HashSetOp::new(set_op.clone())));
                result.add(input.clone_with_inputs(hash_set_op));
                Ok(())
            }
            _ => bail!("Pattern mismatch"),
        }
    }

    fn pattern(&self) -> &Pattern {
        &SET_OP_TO_HASH_SET_OP_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::SetOp2HashSetOp
    }

    fn rule_promise(&self) -> RulePromise {
        High
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_expr::Operator::Gt;

    use crate::cascades::CascadesOptimizer;
    use crate::operator::Operator::Physical;
    use crate::operator::PhysicalOperator::{PhysicalHashJoin, PhysicalTableScan};
    use crate::operator::{Get, JoinType};
    use crate::optimizer::OptimizerContext;
    use crate::plan::{LogicalPlanBuilder, Plan};
    use crate::properties::PhysicalPropertySet;
    use crate::rules::{
        Get2TableScanRule, Join2HashJoinRule, Join2NestedLoopJoinRule, OptExpression,
    };
    use crate::scalar::{binary, col, eq, ScalarExpr};
    use crate::test_utils::table_and_columns;

    fn join_plan(
        context: &OptimizerContext,
        pred: fn(ScalarExpr, ScalarExpr) -> ScalarExpr,
    ) -> Plan {
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let right = builder.get(t2, b.clone()).build().unwrap().root();
        builder
            .get(t1, a.clone())
            .join(JoinType::Inner, pred(col(&a[0]), col(&b[0])), right)
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_to_table_scan() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let plan = LogicalPlanBuilder::new()
            .get(t1.clone(), a.clone())
            .build()
            .unwrap();

        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let results = optimizer
            .apply_to_root(&Get2TableScanRule::new().into())
            .unwrap();

        let expected = OptExpression::from(Physical(PhysicalTableScan(Get::new(t1, a))));
        assert_eq!(vec![expected], results);
    }

    #[test]
    fn test_join_to_hash_join() {
        // Equi join
        {
            let context = OptimizerContext::default();
            let plan = join_plan(&context, eq);
            let optimizer =
                CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

            let results = optimizer
                .apply_to_root(&Join2HashJoinRule::new().into())
                .unwrap();
            assert_eq!(1, results.len());
            assert!(matches!(
                results[0].get_operator(&optimizer).unwrap(),
                Physical(PhysicalHashJoin(join)) if join.join_type() == JoinType::Inner
            ));
            assert_eq!(2, results[0].inputs().len());
        }

        // No equality to hash on, only nested loop join applies
        {
            let context = OptimizerContext::default();
            let plan = join_plan(&context, |l, r| binary(l, Gt, r));
            let optimizer =
                CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

            let results = optimizer
                .apply_to_root(&Join2HashJoinRule::new().into())
                .unwrap();
            assert!(results.is_empty());

            let results = optimizer
                .apply_to_root(&Join2NestedLoopJoinRule::new().into())
                .unwrap();
            assert_eq!(1, results.len());
        }
    }

    #[test]
    fn test_hash_join_keeps_predicate() {
        let context = OptimizerContext::default();
        let plan = join_plan(&context, eq);
        let join = plan
            .root()
            .operator()
            .as_logical()
            .and_then(|op| op.as_logical_join())
            .cloned()
            .unwrap();
        let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

        let results = optimizer
            .apply_to_root(&Join2HashJoinRule::new().into())
            .unwrap();
        assert_eq!(
            &Physical(PhysicalHashJoin(join)),
            results[0].get_operator(&optimizer).unwrap()
        );
    }
}

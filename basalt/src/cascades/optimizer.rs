use std::time::Instant;

use enumset::EnumSet;
use log::{debug, info};

use crate::cascades::memo::Memo;
use crate::cascades::task::{schedule, OptimizeGroupTask};
use crate::cascades::{Group, GroupExpr, GroupExprId, GroupId, SearchStage};
use crate::cost::{CostModel, INF};
use crate::error::{OptError, OptResult};
use crate::optimizer::{Optimizer, OptimizerContext, TraceFlag};
use crate::plan::Plan;
use crate::properties::PhysicalPropertySet;
use crate::rules::{all_rules, RuleId, RuleImpl};

/// Cascades style optimizer, searching the memo in stages.
pub struct CascadesOptimizer {
    pub(super) required_prop: PhysicalPropertySet,
    pub(super) rules: Vec<RuleImpl>,
    pub(super) memo: Memo,
    pub(super) context: OptimizerContext,
    pub(super) cost_model: CostModel,
    /// Rules enabled by the running search stage.
    pub(super) xforms: EnumSet<RuleId>,
}

impl Optimizer for CascadesOptimizer {
    type GroupHandle = GroupId;
    type ExprHandle = GroupExprId;
    type Group = Group;
    type Expr = GroupExpr;

    fn context(&self) -> &OptimizerContext {
        &self.context
    }

    fn group_at(&self, group_handle: GroupId) -> &Group {
        &self.memo[group_handle]
    }

    fn expr_at(&self, expr_handle: GroupExprId) -> &GroupExpr {
        &self.memo[expr_handle]
    }

    fn group_of(&self, expr_handle: GroupExprId) -> GroupId {
        expr_handle.group_id
    }

    fn find_best_plan(mut self) -> OptResult<Plan> {
        let mut stages = SearchStage::default_stages();
        self.optimize(&mut stages)
    }
}

impl CascadesOptimizer {
    /// Loads `plan` into a new memo, deriving the logical property and statistics of every
    /// group once.
    pub fn new(
        context: OptimizerContext,
        plan: Plan,
        required_prop: PhysicalPropertySet,
    ) -> OptResult<Self> {
        let memo = Memo::from_plan(&plan, &context)?;
        Ok(Self {
            required_prop,
            rules: all_rules(),
            memo,
            context,
            cost_model: CostModel::default(),
            xforms: EnumSet::empty(),
        })
    }

    /// Runs `stages` in order and returns the cheapest plan any of them found.
    ///
    /// Each stage starts from the expressions found by the previous ones but searches for
    /// winners again with its own rules. Remaining stages are skipped once a stage reaches its
    /// cost threshold.
    pub fn optimize(&mut self, stages: &mut [SearchStage]) -> OptResult<Plan> {
        for (idx, stage) in stages.iter_mut().enumerate() {
            if self.context.is_traced(TraceFlag::PrintOptimizationStages) {
                info!("Starting search stage {}: {:?}", idx, stage.xforms());
            }

            self.xforms = stage.xforms();
            self.memo.reset_search_state();

            let deadline = stage.time_threshold().map(|t| Instant::now() + t);
            let root_task =
                OptimizeGroupTask::new(self.memo.root_group_id(), self.required_prop.clone(), INF)
                    .into();
            schedule(self, root_task, deadline)?;

            match self.memo.winner_cost(&self.required_prop) {
                Some(cost) => {
                    let plan = self.memo.best_plan(&self.required_prop)?;
                    info!("Search stage {} found a plan with cost {}", idx, cost);
                    stage.set_best_expr(plan, cost)?;
                }
                None => info!("Search stage {} found no plan", idx),
            }

            if stage.is_cost_threshold_reached() {
                debug!("Search stage {} reached its cost threshold", idx);
                break;
            }
        }

        if self.context.is_traced(TraceFlag::PrintMemoAfterOptimization) {
            debug!("Memo after optimization: {:?}", self.memo);
        }

        stages
            .iter()
            .filter_map(|stage| stage.best_expr().zip(stage.best_cost()))
            .min_by(|(_, l), (_, r)| l.value().total_cmp(&r.value()))
            .map(|(plan, _)| Plan::new(plan.root()))
            .ok_or_else(|| {
                OptError::NoPlanFound {
                    group: self.memo.root_group_id().0,
                    required: self.required_prop.to_string(),
                }
                .into()
            })
    }

    #[cfg(test)]
    pub(crate) fn apply_to_root(
        &self,
        rule: &RuleImpl,
    ) -> OptResult<Vec<crate::rules::OptExpression<CascadesOptimizer>>> {
        use crate::cascades::binding::Binding;
        use crate::rules::{Rule, RuleResult};

        let mut results = Vec::new();
        for group_expr_id in self.memo[self.memo.root_group_id()].logical_group_expr_ids() {
            for opt_expr in Binding::new(group_expr_id, rule.pattern(), &self.memo) {
                let mut result = RuleResult::new();
                rule.apply(opt_expr, self, &mut result)?;
                results.extend(result.results());
            }
        }
        Ok(results)
    }

    /// Input groups of the root's first logical expression, a join.
    #[cfg(test)]
    pub(crate) fn root_input_groups(&self) -> (GroupId, GroupId) {
        let root = &self.memo[self.memo[self.memo.root_group_id()].logical_group_expr_ids()[0]];
        (root.inputs()[0], root.inputs()[1])
    }

    /// Follows the first input of the first logical expression `depth` times from the root.
    #[cfg(test)]
    pub(crate) fn group_below_root(&self, depth: usize) -> GroupId {
        let mut group_id = self.memo.root_group_id();
        for _ in 0..depth {
            let group_expr_id = self.memo[group_id].logical_group_expr_ids()[0];
            group_id = self.memo[group_expr_id].inputs()[0];
        }
        group_id
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arrow_schema::DataType;
    use datafusion_expr::Operator::{Eq, Gt};
    use enumset::EnumSet;

    use crate::cascades::{CascadesOptimizer, SearchStage};
    use crate::cost::Cost;
    use crate::error::OptError;
    use crate::operator::Operator::Physical;
    use crate::operator::PhysicalOperator::{
        PhysicalHashJoin, PhysicalMotion, PhysicalNestedLoopJoin, PhysicalSort, PhysicalTableScan,
    };
    use crate::operator::{Get, JoinType, Sort};
    use crate::optimizer::{CancellationToken, Optimizer, OptimizerContext, TraceFlag};
    use crate::plan::{LogicalPlanBuilder, Plan, PlanNodeRef};
    use crate::properties::{DistributionSpec, OrderSpec, Ordering, PhysicalPropertySet};
    use crate::rules::RuleId;
    use crate::scalar::{binary, col};
    use crate::test_utils::table_and_columns;

    fn join_plan(context: &OptimizerContext, op: datafusion_expr::Operator) -> Plan {
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);

        let mut builder = LogicalPlanBuilder::new();
        let right = builder.get(t2, b.clone()).build().unwrap().root();
        builder
            .get(t1, a.clone())
            .join(JoinType::Inner, binary(col(&a[0]), op, col(&b[0])), right)
            .build()
            .unwrap()
    }

    fn is_join(node: &PlanNodeRef) -> bool {
        matches!(
            node.operator(),
            Physical(PhysicalHashJoin(_)) | Physical(PhysicalNestedLoopJoin(_))
        )
    }

    /// First join found walking down first inputs.
    fn find_join(node: &PlanNodeRef) -> Option<PlanNodeRef> {
        if is_join(node) {
            return Some(node.clone());
        }
        node.inputs().first().and_then(find_join)
    }

    fn assert_costs_accumulate(node: &PlanNodeRef) {
        let cost = node.cost().unwrap();
        for input in node.inputs() {
            assert!(input.cost().unwrap() <= cost);
            assert_costs_accumulate(input);
        }
    }

    #[test]
    fn test_optimize_equi_join() {
        let context = OptimizerContext::default();
        let plan = join_plan(&context, Eq);
        let optimizer =
            CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

        let best = optimizer.find_best_plan().unwrap();
        let join = find_join(&best.root()).unwrap();
        assert!(matches!(join.operator(), Physical(PhysicalHashJoin(_))));
        assert_eq!(2, join.inputs().len());
        assert!(best.cost().is_some());
        assert_costs_accumulate(&best.root());

        // Every leaf is a table scan
        fn leaves_are_scans(node: &PlanNodeRef) -> bool {
            if node.inputs().is_empty() {
                matches!(node.operator(), Physical(PhysicalTableScan(_)))
            } else {
                node.inputs().iter().all(leaves_are_scans)
            }
        }
        assert!(leaves_are_scans(&best.root()));
    }

    #[test]
    fn test_optimize_non_equi_join() {
        let context = OptimizerContext::default();
        let plan = join_plan(&context, Gt);
        let optimizer =
            CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

        let best = optimizer.find_best_plan().unwrap();
        let join = find_join(&best.root()).unwrap();
        assert!(matches!(join.operator(), Physical(PhysicalNestedLoopJoin(_))));
    }

    #[test]
    fn test_optimize_enforces_order() {
        let context = OptimizerContext::default();
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let plan = LogicalPlanBuilder::new()
            .get(t1.clone(), a.clone())
            .build()
            .unwrap();

        let orders = OrderSpec::new(vec![Ordering::new(a[0].clone(), true, false)]);
        let required = PhysicalPropertySet::new(DistributionSpec::Singleton, orders.clone());
        let optimizer = CascadesOptimizer::new(context, plan, required.clone()).unwrap();
        let best = optimizer.find_best_plan().unwrap();

        let root = best.root();
        assert_eq!(
            &Physical(PhysicalSort(Sort::new(orders))),
            root.operator()
        );
        assert!(root.physical_props().unwrap().satisfies(&required));
        assert!(matches!(
            root.inputs()[0].operator(),
            Physical(PhysicalMotion(_))
        ));
        assert_eq!(
            &Physical(PhysicalTableScan(Get::new(t1, a))),
            root.inputs()[0].inputs()[0].operator()
        );
    }

    #[test]
    fn test_unenforceable_requirement() {
        let context = OptimizerContext::default()
            .with_trace_flags(EnumSet::only(TraceFlag::DisableMotions));
        let factory = context.column_factory();
        let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
        let plan = LogicalPlanBuilder::new().get(t1, a).build().unwrap();

        let required = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
        let optimizer = CascadesOptimizer::new(context, plan, required).unwrap();
        let err = optimizer.find_best_plan().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::NoPlanFound { .. })
        ));
    }

    #[test]
    fn test_optimize_stages() {
        let context = OptimizerContext::default();
        let plan = join_plan(&context, Eq);
        let mut optimizer =
            CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

        // Implementation only first, then commutativity
        let mut stages = vec![
            SearchStage::new(EnumSet::empty(), Some(Duration::from_secs(60)), None),
            SearchStage::new(EnumSet::only(RuleId::JoinCommutativity), None, None),
        ];
        let best = optimizer.optimize(&mut stages).unwrap();

        let first = stages[0].best_cost().unwrap();
        let second = stages[1].best_cost().unwrap();
        assert!(second <= first);
        assert_eq!(Some(if second < first { second } else { first }), best.cost());

        // Stages completed once
        assert!(stages[0].set_best_expr(best, Cost::from(0.0)).is_err());
    }

    #[test]
    fn test_cost_threshold_skips_later_stages() {
        let context = OptimizerContext::default();
        let plan = join_plan(&context, Eq);
        let mut optimizer =
            CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

        let mut stages = vec![
            SearchStage::new(EnumSet::empty(), None, Some(Cost::from(f64::MAX))),
            SearchStage::new(EnumSet::only(RuleId::JoinCommutativity), None, None),
        ];
        optimizer.optimize(&mut stages).unwrap();
        assert!(stages[0].best_expr().is_some());
        assert!(stages[1].best_expr().is_none());
    }

    #[test]
    fn test_cancelled_optimization() {
        let token = CancellationToken::default();
        let context = OptimizerContext::default().with_cancellation_token(token.clone());
        let plan = join_plan(&context, Eq);
        let optimizer =
            CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();

        token.cancel();
        let err = optimizer.find_best_plan().unwrap_err();
        assert_eq!(Some(&OptError::Cancelled), err.downcast_ref::<OptError>());
    }

    #[test]
    fn test_join_commutativity_adds_alternative() {
        let context = OptimizerContext::default();
        let plan = join_plan(&context, Eq);
        let mut optimizer =
            CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
        let root_group_id = optimizer.memo.root_group_id();

        let mut stages = vec![SearchStage::new(
            EnumSet::only(RuleId::JoinCommutativity),
            None,
            None,
        )];
        optimizer.optimize(&mut stages).unwrap();

        let root_group = &optimizer.memo[root_group_id];
        assert_eq!(2, root_group.logical_group_expr_ids().len());

        // Both join orders are implemented as hash joins
        let hash_joins = root_group
            .physical_group_expr_ids()
            .into_iter()
            .filter(|id| matches!(optimizer.memo[*id].operator(), Physical(PhysicalHashJoin(_))))
            .map(|id| optimizer.memo[id].inputs().to_vec())
            .collect::<Vec<_>>();
        assert_eq!(2, hash_joins.len());
        assert_eq!(hash_joins[0][0], hash_joins[1][1]);
        assert_eq!(hash_joins[0][1], hash_joins[1][0]);
    }
}

use std::sync::Arc;

use anyhow::anyhow;

use crate::catalog::TableDesc;
use crate::column::ColRef;
use crate::datum::Datum;
use crate::error::OptResult;
use crate::operator::LogicalOperator::*;
use crate::operator::Operator::Logical;
use crate::operator::{
    ConstTableGet, CteAnchor, CteConsumer, CteId, CteProducer, DynamicGet, Get, GroupBy,
    IndexApply, Join, JoinType, Limit, LogicalOperator, Project, Select, SetOp, SetOpKind,
};
use crate::plan::{Plan, PlanNode, PlanNodeId, PlanNodeRef};
use crate::properties::OrderSpec;
use crate::scalar::ScalarExpr;

/// Builds logical plans bottom up.
///
/// Leaf methods start a new root, other methods wrap the current root. Plan node ids are
/// unique across every plan built by one builder.
#[derive(Default)]
pub struct LogicalPlanBuilder {
    root: Option<PlanNodeRef>,
    next_plan_node_id: PlanNodeId,
}

impl LogicalPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_root(&mut self, operator: LogicalOperator, inputs: Vec<PlanNodeRef>) -> &mut Self {
        let plan_node = Arc::new(PlanNode::new(
            self.next_plan_node_id,
            Logical(operator),
            inputs,
        ));
        self.root = Some(plan_node);
        self.next_plan_node_id += 1;
        self
    }

    /// Current root followed by `others`.
    fn inputs_with<I: IntoIterator<Item = PlanNodeRef>>(&mut self, others: I) -> Vec<PlanNodeRef> {
        self.root.take().into_iter().chain(others).collect()
    }

    pub fn get(&mut self, table: Arc<TableDesc>, cols: Vec<ColRef>) -> &mut Self {
        self.reset_root(LogicalGet(Get::new(table, cols)), vec![])
    }

    pub fn dynamic_get(
        &mut self,
        table: Arc<TableDesc>,
        cols: Vec<ColRef>,
        scan_id: u32,
    ) -> &mut Self {
        self.reset_root(
            LogicalDynamicGet(DynamicGet::new(table, cols, scan_id)),
            vec![],
        )
    }

    pub fn const_table(&mut self, cols: Vec<ColRef>, rows: Vec<Vec<Datum>>) -> &mut Self {
        self.reset_root(LogicalConstTableGet(ConstTableGet::new(cols, rows)), vec![])
    }

    pub fn cte_consumer(
        &mut self,
        id: CteId,
        cols: Vec<ColRef>,
        producer_cols: Vec<ColRef>,
    ) -> &mut Self {
        self.reset_root(
            LogicalCteConsumer(CteConsumer::new(id, cols, producer_cols)),
            vec![],
        )
    }

    pub fn select(&mut self, predicate: ScalarExpr) -> &mut Self {
        let inputs = self.inputs_with(None);
        self.reset_root(LogicalSelect(Select::new(predicate)), inputs)
    }

    pub fn project(&mut self, exprs: Vec<(ColRef, ScalarExpr)>) -> &mut Self {
        let inputs = self.inputs_with(None);
        self.reset_root(LogicalProject(Project::new(exprs)), inputs)
    }

    pub fn group_by(
        &mut self,
        group_cols: Vec<ColRef>,
        aggs: Vec<(ColRef, ScalarExpr)>,
    ) -> &mut Self {
        let inputs = self.inputs_with(None);
        self.reset_root(LogicalGroupBy(GroupBy::new(group_cols, aggs)), inputs)
    }

    pub fn limit(&mut self, offset: u64, count: Option<u64>, orders: OrderSpec) -> &mut Self {
        let inputs = self.inputs_with(None);
        self.reset_root(LogicalLimit(Limit::new(offset, count, orders)), inputs)
    }

    pub fn join(
        &mut self,
        join_type: JoinType,
        predicate: ScalarExpr,
        right: PlanNodeRef,
    ) -> &mut Self {
        let inputs = self.inputs_with(Some(right));
        self.reset_root(LogicalJoin(Join::new(join_type, predicate)), inputs)
    }

    pub fn index_apply(
        &mut self,
        join_type: JoinType,
        predicate: ScalarExpr,
        outer_refs: Vec<ColRef>,
        inner: PlanNodeRef,
    ) -> &mut Self {
        let inputs = self.inputs_with(Some(inner));
        self.reset_root(
            LogicalIndexApply(IndexApply::new(join_type, predicate, outer_refs)),
            inputs,
        )
    }

    /// Set operation with the current root as first input.
    pub fn set_op(
        &mut self,
        kind: SetOpKind,
        output_cols: Vec<ColRef>,
        input_cols: Vec<Vec<ColRef>>,
        others: Vec<PlanNodeRef>,
    ) -> &mut Self {
        let inputs = self.inputs_with(others);
        self.reset_root(
            LogicalSetOp(SetOp::new(kind, output_cols, input_cols)),
            inputs,
        )
    }

    /// Wraps the current root in the producer of CTE `id`.
    pub fn cte_producer(&mut self, id: CteId, cols: Vec<ColRef>) -> &mut Self {
        let inputs = self.inputs_with(None);
        self.reset_root(LogicalCteProducer(CteProducer::new(id, cols)), inputs)
    }

    /// Makes the current root the body of CTE `id` computed by `producer`.
    pub fn cte_anchor(&mut self, id: CteId, producer: PlanNodeRef) -> &mut Self {
        let body = self.root.take();
        let inputs = std::iter::once(producer).chain(body).collect();
        self.reset_root(LogicalCteAnchor(CteAnchor::new(id)), inputs)
    }

    /// Consume current plan, but not rest state, e.g. plan node id.
    ///
    /// This is useful for building multi child plan, e.g. join.
    pub fn build(&mut self) -> OptResult<Plan> {
        self.root
            .take()
            .map(Plan::new)
            .ok_or_else(|| anyhow!("Logical plan builder has no root"))
    }
}

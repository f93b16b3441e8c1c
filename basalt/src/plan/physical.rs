use std::sync::Arc;

use anyhow::anyhow;

use crate::catalog::TableDesc;
use crate::column::ColRef;
use crate::error::OptResult;
use crate::operator::Operator::Physical;
use crate::operator::PhysicalOperator::*;
use crate::operator::{Get, Join, JoinType, Motion, PhysicalOperator, Select, Sort};
use crate::plan::{Plan, PlanNode, PlanNodeId, PlanNodeRef};
use crate::properties::{DistributionSpec, OrderSpec};
use crate::scalar::ScalarExpr;

/// Builds physical plans bottom up, mostly to state expected optimizer output.
#[derive(Default)]
pub struct PhysicalPlanBuilder {
    root: Option<PlanNodeRef>,
    next_plan_node_id: PlanNodeId,
}

impl PhysicalPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_root(&mut self, operator: PhysicalOperator, inputs: Vec<PlanNodeRef>) -> &mut Self {
        self.root = Some(Arc::new(PlanNode::new(
            self.next_plan_node_id,
            Physical(operator),
            inputs,
        )));
        self.next_plan_node_id += 1;
        self
    }

    pub fn table_scan(&mut self, table: Arc<TableDesc>, cols: Vec<ColRef>) -> &mut Self {
        self.reset_root(PhysicalTableScan(Get::new(table, cols)), vec![])
    }

    pub fn filter(&mut self, predicate: ScalarExpr) -> &mut Self {
        let inputs = self.root.take().into_iter().collect();
        self.reset_root(PhysicalFilter(Select::new(predicate)), inputs)
    }

    pub fn sort(&mut self, orders: OrderSpec) -> &mut Self {
        let inputs = self.root.take().into_iter().collect();
        self.reset_root(PhysicalSort(Sort::new(orders)), inputs)
    }

    /// Adds a motion delivering `spec`, nothing when no motion can.
    pub fn motion(&mut self, spec: DistributionSpec) -> &mut Self {
        match Motion::new(spec) {
            Some(motion) => {
                let inputs = self.root.take().into_iter().collect();
                self.reset_root(PhysicalMotion(motion), inputs)
            }
            None => self,
        }
    }

    pub fn hash_join(
        &mut self,
        join_type: JoinType,
        predicate: ScalarExpr,
        right: PlanNodeRef,
    ) -> &mut Self {
        let inputs = self.root.take().into_iter().chain(Some(right)).collect();
        self.reset_root(PhysicalHashJoin(Join::new(join_type, predicate)), inputs)
    }

    pub fn build(&mut self) -> OptResult<Plan> {
        self.root
            .take()
            .map(Plan::new)
            .ok_or_else(|| anyhow!("Physical plan builder has no root"))
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;

    use crate::column::ColumnFactory;
    use crate::operator::Operator::Physical;
    use crate::operator::PhysicalOperator::{
        PhysicalFilter, PhysicalHashJoin, PhysicalMotion, PhysicalSort,
    };
    use crate::operator::{JoinType, MotionKind, Sort};
    use crate::plan::PhysicalPlanBuilder;
    use crate::properties::{DistributionSpec, OrderSpec, Ordering};
    use crate::scalar::{col, eq, lit};
    use crate::test_utils::table_with_columns;

    #[test]
    fn test_build_physical_plan() {
        let factory = ColumnFactory::new();
        let t1 = table_with_columns(1, "t1", &[("a", DataType::Int32)]);
        let a = factory.create_table_column(DataType::Int32, "a", 1, 0, true);
        let orders = OrderSpec::new(vec![Ordering::new(a.clone(), true, false)]);

        let plan = PhysicalPlanBuilder::new()
            .table_scan(t1, vec![a.clone()])
            .filter(eq(col(&a), lit(ScalarValue::Int32(Some(1)))))
            .motion(DistributionSpec::Any)
            .motion(DistributionSpec::Singleton)
            .sort(orders.clone())
            .build()
            .unwrap();

        let root = plan.root();
        assert_eq!(&Physical(PhysicalSort(Sort::new(orders))), root.operator());

        // A motion to any distribution is skipped
        let motion = &root.inputs()[0];
        match motion.operator() {
            Physical(PhysicalMotion(m)) => assert_eq!(MotionKind::Gather, m.kind()),
            op => panic!("Expected motion, found {}", op),
        }
        assert!(matches!(
            motion.inputs()[0].operator(),
            Physical(PhysicalFilter(_))
        ));
        assert_eq!(1, motion.inputs()[0].inputs().len());
    }

    #[test]
    fn test_build_hash_join() {
        let factory = ColumnFactory::new();
        let t1 = table_with_columns(1, "t1", &[("a", DataType::Int32)]);
        let t2 = table_with_columns(2, "t2", &[("b", DataType::Int32)]);
        let a = factory.create_table_column(DataType::Int32, "a", 1, 0, true);
        let b = factory.create_table_column(DataType::Int32, "b", 2, 0, true);

        let mut builder = PhysicalPlanBuilder::new();
        let right = builder
            .table_scan(t2, vec![b.clone()])
            .motion(DistributionSpec::Replicated)
            .build()
            .unwrap()
            .root();
        let plan = builder
            .table_scan(t1, vec![a.clone()])
            .hash_join(JoinType::Inner, eq(col(&a), col(&b)), right)
            .build()
            .unwrap();

        let root = plan.root();
        assert!(matches!(root.operator(), Physical(PhysicalHashJoin(_))));
        assert_eq!(2, root.inputs().len());
        assert_ne!(root.inputs()[0].id(), root.inputs()[1].id());
        match root.inputs()[1].operator() {
            Physical(PhysicalMotion(m)) => assert_eq!(MotionKind::Broadcast, m.kind()),
            op => panic!("Expected motion, found {}", op),
        }
    }
}

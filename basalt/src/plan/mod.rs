//! Plans handed to and produced by the optimizer.
use std::sync::Arc;

use crate::cost::Cost;
use crate::operator::Operator;
use crate::properties::{LogicalProperty, PhysicalPropertySet};
use crate::stat::Statistics;

mod logical;
pub use logical::*;
mod physical;
pub use physical::*;
mod explain;
pub use explain::*;

pub type PlanNodeId = u32;

pub type PlanNodeRef = Arc<PlanNode>;

#[derive(Debug, Default)]
pub struct PlanNodeIdGen {
    next: PlanNodeId,
}

impl PlanNodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gen_next(&mut self) -> PlanNodeId {
        self.next += 1;
        self.next
    }
}

/// One node in a plan.
///
/// This is used in both input and output of an optimizer. Nodes of an optimized plan carry
/// the derived properties and cost of the group expression they were extracted from.
#[derive(Debug)]
pub struct PlanNode {
    id: PlanNodeId,
    operator: Operator,
    inputs: Vec<PlanNodeRef>,
    logical_prop: Option<LogicalProperty>,
    stat: Option<Statistics>,
    physical_props: Option<PhysicalPropertySet>,
    cost: Option<Cost>,
}

/// The `eq` should ignore `id`.
impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
            && self.inputs == other.inputs
            && self.logical_prop == other.logical_prop
            && self.stat == other.stat
            && self.physical_props == other.physical_props
            && self.cost == other.cost
    }
}

/// A query plan.
///
/// A query plan is a single root dag(directed acyclic graph). Nodes shared by several parents
/// are loaded into the same memo group.
#[derive(PartialEq, Debug)]
pub struct Plan {
    root: PlanNodeRef,
}

impl Plan {
    pub fn new(root: PlanNodeRef) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PlanNodeRef {
        self.root.clone()
    }

    /// Accumulated cost of an optimized plan.
    pub fn cost(&self) -> Option<Cost> {
        self.root.cost
    }
}

impl PlanNode {
    pub fn new(id: PlanNodeId, operator: Operator, inputs: Vec<PlanNodeRef>) -> Self {
        Self {
            id,
            operator,
            inputs,
            logical_prop: None,
            stat: None,
            physical_props: None,
            cost: None,
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn inputs(&self) -> &[PlanNodeRef] {
        &self.inputs
    }

    pub fn logical_prop(&self) -> Option<&LogicalProperty> {
        self.logical_prop.as_ref()
    }

    pub fn stat(&self) -> Option<&Statistics> {
        self.stat.as_ref()
    }

    pub fn physical_props(&self) -> Option<&PhysicalPropertySet> {
        self.physical_props.as_ref()
    }

    pub fn cost(&self) -> Option<Cost> {
        self.cost
    }
}

pub struct PlanNodeBuilder {
    plan_node: PlanNode,
}

impl PlanNodeBuilder {
    pub fn new(id: PlanNodeId, operator: &Operator) -> Self {
        Self {
            plan_node: PlanNode::new(id, operator.clone(), vec![]),
        }
    }

    pub fn add_inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = PlanNodeRef>,
    {
        self.plan_node.inputs.extend(inputs);
        self
    }

    pub fn with_logical_prop(mut self, logical_prop: Option<LogicalProperty>) -> Self {
        self.plan_node.logical_prop = logical_prop;
        self
    }

    pub fn with_statistics(mut self, stat: Option<Statistics>) -> Self {
        self.plan_node.stat = stat;
        self
    }

    pub fn with_physical_props(mut self, physical_props: Option<PhysicalPropertySet>) -> Self {
        self.plan_node.physical_props = physical_props;
        self
    }

    pub fn with_cost(mut self, cost: Option<Cost>) -> Self {
        self.plan_node.cost = cost;
        self
    }

    pub fn build(self) -> PlanNode {
        self.plan_node
    }
}

use std::fmt::{Debug, Display, Formatter};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::operator::{
    ConstTableGet, CteAnchor, CteConsumer, CteProducer, DisplayFields, DynamicGet, Get, GroupBy,
    HashSetOp, IndexApply, Join, Limit, Motion, NestedLoopJoin, Project, Select, SetOp, Sort,
};
use crate::optimizer::{OptExpr, OptGroup, Optimizer};
use crate::properties::{LogicalProperty, PhysicalPropertySet};

/// Physical relational operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum PhysicalOperator {
    PhysicalTableScan(Get),
    PhysicalDynamicTableScan(DynamicGet),
    PhysicalConstTableScan(ConstTableGet),
    PhysicalFilter(Select),
    PhysicalComputeScalar(Project),
    PhysicalHashAgg(GroupBy),
    PhysicalLimit(Limit),
    PhysicalHashJoin(Join),
    PhysicalNestedLoopJoin(NestedLoopJoin),
    PhysicalIndexNestedLoopJoin(IndexApply),
    PhysicalUnionAll(SetOp),
    PhysicalHashSetOp(HashSetOp),
    PhysicalSort(Sort),
    PhysicalSequence(CteAnchor),
    PhysicalCteProducer(CteProducer),
    PhysicalCteConsumer(CteConsumer),
    PhysicalMotion(Motion),
}

impl Display for PhysicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())?;
        self.display(f)
    }
}

impl PhysicalOperator {
    /// Whether the operator only exists to enforce a physical property.
    pub fn is_enforcer(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::PhysicalSort(_) | PhysicalOperator::PhysicalMotion(_)
        )
    }
}

pub struct DerivePropContext<'a, O: Optimizer> {
    pub required_prop: &'a PhysicalPropertySet,
    pub expr_handle: O::ExprHandle,
    pub optimizer: &'a O,
}

impl<'a, O: Optimizer> DerivePropContext<'a, O> {
    /// Logical property of the `idx`th input.
    pub fn input_prop(&self, idx: usize) -> &'a LogicalProperty {
        let optimizer = self.optimizer;
        optimizer
            .group_at(
                optimizer
                    .expr_at(self.expr_handle.clone())
                    .input_at(idx, optimizer),
            )
            .logical_prop()
    }

    /// Whether the `idx`th input produces every column `prop` references.
    pub fn input_produces(&self, idx: usize, prop: &PhysicalPropertySet) -> bool {
        prop.used_columns().is_subset(self.input_prop(idx).output_cols())
    }

    /// Forwards the requirement to the single input when it can be met there.
    pub fn pass_through_unary(&self) -> DerivePropResult {
        if self.input_produces(0, self.required_prop) {
            DerivePropResult::pass_through(self.required_prop, 1)
        } else {
            DerivePropResult::any(1)
        }
    }
}

#[derive(Debug)]
pub struct DerivePropResult {
    pub output_prop: PhysicalPropertySet,
    pub input_required_props: Vec<PhysicalPropertySet>,
}

impl DerivePropResult {
    /// Delivers what the inputs deliver, requiring the same from every input.
    pub fn pass_through(required: &PhysicalPropertySet, arity: usize) -> Self {
        Self {
            output_prop: required.clone(),
            input_required_props: vec![required.clone(); arity],
        }
    }

    /// Requires nothing and promises nothing.
    pub fn any(arity: usize) -> Self {
        Self {
            output_prop: PhysicalPropertySet::any(),
            input_required_props: vec![PhysicalPropertySet::any(); arity],
        }
    }

    /// Requires `input` from every input and delivers `output`.
    pub fn new(output: PhysicalPropertySet, input: PhysicalPropertySet, arity: usize) -> Self {
        Self {
            output_prop: output,
            input_required_props: vec![input; arity],
        }
    }
}

#[enum_dispatch(PhysicalOperator)]
pub trait PhysicalOperatorTrait: Debug + PartialEq {
    /// Derive children's required properties with required properties of current node.
    ///
    /// Each result is one way to execute the operator: the properties it requires from its
    /// inputs and the properties it then delivers.
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>>;
}

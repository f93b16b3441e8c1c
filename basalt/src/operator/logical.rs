use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use strum_macros::AsRefStr;

use crate::operator::{
    ConstTableGet, CteAnchor, CteConsumer, CteProducer, DisplayFields, DynamicGet, Get, GroupBy,
    IndexApply, Join, Limit, Project, Select, SetOp,
};

/// Logical relational operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum LogicalOperator {
    LogicalGet(Get),
    LogicalDynamicGet(DynamicGet),
    LogicalConstTableGet(ConstTableGet),
    LogicalSelect(Select),
    LogicalProject(Project),
    LogicalGroupBy(GroupBy),
    LogicalLimit(Limit),
    LogicalJoin(Join),
    LogicalIndexApply(IndexApply),
    LogicalSetOp(SetOp),
    LogicalCteAnchor(CteAnchor),
    LogicalCteProducer(CteProducer),
    LogicalCteConsumer(CteConsumer),
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())?;
        self.display(f)
    }
}

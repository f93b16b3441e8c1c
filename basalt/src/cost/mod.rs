//! Defines cost model.
//!
//! Costs are estimated per operator from the statistics of the operator's group and of its
//! input groups, without accumulating children's cost.
use std::fmt::{Display, Formatter};

use derive_more::{Add, AddAssign, Sub, SubAssign, Sum};

use crate::error::OptResult;
use crate::operator::PhysicalOperator;
use crate::optimizer::OptimizerConfig;
use crate::stat::Statistics;

mod simple;
pub use simple::*;

pub const INF: Cost = Cost(f64::INFINITY);

#[derive(
    Copy, Clone, Debug, Default, PartialOrd, PartialEq, Add, Sub, Sum, AddAssign, SubAssign,
)]
pub struct Cost(f64);

impl Cost {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Cost {
    fn from(c: f64) -> Self {
        Cost(c)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Default)]
pub struct CostModel {
    /// Actual strategy.
    inner: SimpleCostModel,
}

impl CostModel {
    /// Estimate cost of current operator without accumulating children's cost.
    ///
    /// `output` are the statistics of the operator's group, `inputs` those of its input groups.
    pub fn estimate_cost(
        &self,
        operator: &PhysicalOperator,
        output: &Statistics,
        inputs: &[&Statistics],
        config: &OptimizerConfig,
    ) -> OptResult<Cost> {
        self.inner.cost(operator, output, inputs, config)
    }
}

//! Operators inserted only to deliver a required physical property.
use std::fmt::Formatter;

use crate::column::ColRef;
use crate::error::OptResult;
use crate::operator::{DerivePropContext, DerivePropResult, DisplayFields, PhysicalOperatorTrait};
use crate::optimizer::Optimizer;
use crate::properties::{DistributionSpec, OrderSpec, PhysicalPropertySet};

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Sort {
    orders: OrderSpec,
}

impl Sort {
    pub fn new(orders: OrderSpec) -> Self {
        Self { orders }
    }

    pub fn orders(&self) -> &OrderSpec {
        &self.orders
    }
}

impl PhysicalOperatorTrait for Sort {
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        let dist = context.required_prop.dist().clone();
        Ok(vec![DerivePropResult {
            output_prop: PhysicalPropertySet::new(dist.clone(), self.orders.clone()),
            input_required_props: vec![PhysicalPropertySet::with_dist(dist)],
        }])
    }
}

impl DisplayFields for Sort {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("orders", &format!("{}", self.orders))
            .finish()
    }
}

/// How a [`Motion`] moves rows between segments.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum MotionKind {
    /// All rows to a single segment.
    Gather,
    /// All rows to every segment.
    Broadcast,
    /// Rows to the segment chosen by hashing the columns.
    Redistribute(Vec<ColRef>),
    /// Rows spread over segments without any rule.
    Random,
}

/// Data movement between segments delivering `spec`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Motion {
    spec: DistributionSpec,
}

impl Motion {
    /// `None` when no motion can produce `spec`.
    pub fn new(spec: DistributionSpec) -> Option<Self> {
        match &spec {
            DistributionSpec::Any => None,
            DistributionSpec::Hashed { cols, .. } | DistributionSpec::StrictHashed { cols, .. }
                if cols.is_empty() =>
            {
                None
            }
            _ => Some(Self { spec }),
        }
    }

    pub fn spec(&self) -> &DistributionSpec {
        &self.spec
    }

    pub fn kind(&self) -> MotionKind {
        match &self.spec {
            DistributionSpec::Singleton | DistributionSpec::Any => MotionKind::Gather,
            DistributionSpec::Replicated => MotionKind::Broadcast,
            DistributionSpec::Hashed { cols, .. } | DistributionSpec::StrictHashed { cols, .. } => {
                MotionKind::Redistribute(cols.clone())
            }
            DistributionSpec::NonSingleton
            | DistributionSpec::Random { .. }
            | DistributionSpec::StrictRandom => MotionKind::Random,
        }
    }
}

impl PhysicalOperatorTrait for Motion {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(vec![DerivePropResult {
            output_prop: PhysicalPropertySet::with_dist(self.spec.clone()),
            input_required_props: vec![PhysicalPropertySet::any()],
        }])
    }
}

impl DisplayFields for Motion {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("kind", &self.kind())
            .field("spec", &format!("{}", self.spec))
            .finish()
    }
}

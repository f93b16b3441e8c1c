use std::fmt::{Display, Formatter};

use enumset::EnumSet;
use log::trace;

use crate::column::ColRefSet;
use crate::operator::{Motion, MotionKind, PhysicalOperator, Sort};
use crate::optimizer::TraceFlag;
use crate::properties::{DistributionSpec, OrderSpec, PhysicalProp};

/// All physical properties.
#[derive(Hash, Debug, Clone, Eq, PartialEq, Default)]
pub struct PhysicalPropertySet {
    dist: DistributionSpec,
    orders: OrderSpec,
}

pub(crate) struct Enforcer {
    pub(crate) operator: PhysicalOperator,
    pub(crate) output_prop: PhysicalPropertySet,
}

impl PhysicalPropertySet {
    pub fn new(dist: DistributionSpec, orders: OrderSpec) -> Self {
        Self { dist, orders }
    }

    /// No requirement at all.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_dist(dist: DistributionSpec) -> Self {
        Self::new(dist, OrderSpec::default())
    }

    pub fn dist(&self) -> &DistributionSpec {
        &self.dist
    }

    pub fn orders(&self) -> &OrderSpec {
        &self.orders
    }

    /// Columns referenced by the distribution or the ordering.
    pub fn used_columns(&self) -> ColRefSet {
        self.dist.used_columns().union(&self.orders.used_columns())
    }

    pub fn satisfies(&self, required: &PhysicalPropertySet) -> bool {
        self.dist.satisfies(&required.dist) && self.orders.satisfies(&required.orders)
    }

    /// When `input_prop` doesn't meet requirements of `required_prop`, try to append enforcer
    /// physical operators to ensure requirements.
    ///
    /// Enforcers are returned bottom up: a motion fixing the distribution comes before a sort
    /// fixing the ordering, since a motion destroys any ordering. An empty result with an
    /// unsatisfied `input_prop` means the requirement can't be enforced.
    pub(crate) fn append_enforcers(
        required_prop: &PhysicalPropertySet,
        input_prop: &PhysicalPropertySet,
        trace_flags: EnumSet<TraceFlag>,
    ) -> Vec<Enforcer> {
        let mut enforcers = Vec::new();
        let mut cur = input_prop.clone();

        if !cur.dist.satisfies(&required_prop.dist) {
            match required_prop.dist.motion_enforcer(required_prop, trace_flags) {
                Some(motion) => {
                    cur = PhysicalPropertySet::with_dist(required_prop.dist.clone());
                    enforcers.push(Enforcer {
                        operator: PhysicalOperator::PhysicalMotion(motion),
                        output_prop: cur.clone(),
                    });
                }
                None => {
                    trace!(
                        "No motion delivers {} from {}",
                        required_prop.dist,
                        input_prop.dist
                    );
                    return vec![];
                }
            }
        }

        if !cur.orders.satisfies(&required_prop.orders) {
            cur = PhysicalPropertySet::new(cur.dist.clone(), required_prop.orders.clone());
            enforcers.push(Enforcer {
                operator: PhysicalOperator::PhysicalSort(Sort::new(required_prop.orders.clone())),
                output_prop: cur,
            });
        }

        enforcers
    }
}

impl DistributionSpec {
    /// Motion delivering this spec, `None` when motions of the needed kind are disabled or the
    /// spec can't be produced by a motion.
    pub(crate) fn motion_enforcer(
        &self,
        required_prop: &PhysicalPropertySet,
        trace_flags: EnumSet<TraceFlag>,
    ) -> Option<Motion> {
        debug_assert_eq!(self, required_prop.dist());

        if trace_flags.contains(TraceFlag::DisableMotions) {
            return None;
        }

        let motion = Motion::new(self.clone())?;
        match motion.kind() {
            MotionKind::Random if trace_flags.contains(TraceFlag::DisableMotionRandom) => None,
            MotionKind::Broadcast if trace_flags.contains(TraceFlag::DisableMotionBroadcast) => {
                None
            }
            _ => Some(motion),
        }
    }
}

impl Display for PhysicalPropertySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{dist: {}, orders: {}}}", self.dist, self.orders)
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use enumset::EnumSet;

    use crate::column::ColumnFactory;
    use crate::operator::{MotionKind, PhysicalOperator};
    use crate::optimizer::TraceFlag;
    use crate::properties::{DistributionSpec, OrderSpec, Ordering, PhysicalPropertySet};

    #[test]
    fn test_append_enforcers() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let sorted = OrderSpec::new(vec![Ordering::new(a.clone(), true, false)]);

        // Already satisfied
        {
            let required = PhysicalPropertySet::with_dist(DistributionSpec::Any);
            let delivered = PhysicalPropertySet::with_dist(DistributionSpec::random());
            let enforcers =
                PhysicalPropertySet::append_enforcers(&required, &delivered, EnumSet::empty());
            assert!(enforcers.is_empty());
        }

        // Gather then sort
        {
            let required = PhysicalPropertySet::new(DistributionSpec::Singleton, sorted.clone());
            let delivered = PhysicalPropertySet::with_dist(DistributionSpec::hashed(vec![a.clone()]));
            let enforcers =
                PhysicalPropertySet::append_enforcers(&required, &delivered, EnumSet::empty());
            assert_eq!(2, enforcers.len());
            assert_eq!(
                MotionKind::Gather,
                enforcers[0]
                    .operator
                    .as_physical_motion()
                    .map(|m| m.kind())
                    .unwrap()
            );
            assert!(matches!(
                enforcers[1].operator,
                PhysicalOperator::PhysicalSort(_)
            ));
            assert_eq!(required, enforcers[1].output_prop);
        }

        // Only sort
        {
            let required = PhysicalPropertySet::new(DistributionSpec::Singleton, sorted.clone());
            let delivered = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
            let enforcers =
                PhysicalPropertySet::append_enforcers(&required, &delivered, EnumSet::empty());
            assert_eq!(1, enforcers.len());
            assert_eq!(required, enforcers[0].output_prop);
        }
    }

    #[test]
    fn test_motion_trace_flags() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let delivered = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);

        // All motions disabled
        {
            let required = PhysicalPropertySet::with_dist(DistributionSpec::hashed(vec![a]));
            let flags = EnumSet::only(TraceFlag::DisableMotions);
            assert!(PhysicalPropertySet::append_enforcers(&required, &delivered, flags).is_empty());
            assert_eq!(
                1,
                PhysicalPropertySet::append_enforcers(&required, &delivered, EnumSet::empty())
                    .len()
            );
        }

        // Random motion disabled, broadcast still allowed
        {
            let flags = EnumSet::only(TraceFlag::DisableMotionRandom);
            let random = PhysicalPropertySet::with_dist(DistributionSpec::random());
            assert!(PhysicalPropertySet::append_enforcers(&random, &delivered, flags).is_empty());

            let replicated = PhysicalPropertySet::with_dist(DistributionSpec::Replicated);
            assert_eq!(
                1,
                PhysicalPropertySet::append_enforcers(&replicated, &delivered, flags).len()
            );
        }
    }
}

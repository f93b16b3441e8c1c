use anyhow::bail;

use crate::cost::Cost;
use crate::error::OptResult;
use crate::operator::PhysicalOperator::*;
use crate::operator::{MotionKind, PhysicalOperator};
use crate::optimizer::OptimizerConfig;
use crate::stat::Statistics;

const SCAN_COST_PER_ROW: f64 = 1.0;
const CPU_COST_PER_ROW: f64 = 0.1;
const HASH_BUILD_COST_PER_ROW: f64 = 1.0;
const HASH_PROBE_COST_PER_ROW: f64 = 0.5;
const NETWORK_COST_PER_ROW: f64 = 2.0;

/// Row based cost model.
#[derive(Default)]
pub struct SimpleCostModel {}

impl SimpleCostModel {
    pub(super) fn cost(
        &self,
        operator: &PhysicalOperator,
        output: &Statistics,
        inputs: &[&Statistics],
        config: &OptimizerConfig,
    ) -> OptResult<Cost> {
        let out_rows = output.rows();
        let input_rows = |idx: usize| -> OptResult<f64> {
            match inputs.get(idx) {
                Some(s) => Ok(s.rows()),
                None => bail!("{} has no input {}", operator.as_ref(), idx),
            }
        };

        let cost = match operator {
            PhysicalTableScan(_) | PhysicalDynamicTableScan(_) => {
                out_rows * SCAN_COST_PER_ROW * (1.0 + output.row_width() / 100.0)
            }
            PhysicalConstTableScan(_) | PhysicalCteConsumer(_) => out_rows * CPU_COST_PER_ROW,
            PhysicalFilter(_) | PhysicalComputeScalar(_) | PhysicalCteProducer(_) => {
                input_rows(0)? * CPU_COST_PER_ROW
            }
            PhysicalLimit(_) => out_rows * CPU_COST_PER_ROW,
            PhysicalHashAgg(_) => {
                input_rows(0)? * HASH_BUILD_COST_PER_ROW + out_rows * CPU_COST_PER_ROW
            }
            PhysicalHashJoin(_) => {
                input_rows(1)? * HASH_BUILD_COST_PER_ROW
                    + input_rows(0)? * HASH_PROBE_COST_PER_ROW
                    + out_rows * CPU_COST_PER_ROW
            }
            PhysicalNestedLoopJoin(_) => {
                input_rows(0)? * input_rows(1)? * CPU_COST_PER_ROW + out_rows * CPU_COST_PER_ROW
            }
            PhysicalIndexNestedLoopJoin(_) => {
                let lookup = (input_rows(1)? + 1.0).log2().max(1.0);
                input_rows(0)? * lookup * CPU_COST_PER_ROW + out_rows * CPU_COST_PER_ROW
            }
            PhysicalUnionAll(_) => out_rows * CPU_COST_PER_ROW,
            PhysicalHashSetOp(_) => {
                inputs.iter().map(|s| s.rows()).sum::<f64>() * HASH_BUILD_COST_PER_ROW
            }
            PhysicalSequence(_) => CPU_COST_PER_ROW,
            PhysicalSort(_) => {
                let rows = out_rows.max(1.0);
                rows * rows.log2().max(1.0) * CPU_COST_PER_ROW
            }
            PhysicalMotion(motion) => {
                let moved = out_rows * NETWORK_COST_PER_ROW;
                match motion.kind() {
                    MotionKind::Broadcast => moved * config.segments as f64,
                    _ => moved,
                }
            }
        };
        Ok(Cost::from(cost))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::cost::CostModel;
    use crate::operator::{Motion, PhysicalOperator};
    use crate::optimizer::OptimizerConfig;
    use crate::properties::DistributionSpec;
    use crate::stat::Statistics;

    fn stats(rows: f64) -> Statistics {
        Statistics::new(rows, BTreeMap::new(), BTreeMap::new())
    }

    #[test]
    fn test_broadcast_scales_with_segments() {
        let model = CostModel::default();
        let config = OptimizerConfig::default();
        let input = stats(100.0);

        let cost_of = |spec| {
            let op = PhysicalOperator::PhysicalMotion(Motion::new(spec).unwrap());
            model.estimate_cost(&op, &input, &[&input], &config).unwrap()
        };

        let gather = cost_of(DistributionSpec::Singleton);
        let broadcast = cost_of(DistributionSpec::Replicated);
        assert_eq!(
            gather.value() * config.segments as f64,
            broadcast.value()
        );
    }
}

use std::time::Duration;

use enumset::EnumSet;

use crate::cost::Cost;
use crate::error::{OptError, OptResult};
use crate::operator::Operator;
use crate::plan::Plan;
use crate::rules::{exploration_rules, implementation_rules, RuleId};

/// One step of a search strategy.
///
/// A stage explores with its own rule set and stops at a time threshold. Implementation rules
/// are always enabled, so every stage can produce an executable plan from what it explored.
#[derive(Debug)]
pub struct SearchStage {
    xforms: EnumSet<RuleId>,
    time_threshold: Option<Duration>,
    /// Later stages are skipped once the best cost is at most this.
    cost_threshold: Option<Cost>,
    best_expr: Option<Plan>,
    best_cost: Option<Cost>,
}

impl SearchStage {
    pub fn new(
        xforms: EnumSet<RuleId>,
        time_threshold: Option<Duration>,
        cost_threshold: Option<Cost>,
    ) -> Self {
        Self {
            xforms: xforms | implementation_rules(),
            time_threshold,
            cost_threshold,
            best_expr: None,
            best_cost: None,
        }
    }

    /// A single stage applying every exploration rule without thresholds.
    pub fn default_stages() -> Vec<SearchStage> {
        vec![SearchStage::new(exploration_rules(), None, None)]
    }

    pub fn xforms(&self) -> EnumSet<RuleId> {
        self.xforms
    }

    pub fn time_threshold(&self) -> Option<Duration> {
        self.time_threshold
    }

    pub fn cost_threshold(&self) -> Option<Cost> {
        self.cost_threshold
    }

    pub fn best_expr(&self) -> Option<&Plan> {
        self.best_expr.as_ref()
    }

    pub fn best_cost(&self) -> Option<Cost> {
        self.best_cost
    }

    /// Records the best plan found by this stage. A stage completes only once.
    pub fn set_best_expr(&mut self, plan: Plan, cost: Cost) -> OptResult<()> {
        debug_assert!(matches!(plan.root().operator(), Operator::Physical(_)));
        if self.best_expr.is_some() {
            return Err(OptError::StageAlreadyCompleted.into());
        }

        self.best_expr = Some(plan);
        self.best_cost = Some(cost);
        Ok(())
    }

    /// Whether the best plan is cheap enough to skip the remaining stages.
    pub fn is_cost_threshold_reached(&self) -> bool {
        match (self.best_cost, self.cost_threshold) {
            (Some(best), Some(threshold)) => best <= threshold,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use enumset::EnumSet;

    use crate::cascades::SearchStage;
    use crate::cost::Cost;
    use crate::error::OptError;
    use crate::operator::Operator::Physical;
    use crate::operator::PhysicalOperator::PhysicalTableScan;
    use crate::operator::Get;
    use crate::plan::{Plan, PlanNode};
    use crate::rules::{exploration_rules, implementation_rules, RuleId};
    use crate::test_utils::table_with_columns;

    fn scan_plan() -> Plan {
        let table = table_with_columns(1, "t1", &[]);
        Plan::new(Arc::new(PlanNode::new(
            1,
            Physical(PhysicalTableScan(Get::new(table, vec![]))),
            vec![],
        )))
    }

    #[test]
    fn test_stage_always_implements() {
        let stage = SearchStage::new(
            EnumSet::only(RuleId::JoinCommutativity),
            Some(Duration::from_millis(10)),
            None,
        );
        assert!(stage.xforms().contains(RuleId::JoinCommutativity));
        assert!(!stage.xforms().contains(RuleId::JoinAssociativity));
        assert!(stage.xforms().is_superset(implementation_rules()));
        assert_eq!(Some(Duration::from_millis(10)), stage.time_threshold());
    }

    #[test]
    fn test_default_stages() {
        let stages = SearchStage::default_stages();
        assert_eq!(1, stages.len());
        assert_eq!(
            exploration_rules() | implementation_rules(),
            stages[0].xforms()
        );
        assert!(stages[0].time_threshold().is_none());
        assert!(stages[0].cost_threshold().is_none());
    }

    #[test]
    fn test_set_best_expr_once() {
        let mut stage = SearchStage::new(EnumSet::empty(), None, Some(Cost::from(5.0)));
        assert!(!stage.is_cost_threshold_reached());

        stage.set_best_expr(scan_plan(), Cost::from(3.0)).unwrap();
        assert_eq!(Some(Cost::from(3.0)), stage.best_cost());
        assert!(stage.best_expr().is_some());
        assert!(stage.is_cost_threshold_reached());

        let err = stage
            .set_best_expr(scan_plan(), Cost::from(1.0))
            .unwrap_err();
        assert_eq!(
            Some(&OptError::StageAlreadyCompleted),
            err.downcast_ref::<OptError>()
        );
        assert_eq!(Some(Cost::from(3.0)), stage.best_cost());
    }
}

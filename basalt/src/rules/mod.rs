//! Optimization rules.
//!
//! A rule defines equivalent transformation of query plan. There are two kinds of rules:
//!
//! 1. Exploration rule. It produces equivalent alternative logical plan, which is used in the
//! exploration phase of optimizer. For example, [`JoinCommutativityRule`] just swaps the inputs of
//! inner join.
//! 2. Implementation rule. It transforms logical operator to physical operator to provide
//! physical implementation. For example, [`Join2HashJoinRule`] transforms equi join to hash join.
//!
//! Each logical operator names the rules worth trying on it through
//! [`candidate_xforms`](crate::operator::LogicalOperatorTrait::candidate_xforms), and a search
//! stage restricts them further to the rules it enables.
//!
//! ## Pattern
//!
//! A patten defines what expression the rule should operate on. With pattern definition, the
//! rule can avoid manipulating plan directly. This decouples rule application from iteration,
//! since rule should only care about defining equivalent transformations.
//!
//! Let use the [`MergeLimitsRule`] to illustrate, its pattern is defined as following:
//! ```no
//! static ref MERGE_LIMITS_RULE_PATTERN: Pattern = {
//!     pattern(|op| matches!(op, Logical(LogicalLimit(_))))
//!         .leaf(|op| matches!(op, Logical(LogicalLimit(_))))
//!     .finish()
//!};
//! ```
//!
//! When [`MergeLimitsRule`] is invoked by optimizer, its input/output is [`OptExpression`]
//! rather plan.
//!```no
//! [GroupExprId(0, 0) Limit(10)]                             [Operator Limit(5)]
//!              |                                                     |
//!              |                                                     |
//!              |                   MergeLimitsRule                   |
//! [GroupExprId(1, 0) Limit(5)]        -------->                 [GroupId (2)]
//!              |
//!              |
//!              |
//!         [GroupId(2)]
//!
//! ```
//!
//! Instead of manipulating plan directly, the optimizer generates [`OptExpression`] using rule's
//! pattern, and the rule generates equivalent transformation. Optimizer uses generated
//! transformation to manipulate the memo.
mod pattern;
pub use pattern::*;
mod opt_expr;
pub use opt_expr::*;
mod join;
pub use join::*;
mod limit;
pub use limit::*;
mod set_op;
pub use set_op::*;
mod implementation;
pub use implementation::*;

use std::convert::AsRef;
use std::fmt::{Debug, Formatter};

use enum_dispatch::enum_dispatch;
use enumset::{EnumSet, EnumSetType};
use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::optimizer::Optimizer;

pub type OptExprVec<O> = Vec<OptExpression<O>>;

pub struct RuleResult<O: Optimizer> {
    exprs: OptExprVec<O>,
}

impl<O: Optimizer> Default for RuleResult<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Optimizer> RuleResult<O> {
    pub fn new() -> Self {
        Self { exprs: vec![] }
    }

    pub fn add(&mut self, new_expr: OptExpression<O>) {
        self.exprs.push(new_expr);
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn results(self) -> impl Iterator<Item = OptExpression<O>> {
        self.exprs.into_iter()
    }
}

#[enum_dispatch(RuleImpl)]
pub trait Rule {
    /// Apply a rule to match sub plan.
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()>;

    /// Pattern for rule.
    fn pattern(&self) -> &Pattern;

    /// Use to identify each rule.
    ///
    /// This is used to avoid applying same rule repeatedly to same group expression.
    fn rule_id(&self) -> RuleId;

    /// Use to identify applying order of rules.
    fn rule_promise(&self) -> RulePromise;
}

#[enum_dispatch]
#[derive(Clone, AsRefStr)]
pub enum RuleImpl {
    // Exploration rules
    JoinCommutativityRule,
    JoinAssociativityRule,
    InnerJoinSemiJoinSwapRule,
    InnerJoinAntiSemiJoinSwapRule,
    InnerJoin2IndexApplyRule,
    PushLimitBelowProjectRule,
    MergeLimitsRule,
    UnionToUnionAllGroupByRule,
    DifferenceToGroupByLasjRule,
    IntersectToGroupBySemiJoinRule,

    // Implementation rules
    Get2TableScanRule,
    DynamicGet2DynamicTableScanRule,
    ConstTableGet2ConstTableScanRule,
    Select2FilterRule,
    Project2ComputeScalarRule,
    GroupBy2HashAggRule,
    Limit2PhysicalLimitRule,
    Join2HashJoinRule,
    Join2NestedLoopJoinRule,
    IndexApply2IndexNestedLoopJoinRule,
    UnionAll2PhysicalUnionAllRule,
    SetOp2HashSetOpRule,
    CteAnchor2SequenceRule,
    CteProducer2PhysicalRule,
    CteConsumer2PhysicalRule,
}

#[derive(EnumSetType, Debug)]
pub enum RuleId {
    // Exploration rules
    JoinCommutativity,
    JoinAssociativity,
    InnerJoinSemiJoinSwap,
    InnerJoinAntiSemiJoinSwap,
    InnerJoin2IndexApply,
    PushLimitBelowProject,
    MergeLimits,
    UnionToUnionAllGroupBy,
    DifferenceToGroupByLasj,
    IntersectToGroupBySemiJoin,

    // Implementation rules
    Get2TableScan,
    DynamicGet2DynamicTableScan,
    ConstTableGet2ConstTableScan,
    Select2Filter,
    Project2ComputeScalar,
    GroupBy2HashAgg,
    Limit2PhysicalLimit,
    Join2HashJoin,
    Join2NestedLoopJoin,
    IndexApply2IndexNestedLoopJoin,
    UnionAll2PhysicalUnionAll,
    SetOp2HashSetOp,
    CteAnchor2Sequence,
    CteProducer2Physical,
    CteConsumer2Physical,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum RulePromise {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Debug for RuleImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_ref())
    }
}

/// Rules producing alternative logical expressions.
pub fn exploration_rules() -> EnumSet<RuleId> {
    RuleId::JoinCommutativity
        | RuleId::JoinAssociativity
        | RuleId::InnerJoinSemiJoinSwap
        | RuleId::InnerJoinAntiSemiJoinSwap
        | RuleId::InnerJoin2IndexApply
        | RuleId::PushLimitBelowProject
        | RuleId::MergeLimits
        | RuleId::UnionToUnionAllGroupBy
        | RuleId::DifferenceToGroupByLasj
        | RuleId::IntersectToGroupBySemiJoin
}

/// Rules producing physical expressions. Every search stage enables them.
pub fn implementation_rules() -> EnumSet<RuleId> {
    EnumSet::all() - exploration_rules()
}

/// One instance of every rule.
pub fn all_rules() -> Vec<RuleImpl> {
    vec![
        JoinCommutativityRule::new().into(),
        JoinAssociativityRule::new().into(),
        InnerJoinSemiJoinSwapRule::new().into(),
        InnerJoinAntiSemiJoinSwapRule::new().into(),
        InnerJoin2IndexApplyRule::new().into(),
        PushLimitBelowProjectRule::new().into(),
        MergeLimitsRule::new().into(),
        UnionToUnionAllGroupByRule::new().into(),
        DifferenceToGroupByLasjRule::new().into(),
        IntersectToGroupBySemiJoinRule::new().into(),
        Get2TableScanRule::new().into(),
        DynamicGet2DynamicTableScanRule::new().into(),
        ConstTableGet2ConstTableScanRule::new().into(),
        Select2FilterRule::new().into(),
        Project2ComputeScalarRule::new().into(),
        GroupBy2HashAggRule::new().into(),
        Limit2PhysicalLimitRule::new().into(),
        Join2HashJoinRule::new().into(),
        Join2NestedLoopJoinRule::new().into(),
        IndexApply2IndexNestedLoopJoinRule::new().into(),
        UnionAll2PhysicalUnionAllRule::new().into(),
        SetOp2HashSetOpRule::new().into(),
        CteAnchor2SequenceRule::new().into(),
        CteProducer2PhysicalRule::new().into(),
        CteConsumer2PhysicalRule::new().into(),
    ]
}

#[cfg(test)]
mod tests {
    use enumset::EnumSet;

    use crate::cascades::{CascadesOptimizer, GroupExprId, GroupId};
    use crate::operator::LogicalOperator::{LogicalConstTableGet, LogicalLimit};
    use crate::operator::Operator::Logical;
    use crate::operator::{ConstTableGet, Limit};
    use crate::properties::OrderSpec;
    use crate::rules::{
        all_rules, exploration_rules, implementation_rules, JoinCommutativityRule, OptExpression,
        Rule, RuleImpl,
    };

    #[test]
    fn test_opt_expr_operator_format() {
        let t1 = OptExpression::<CascadesOptimizer>::from(Logical(LogicalConstTableGet(
            ConstTableGet::new(vec![], vec![]),
        )));
        let opt_expr = OptExpression::<CascadesOptimizer>::with_operator(
            Logical(LogicalLimit(Limit::new(0, Some(1), OrderSpec::default()))),
            vec![t1],
        );

        let expected = "\
OperatorNode: LogicalLimit { offset: 0, count: Some(1), orders: \"[]\" }
--OperatorNode: LogicalConstTableGet { cols: [], rows: 0 }
";
        assert_eq!(expected, format!("{:?}", opt_expr));
    }

    #[test]
    fn test_opt_expr_group_expr_format() {
        let opt_expr = OptExpression::<CascadesOptimizer>::with_expr_handle(
            GroupExprId::new(GroupId(10), 4),
            vec![OptExpression::with_group_handle(GroupId(3))],
        );

        let expected = "\
ExprHandleNode: 10.4
--GroupHandleNode: 3
";
        assert_eq!(expected, format!("{:?}", opt_expr));
    }

    #[test]
    fn test_rule_debug() {
        assert_eq!(
            "\"JoinCommutativityRule\"",
            format!("{:?}", RuleImpl::from(JoinCommutativityRule::new()))
        );
    }

    #[test]
    fn test_rule_sets() {
        assert!((exploration_rules() & implementation_rules()).is_empty());
        assert_eq!(EnumSet::all(), exploration_rules() | implementation_rules());

        let rules = all_rules();
        assert_eq!(EnumSet::<crate::rules::RuleId>::all().len(), rules.len());
        let ids: EnumSet<_> = rules.iter().map(|r| r.rule_id()).collect();
        assert_eq!(EnumSet::all(), ids);

        assert!(crate::rules::RulePromise::Low < crate::rules::RulePromise::Medium);
        let index_apply = rules
            .iter()
            .find(|r| r.rule_id() == crate::rules::RuleId::InnerJoin2IndexApply)
            .unwrap();
        assert_eq!(crate::rules::RulePromise::Low, index_apply.rule_promise());
    }
}

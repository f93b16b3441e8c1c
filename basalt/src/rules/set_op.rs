//! Rewrites of distinct set operations into joins and aggregates.
//!
//! Set operations compare rows with null safe equality, so the join predicates produced here
//! use `IS NOT DISTINCT FROM`.
use anyhow::bail;
use datafusion_expr::Operator::IsNotDistinctFrom;

use crate::column::{equals_col_seq, ColRef};
use crate::error::OptResult;
use crate::operator::LogicalOperator::{
    LogicalGroupBy, LogicalJoin, LogicalProject, LogicalSetOp,
};
use crate::operator::Operator::Logical;
use crate::operator::{GroupBy, Join, JoinType, Operator, Project, SetOp, SetOpKind};
use crate::optimizer::Optimizer;
use crate::rules::RulePromise::Medium;
use crate::rules::{
    pattern, OptExpression, PatterBuilder, Pattern, Rule, RuleId, RulePromise, RuleResult,
};
use crate::scalar::{and_all, binary, col, ScalarExpr};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref UNION_TO_UNION_ALL_GROUP_BY_RULE_PATTERN: Pattern = {
        pattern(|op| is_set_op(op, SetOpKind::Union))
        .finish()
    };
    static ref DIFFERENCE_TO_GROUP_BY_LASJ_RULE_PATTERN: Pattern = {
        pattern(|op| is_set_op(op, SetOpKind::Difference))
        .finish()
    };
    static ref INTERSECT_TO_GROUP_BY_SEMI_JOIN_RULE_PATTERN: Pattern = {
        pattern(|op| is_set_op(op, SetOpKind::Intersect))
        .finish()
    };
}

fn is_set_op(op: &Operator, kind: SetOpKind) -> bool {
    match op {
        Logical(LogicalSetOp(set_op)) => set_op.kind() == kind,
        _ => false,
    }
}

fn set_op_of<'a, O: Optimizer>(expr: &'a OptExpression<O>, ctx: &'a O) -> OptResult<&'a SetOp> {
    match expr.get_operator(ctx)? {
        Logical(LogicalSetOp(set_op)) => Ok(set_op),
        _ => bail!("Pattern mismatch"),
    }
}

fn distinct<O: Optimizer>(cols: &[ColRef], input: OptExpression<O>) -> OptExpression<O> {
    OptExpression::with_operator(
        Logical(LogicalGroupBy(GroupBy::new(cols.to_vec(), vec![]))),
        vec![input],
    )
}

/// `l1 IS NOT DISTINCT FROM r1 AND l2 IS NOT DISTINCT FROM r2 ...`
fn null_safe_equalities(left: &[ColRef], right: &[ColRef]) -> Option<ScalarExpr> {
    and_all(
        left.iter()
            .zip(right)
            .map(|(l, r)| binary(col(l), IsNotDistinctFrom, col(r))),
    )
}

/// Rewrites a binary distinct set operation as a distinct over a semi or anti semi join of
/// its inputs.
fn set_op_to_join<O: Optimizer>(
    input: &OptExpression<O>,
    ctx: &O,
    join_type: JoinType,
    result: &mut RuleResult<O>,
) -> OptResult<()> {
    let set_op = set_op_of(input, ctx)?;
    if input.inputs().len() != 2 {
        return Ok(());
    }

    let (left_cols, right_cols) = (&set_op.input_cols()[0], &set_op.input_cols()[1]);
    let predicate = match null_safe_equalities(left_cols, right_cols) {
        Some(p) => p,
        None => return Ok(()),
    };

    let mut joined = OptExpression::with_operator(
        Logical(LogicalJoin(Join::new(join_type, predicate))),
        vec![input[0].clone(), input[1].clone()],
    );
    if !equals_col_seq(Some(set_op.output_cols()), Some(left_cols)) {
        let renames = set_op
            .output_cols()
            .iter()
            .zip(left_cols)
            .map(|(out, l)| (out.clone(), col(l)))
            .collect();
        joined = OptExpression::with_operator(
            Logical(LogicalProject(Project::new(renames))),
            vec![joined],
        );
    }

    result.add(distinct(set_op.output_cols(), joined));
    Ok(())
}

/// `UNION` as a distinct over `UNION ALL`.
#[derive(Clone)]
pub struct UnionToUnionAllGroupByRule {}

impl UnionToUnionAllGroupByRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for UnionToUnionAllGroupByRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        let set_op = set_op_of(&input, ctx)?;
        let union_all = OptExpression::with_operator(
            Logical(LogicalSetOp(SetOp::new(
                SetOpKind::UnionAll,
                set_op.output_cols().to_vec(),
                set_op.input_cols().to_vec(),
            ))),
            input.inputs().to_vec(),
        );
        result.add(distinct(set_op.output_cols(), union_all));
        Ok(())
    }

    fn pattern(&self) -> &Pattern {
        &UNION_TO_UNION_ALL_GROUP_BY_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::UnionToUnionAllGroupBy
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

/// `EXCEPT` as a distinct over a left anti semi join.
#[derive(Clone)]
pub struct DifferenceToGroupByLasjRule {}

impl DifferenceToGroupByLasjRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for DifferenceToGroupByLasjRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        set_op_to_join(&input, ctx, JoinType::LeftAntiSemi, result)
    }

    fn pattern(&self) -> &Pattern {
        &DIFFERENCE_TO_GROUP_BY_LASJ_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::DifferenceToGroupByLasj
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

/// `INTERSECT` as a distinct over a left semi join.
#[derive(Clone)]
pub struct IntersectToGroupBySemiJoinRule {}

impl IntersectToGroupBySemiJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for IntersectToGroupBySemiJoinRule {
    fn apply<O: Optimizer>(
        &self,
        input: OptExpression<O>,
        ctx: &O,
        result: &mut RuleResult<O>,
    ) -> OptResult<()> {
        set_op_to_join(&input, ctx, JoinType::LeftSemi, result)
    }

    fn pattern(&self) -> &Pattern {
        &INTERSECT_TO_GROUP_BY_SEMI_JOIN_RULE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RuleId::IntersectToGroupBySemiJoin
    }

    fn rule_promise(&self) -> RulePromise {
        Medium
    }
}

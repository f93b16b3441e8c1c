use std::fmt::Formatter;

use enumset::EnumSet;

use crate::column::{
    equals_col_seq, hash_col_seq, remap_cols, ColRef, ColRefMap, ColRefSet, ColumnFactory,
};
use crate::constraint::ConstraintProperty;
use crate::error::OptResult;
use crate::operator::{
    hash_all, hash_kind, DeriveHandle, DerivePropContext, DerivePropResult, DisplayFields,
    LogicalOperator, LogicalOperatorTrait, PhysicalOperatorTrait,
};
use crate::optimizer::Optimizer;
use crate::properties::{
    DistributionSpec, KeyCollection, LogicalProperty, MaxCard, PhysicalPropertySet,
};
use crate::rules::RuleId;
use crate::scalar::ScalarExpr;
use crate::stat::derive::{join, JoinPredicateInfo};
use crate::stat::Statistics;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    LeftSemi,
    LeftAntiSemi,
    /// Anti semi join with `NOT IN` semantics: a null on the inner side rejects every row.
    LeftAntiSemiNotIn,
}

impl JoinType {
    /// Whether only columns of the left input are produced.
    pub fn is_left_only(&self) -> bool {
        matches!(
            self,
            JoinType::LeftSemi | JoinType::LeftAntiSemi | JoinType::LeftAntiSemiNotIn
        )
    }
}

fn join_output_columns(join_type: JoinType, handle: &DeriveHandle) -> ColRefSet {
    if join_type.is_left_only() {
        handle.input_prop(0).output_cols().clone()
    } else {
        handle.input_output_cols()
    }
}

fn join_keys(join_type: JoinType, predicate: &ScalarExpr, handle: &DeriveHandle) -> KeyCollection {
    let left = handle.input_prop(0);
    if join_type.is_left_only() {
        return left.keys().clone();
    }

    let right = handle.input_prop(1);
    let preds = JoinPredicateInfo::new(predicate, left.output_cols(), right.output_cols());
    let right_join_cols: ColRefSet = preds.equi().iter().map(|(_, r)| r).collect();
    // Each left row matches at most one right row
    if right.keys().is_unique_on(&right_join_cols) {
        return left.keys().clone();
    }

    let mut ret = KeyCollection::none();
    for l in left.keys().keys() {
        for r in right.keys().keys() {
            ret.add(l.union(r));
        }
    }
    ret
}

fn join_max_card(join_type: JoinType, handle: &DeriveHandle) -> MaxCard {
    let left = handle.input_prop(0).max_card();
    if join_type.is_left_only() {
        return left;
    }

    let right = handle.input_prop(1).max_card();
    match join_type {
        JoinType::LeftOuter if right.is_zero() => left,
        _ => left.times(right),
    }
}

fn join_constraint(
    join_type: JoinType,
    predicate: &ScalarExpr,
    handle: &DeriveHandle,
) -> OptResult<ConstraintProperty> {
    let left = handle.input_prop(0);
    match join_type {
        JoinType::Inner => {
            let local = ConstraintProperty::from_predicate(predicate, handle.context().md())?;
            Ok(left
                .constraint()
                .conjoin(handle.input_prop(1).constraint())
                .conjoin(&local))
        }
        JoinType::LeftSemi => {
            let local = ConstraintProperty::from_predicate(predicate, handle.context().md())?;
            Ok(left
                .constraint()
                .conjoin(&local.restricted_to(left.output_cols())))
        }
        _ => Ok(left.constraint().clone()),
    }
}

fn join_statistics(
    join_type: JoinType,
    predicate: &ScalarExpr,
    handle: &DeriveHandle,
) -> Statistics {
    let preds = JoinPredicateInfo::new(
        predicate,
        handle.input_prop(0).output_cols(),
        handle.input_prop(1).output_cols(),
    );
    join(
        join_type,
        handle.input_stats(0),
        handle.input_stats(1),
        &preds,
        handle.context().config(),
    )
}

/// Alternatives executing a join without colocating both inputs on the join keys.
fn broadcast_or_gather<O: Optimizer>(context: &DerivePropContext<O>) -> Vec<DerivePropResult> {
    let outer_dist = if context.input_produces(0, context.required_prop) {
        context.required_prop.dist().clone()
    } else {
        DistributionSpec::Any
    };
    let singleton = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
    vec![
        DerivePropResult {
            output_prop: PhysicalPropertySet::with_dist(outer_dist.clone()),
            input_required_props: vec![
                PhysicalPropertySet::with_dist(outer_dist),
                PhysicalPropertySet::with_dist(DistributionSpec::Replicated),
            ],
        },
        DerivePropResult::new(singleton.clone(), singleton, 2),
    ]
}

/// Logical join operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Join {
    join_type: JoinType,
    predicate: ScalarExpr,
}

impl Join {
    pub fn new(join_type: JoinType, predicate: ScalarExpr) -> Self {
        Self {
            join_type,
            predicate,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn predicate(&self) -> &ScalarExpr {
        &self.predicate
    }
}

impl LogicalOperatorTrait for Join {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet {
        join_output_columns(self.join_type, handle)
    }

    fn used_columns(&self) -> ColRefSet {
        self.predicate.used_columns()
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        join_keys(self.join_type, &self.predicate, handle)
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        if self.join_type == JoinType::Inner && self.predicate.is_constant_false() {
            return Ok(MaxCard::new(0));
        }
        Ok(join_max_card(self.join_type, handle))
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        join_constraint(self.join_type, &self.predicate, handle)
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(join_statistics(self.join_type, &self.predicate, handle))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        let implementations = RuleId::Join2HashJoin | RuleId::Join2NestedLoopJoin;
        match self.join_type {
            JoinType::Inner => {
                implementations
                    | RuleId::JoinCommutativity
                    | RuleId::JoinAssociativity
                    | RuleId::InnerJoinSemiJoinSwap
                    | RuleId::InnerJoinAntiSemiJoinSwap
                    | RuleId::InnerJoin2IndexApply
            }
            _ => implementations,
        }
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalJoin",
            [hash_kind(&self.join_type), self.predicate.hash_value()],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalJoin(o) => self == o,
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator {
        LogicalOperator::LogicalJoin(Join::new(
            self.join_type,
            self.predicate
                .copy_with_remapped_columns(mapping, must_exist, factory),
        ))
    }
}

impl PhysicalOperatorTrait for Join {
    /// Hash join colocates both inputs on the equi join keys, or broadcasts the inner input.
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        let preds = JoinPredicateInfo::new(
            &self.predicate,
            context.input_prop(0).output_cols(),
            context.input_prop(1).output_cols(),
        );
        let (left_keys, right_keys): (Vec<ColRef>, Vec<ColRef>) =
            preds.equi().iter().cloned().unzip();

        let mut ret = Vec::new();
        if !left_keys.is_empty() {
            let left = PhysicalPropertySet::with_dist(DistributionSpec::hashed(left_keys));
            ret.push(DerivePropResult {
                output_prop: left.clone(),
                input_required_props: vec![
                    left,
                    PhysicalPropertySet::with_dist(DistributionSpec::hashed(right_keys)),
                ],
            });
        }
        ret.extend(broadcast_or_gather(&context));
        Ok(ret)
    }
}

impl DisplayFields for Join {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("join_type", &self.join_type)
            .field("predicate", &format!("{}", self.predicate))
            .finish()
    }
}

/// Physical nested loop join, evaluating the predicate on every pair of rows.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct NestedLoopJoin {
    join: Join,
}

impl NestedLoopJoin {
    pub fn new(join: Join) -> Self {
        Self { join }
    }

    pub fn join(&self) -> &Join {
        &self.join
    }
}

impl PhysicalOperatorTrait for NestedLoopJoin {
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(broadcast_or_gather(&context))
    }
}

impl DisplayFields for NestedLoopJoin {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.join.display(f)
    }
}

/// Join whose inner input is evaluated once per outer row, with `outer_refs` bound from the
/// outer row, typically an index lookup.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct IndexApply {
    join_type: JoinType,
    predicate: ScalarExpr,
    outer_refs: Vec<ColRef>,
}

impl IndexApply {
    pub fn new(join_type: JoinType, predicate: ScalarExpr, outer_refs: Vec<ColRef>) -> Self {
        Self {
            join_type,
            predicate,
            outer_refs,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn predicate(&self) -> &ScalarExpr {
        &self.predicate
    }

    pub fn outer_refs(&self) -> &[ColRef] {
        &self.outer_refs
    }
}

impl LogicalOperatorTrait for IndexApply {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet {
        join_output_columns(self.join_type, handle)
    }

    fn used_columns(&self) -> ColRefSet {
        let mut ret = self.predicate.used_columns();
        ret.extend(self.outer_refs.iter());
        ret
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        join_keys(self.join_type, &self.predicate, handle)
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        Ok(join_max_card(self.join_type, handle))
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        join_constraint(self.join_type, &self.predicate, handle)
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(join_statistics(self.join_type, &self.predicate, handle))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::IndexApply2IndexNestedLoopJoin.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalIndexApply",
            [
                hash_kind(&self.join_type),
                self.predicate.hash_value(),
                hash_col_seq(&self.outer_refs),
            ],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalIndexApply(o) => {
                self.join_type == o.join_type
                    && self.predicate == o.predicate
                    && equals_col_seq(Some(&self.outer_refs), Some(&o.outer_refs))
            }
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        mapping: &mut ColRefMap,
        must_exist: bool,
        factory: &ColumnFactory,
    ) -> LogicalOperator {
        let predicate = self
            .predicate
            .copy_with_remapped_columns(mapping, must_exist, factory);
        let outer_refs = remap_cols(&self.outer_refs, mapping, must_exist, factory);
        LogicalOperator::LogicalIndexApply(IndexApply::new(self.join_type, predicate, outer_refs))
    }
}

impl PhysicalOperatorTrait for IndexApply {
    fn derive_properties<O: Optimizer>(
        &self,
        context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(broadcast_or_gather(&context))
    }
}

impl DisplayFields for IndexApply {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("join_type", &self.join_type)
            .field("predicate", &format!("{}", self.predicate))
            .field("outer_refs", &self.outer_refs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator as BinaryOp;

    use crate::column::{ColRefMap, ColumnFactory};
    use crate::operator::{Join, JoinType, LogicalOperator, LogicalOperatorTrait};
    use crate::scalar::{binary, col, eq, lit};

    #[test]
    fn test_remap_with_empty_mapping() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let join = LogicalOperator::LogicalJoin(Join::new(
            JoinType::Inner,
            eq(col(&a), col(&b)),
        ));

        let mut mapping = ColRefMap::new();
        let copy = join.copy_with_remapped_columns(&mut mapping, false, &factory);
        assert_eq!(join.hash_value(), copy.hash_value());
        assert!(join.matches(&copy));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_join_match_discriminators() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let b = factory.create(DataType::Int32, "b");
        let pred = eq(col(&a), col(&b));

        let inner = LogicalOperator::LogicalJoin(Join::new(JoinType::Inner, pred.clone()));
        let semi = LogicalOperator::LogicalJoin(Join::new(JoinType::LeftSemi, pred));
        let other_pred = LogicalOperator::LogicalJoin(Join::new(
            JoinType::Inner,
            binary(col(&a), BinaryOp::Lt, lit(ScalarValue::Int32(Some(1)))),
        ));

        assert!(!inner.matches(&semi));
        assert!(!inner.matches(&other_pred));
        assert!(inner
            .candidate_xforms()
            .contains(crate::rules::RuleId::JoinCommutativity));
        assert!(!semi
            .candidate_xforms()
            .contains(crate::rules::RuleId::JoinCommutativity));
    }
}

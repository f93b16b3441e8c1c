use std::fmt::Formatter;

use enumset::EnumSet;
use strum_macros::AsRefStr;

use crate::column::{
    equals_col_seq, equals_col_seqs, hash_col_seq, remap_cols, ColRef, ColRefMap, ColRefSet,
    ColumnFactory,
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
use crate::stat::derive::{
    difference, difference_all, group_by, intersect, intersect_all, union_all_n,
};
use crate::stat::Statistics;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, AsRefStr)]
pub enum SetOpKind {
    UnionAll,
    Union,
    Difference,
    DifferenceAll,
    Intersect,
    IntersectAll,
}

impl SetOpKind {
    /// Whether duplicates are removed from the output.
    pub fn is_distinct(&self) -> bool {
        matches!(
            self,
            SetOpKind::Union | SetOpKind::Difference | SetOpKind::Intersect
        )
    }
}

/// Set operation over any number of inputs.
///
/// `input_cols[i]` are the columns of the `i`th input, mapped position-wise to `output_cols`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SetOp {
    kind: SetOpKind,
    output_cols: Vec<ColRef>,
    input_cols: Vec<Vec<ColRef>>,
}

impl SetOp {
    pub fn new(kind: SetOpKind, output_cols: Vec<ColRef>, input_cols: Vec<Vec<ColRef>>) -> Self {
        Self {
            kind,
            output_cols,
            input_cols,
        }
    }

    pub fn kind(&self) -> SetOpKind {
        self.kind
    }

    pub fn output_cols(&self) -> &[ColRef] {
        &self.output_cols
    }

    pub fn input_cols(&self) -> &[Vec<ColRef>] {
        &self.input_cols
    }

    /// Constraint of the `idx`th input, renamed to output columns.
    fn input_constraint(&self, handle: &DeriveHandle, idx: usize) -> OptResult<ConstraintProperty> {
        let mapping = ColRefMap::from_pairs(&self.input_cols[idx], &self.output_cols);
        let output: ColRefSet = self.output_cols.iter().collect();
        Ok(handle
            .input_prop(idx)
            .constraint()
            .copy_with_remapped_columns(&mapping, false)?
            .restricted_to(&output))
    }

    /// Folds a binary statistics processor over all inputs.
    fn fold_statistics<F>(&self, handle: &DeriveHandle, f: F) -> Statistics
    where
        F: Fn(&Statistics, &[ColRef], &Statistics, &[ColRef]) -> Statistics,
    {
        let mut acc = f(
            handle.input_stats(0),
            &self.input_cols[0],
            handle.input_stats(1),
            &self.input_cols[1],
        );
        for idx in 2..handle.arity() {
            acc = f(
                &acc,
                &self.output_cols,
                handle.input_stats(idx),
                &self.input_cols[idx],
            );
        }
        acc
    }
}

impl LogicalOperatorTrait for SetOp {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.output_cols.iter().collect()
    }

    fn used_columns(&self) -> ColRefSet {
        self.input_cols.iter().flatten().collect()
    }

    fn derive_keys(&self, _handle: &DeriveHandle) -> KeyCollection {
        if self.kind.is_distinct() {
            KeyCollection::new(vec![self.output_cols.iter().collect()])
        } else {
            KeyCollection::none()
        }
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        let cards = (0..handle.arity()).map(|idx| handle.input_prop(idx).max_card());
        Ok(match self.kind {
            SetOpKind::UnionAll | SetOpKind::Union => {
                cards.fold(MaxCard::new(0), |acc, c| acc.plus(c))
            }
            SetOpKind::Intersect | SetOpKind::IntersectAll => {
                cards.fold(MaxCard::unbounded(), |acc, c| acc.min(c))
            }
            SetOpKind::Difference | SetOpKind::DifferenceAll => handle.input_prop(0).max_card(),
        })
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        let first = self.input_constraint(handle, 0)?;
        match self.kind {
            SetOpKind::UnionAll | SetOpKind::Union => {
                let mut ret = first;
                for idx in 1..handle.arity() {
                    ret = ret.disjoin(&self.input_constraint(handle, idx)?);
                }
                Ok(ret)
            }
            SetOpKind::Intersect | SetOpKind::IntersectAll => {
                let mut ret = first;
                for idx in 1..handle.arity() {
                    ret = ret.conjoin(&self.input_constraint(handle, idx)?);
                }
                Ok(ret)
            }
            SetOpKind::Difference | SetOpKind::DifferenceAll => Ok(first),
        }
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        let config = handle.context().config();
        let out = &self.output_cols;
        let inputs: Vec<&Statistics> = (0..handle.arity()).map(|i| handle.input_stats(i)).collect();

        Ok(match self.kind {
            SetOpKind::UnionAll => union_all_n(&inputs, &self.input_cols, out),
            SetOpKind::Union => {
                let all = union_all_n(&inputs, &self.input_cols, out);
                group_by(&all, out, &[], config)
            }
            SetOpKind::DifferenceAll => self.fold_statistics(handle, |l, lc, r, rc| {
                difference_all(l, lc, r, rc, out, config)
            }),
            SetOpKind::Difference => self.fold_statistics(handle, |l, lc, r, rc| {
                difference(l, lc, r, rc, out, config)
            }),
            SetOpKind::IntersectAll => self.fold_statistics(handle, |l, lc, r, rc| {
                intersect_all(l, lc, r, rc, out, config)
            }),
            SetOpKind::Intersect => self.fold_statistics(handle, |l, lc, r, rc| {
                intersect(l, lc, r, rc, out, config)
            }),
        })
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        match self.kind {
            SetOpKind::UnionAll => RuleId::UnionAll2PhysicalUnionAll.into(),
            SetOpKind::Union => RuleId::UnionToUnionAllGroupBy | RuleId::SetOp2HashSetOp,
            SetOpKind::Difference => RuleId::DifferenceToGroupByLasj | RuleId::SetOp2HashSetOp,
            SetOpKind::Intersect => RuleId::IntersectToGroupBySemiJoin | RuleId::SetOp2HashSetOp,
            SetOpKind::DifferenceAll | SetOpKind::IntersectAll => RuleId::SetOp2HashSetOp.into(),
        }
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalSetOp",
            [hash_kind(&self.kind), hash_col_seq(&self.output_cols)]
                .into_iter()
                .chain(self.input_cols.iter().map(|c| hash_col_seq(c))),
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalSetOp(o) => {
                self.kind == o.kind
                    && equals_col_seq(Some(&self.output_cols), Some(&o.output_cols))
                    && equals_col_seqs(Some(&self.input_cols), Some(&o.input_cols))
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
        let output_cols = remap_cols(&self.output_cols, mapping, must_exist, factory);
        let input_cols = self
            .input_cols
            .iter()
            .map(|cols| remap_cols(cols, mapping, must_exist, factory))
            .collect();
        LogicalOperator::LogicalSetOp(SetOp::new(self.kind, output_cols, input_cols))
    }
}

impl PhysicalOperatorTrait for SetOp {
    /// Union all appends partitioned inputs segment by segment, or gathered inputs on one
    /// segment.
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        let arity = self.input_cols.len();
        let singleton = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
        Ok(vec![
            DerivePropResult::new(
                PhysicalPropertySet::with_dist(DistributionSpec::random()),
                PhysicalPropertySet::with_dist(DistributionSpec::NonSingleton),
                arity,
            ),
            DerivePropResult::new(singleton.clone(), singleton, arity),
        ])
    }
}

impl DisplayFields for SetOp {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("kind", &self.kind.as_ref())
            .field("output_cols", &self.output_cols)
            .field("input_cols", &self.input_cols)
            .finish()
    }
}

/// Physical set operation matching rows through a hash table.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct HashSetOp {
    set_op: SetOp,
}

impl HashSetOp {
    pub fn new(set_op: SetOp) -> Self {
        Self { set_op }
    }

    pub fn set_op(&self) -> &SetOp {
        &self.set_op
    }
}

impl PhysicalOperatorTrait for HashSetOp {
    /// Equal rows of all inputs must meet on one segment.
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        let arity = self.set_op.input_cols.len();
        let singleton = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
        Ok(vec![
            DerivePropResult {
                output_prop: PhysicalPropertySet::with_dist(DistributionSpec::hashed(
                    self.set_op.output_cols.clone(),
                )),
                input_required_props: self
                    .set_op
                    .input_cols
                    .iter()
                    .map(|cols| {
                        PhysicalPropertySet::with_dist(DistributionSpec::hashed(cols.clone()))
                    })
                    .collect(),
            },
            DerivePropResult::new(singleton.clone(), singleton, arity),
        ])
    }
}

impl DisplayFields for HashSetOp {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        self.set_op.display(f)
    }
}

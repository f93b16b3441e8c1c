//! Common table expressions.
//!
//! A [`CteAnchor`] has two inputs: the [`CteProducer`] computing the shared result and the body
//! reading it through any number of [`CteConsumer`]s. Consumers are leaves, they find what they
//! need about the producer in the [`CteRegistry`](crate::optimizer::CteRegistry) by id.
use std::fmt::Formatter;

use anyhow::bail;
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
    DistributionSpec, KeyCollection, LogicalProperty, MaxCard, PartInfo, PartInfoEntry,
    PhysicalPropertySet,
};
use crate::rules::RuleId;
use crate::stat::Statistics;

fn singleton(arity: usize) -> Vec<DerivePropResult> {
    let prop = PhysicalPropertySet::with_dist(DistributionSpec::Singleton);
    vec![DerivePropResult::new(prop.clone(), prop, arity)]
}

pub type CteId = u32;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct CteAnchor {
    id: CteId,
}

impl CteAnchor {
    pub fn new(id: CteId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> CteId {
        self.id
    }
}

impl LogicalOperatorTrait for CteAnchor {
    fn derive_output_columns(&self, handle: &DeriveHandle) -> ColRefSet {
        handle.input_prop(1).output_cols().clone()
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        handle.input_prop(1).keys().clone()
    }

    fn derive_partition_info(&self, handle: &DeriveHandle) -> OptResult<PartInfo> {
        let body = handle.input_prop(1).part_info().clone();
        Ok(match handle.context().cte_registry().get(self.id) {
            Some(info) => body.combine(info.logical_prop().part_info()),
            None => body,
        })
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        Ok(handle.input_prop(1).max_card())
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        Ok(handle.input_prop(1).constraint().clone())
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(handle.input_stats(1).clone())
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::CteAnchor2Sequence.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all("LogicalCteAnchor", [hash_kind(&self.id)])
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalCteAnchor(o) => self.id == o.id,
            _ => false,
        }
    }

    fn copy_with_remapped_columns(
        &self,
        _mapping: &mut ColRefMap,
        _must_exist: bool,
        _factory: &ColumnFactory,
    ) -> LogicalOperator {
        LogicalOperator::LogicalCteAnchor(self.clone())
    }
}

impl PhysicalOperatorTrait for CteAnchor {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(singleton(2))
    }
}

impl DisplayFields for CteAnchor {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("").field("id", &self.id).finish()
    }
}

/// Computes the shared result of a CTE, exposing `cols`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct CteProducer {
    id: CteId,
    cols: Vec<ColRef>,
}

impl CteProducer {
    pub fn new(id: CteId, cols: Vec<ColRef>) -> Self {
        Self { id, cols }
    }

    pub fn id(&self) -> CteId {
        self.id
    }

    pub fn cols(&self) -> &[ColRef] {
        &self.cols
    }

    fn col_set(&self) -> ColRefSet {
        self.cols.iter().collect()
    }
}

impl LogicalOperatorTrait for CteProducer {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.col_set()
    }

    fn used_columns(&self) -> ColRefSet {
        self.col_set()
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        handle.input_prop(0).keys().restricted_to(&self.col_set())
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        Ok(handle.input_prop(0).max_card())
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        Ok(handle
            .input_prop(0)
            .constraint()
            .restricted_to(&self.col_set()))
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(handle.input_stats(0).restricted_to(&self.col_set()))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::CteProducer2Physical.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalCteProducer",
            [hash_kind(&self.id), hash_col_seq(&self.cols)],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalCteProducer(o) => {
                self.id == o.id && equals_col_seq(Some(&self.cols), Some(&o.cols))
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
        LogicalOperator::LogicalCteProducer(CteProducer::new(
            self.id,
            remap_cols(&self.cols, mapping, must_exist, factory),
        ))
    }
}

impl PhysicalOperatorTrait for CteProducer {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(singleton(1))
    }
}

impl DisplayFields for CteProducer {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("id", &self.id)
            .field("cols", &self.cols)
            .finish()
    }
}

/// Reads the result of CTE `id`, renaming `producer_cols` to `cols`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct CteConsumer {
    id: CteId,
    cols: Vec<ColRef>,
    producer_cols: Vec<ColRef>,
}

impl CteConsumer {
    pub fn new(id: CteId, cols: Vec<ColRef>, producer_cols: Vec<ColRef>) -> Self {
        Self {
            id,
            cols,
            producer_cols,
        }
    }

    pub fn id(&self) -> CteId {
        self.id
    }

    pub fn cols(&self) -> &[ColRef] {
        &self.cols
    }

    pub fn producer_cols(&self) -> &[ColRef] {
        &self.producer_cols
    }

    fn col_set(&self) -> ColRefSet {
        self.cols.iter().collect()
    }

    fn mapping(&self) -> ColRefMap {
        ColRefMap::from_pairs(&self.producer_cols, &self.cols)
    }
}

impl LogicalOperatorTrait for CteConsumer {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.col_set()
    }

    fn derive_keys(&self, handle: &DeriveHandle) -> KeyCollection {
        let ctx = handle.context();
        match ctx.cte_registry().get(self.id) {
            Some(info) => info
                .logical_prop()
                .keys()
                .remapped(&mut self.mapping(), false, ctx.column_factory())
                .restricted_to(&self.col_set()),
            None => KeyCollection::none(),
        }
    }

    fn derive_partition_info(&self, handle: &DeriveHandle) -> OptResult<PartInfo> {
        let info = match handle.context().cte_registry().get(self.id) {
            Some(info) => info,
            None => return Ok(PartInfo::default()),
        };
        let mapping = self.mapping();
        Ok(PartInfo::new(
            info.logical_prop()
                .part_info()
                .entries()
                .iter()
                .map(|e| PartInfoEntry {
                    scan_id: e.scan_id,
                    table_id: e.table_id,
                    part_keys: e
                        .part_keys
                        .iter()
                        .map(|c| mapping.get(c).cloned().unwrap_or_else(|| c.clone()))
                        .collect(),
                })
                .collect(),
        ))
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        Ok(handle
            .context()
            .cte_registry()
            .get(self.id)
            .map(|info| info.logical_prop().max_card())
            .unwrap_or_default())
    }

    fn derive_constraint(&self, handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        match handle.context().cte_registry().get(self.id) {
            Some(info) => Ok(info
                .logical_prop()
                .constraint()
                .copy_with_remapped_columns(&self.mapping(), false)?
                .restricted_to(&self.col_set())),
            None => Ok(ConstraintProperty::default()),
        }
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        match handle.context().cte_registry().get(self.id) {
            Some(info) => Ok(info.statistics().remapped(&self.producer_cols, &self.cols)),
            None => bail!("CTE producer {} is not registered", self.id),
        }
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::CteConsumer2Physical.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalCteConsumer",
            [hash_kind(&self.id), hash_col_seq(&self.cols)],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalCteConsumer(o) => {
                self.id == o.id
                    && equals_col_seq(Some(&self.cols), Some(&o.cols))
                    && equals_col_seq(Some(&self.producer_cols), Some(&o.producer_cols))
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
        LogicalOperator::LogicalCteConsumer(CteConsumer::new(
            self.id,
            remap_cols(&self.cols, mapping, must_exist, factory),
            self.producer_cols.clone(),
        ))
    }
}

impl PhysicalOperatorTrait for CteConsumer {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(singleton(0))
    }
}

impl DisplayFields for CteConsumer {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("id", &self.id)
            .field("cols", &self.cols)
            .finish()
    }
}

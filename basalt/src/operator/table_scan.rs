use std::fmt::Formatter;
use std::sync::Arc;

use enumset::EnumSet;

use crate::catalog::{table_stats_if_exists, TableDesc, TableDistribution};
use crate::column::{
    equals_col_seq, hash_col_seq, remap_cols, ColRef, ColRefMap, ColRefSet, ColumnFactory,
};
use crate::constraint::{
    conjunction, Constraint, ConstraintInterval, ConstraintProperty, LookupStrategy, Range,
};
use crate::datum::Datum;
use crate::error::OptResult;
use crate::operator::{
    hash_all, hash_kind, DeriveHandle, DerivePropContext, DerivePropResult, DisplayFields,
    LogicalOperator, LogicalOperatorTrait, PhysicalOperatorTrait,
};
use crate::optimizer::Optimizer;
use crate::properties::{
    DistributionSpec, KeyCollection, LogicalProperty, MaxCard, OrderSpec, PartInfo,
    PartInfoEntry, PhysicalPropertySet,
};
use crate::rules::RuleId;
use crate::stat::derive::{const_table, table_scan};
use crate::stat::Statistics;

fn table_keys(table: &TableDesc, cols: &[ColRef]) -> KeyCollection {
    KeyCollection::new(
        table
            .keys()
            .iter()
            .filter_map(|key| {
                key.iter()
                    .map(|pos| cols.get(*pos).cloned())
                    .collect::<Option<ColRefSet>>()
            })
            .collect(),
    )
}

fn table_max_card(table: &TableDesc, handle: &DeriveHandle) -> OptResult<MaxCard> {
    Ok(
        match table_stats_if_exists(handle.context().md(), table.id())? {
            Some(stats) => MaxCard::new(stats.rows.ceil() as u64),
            None => MaxCard::unbounded(),
        },
    )
}

fn not_null_constraint(cols: &[ColRef]) -> ConstraintProperty {
    let children = cols
        .iter()
        .filter(|c| !c.is_nullable())
        .map(|c| Arc::new(Constraint::Interval(ConstraintInterval::not_null(c.clone()))))
        .collect();
    ConstraintProperty::new(vec![], conjunction(children, LookupStrategy::Hash))
}

fn table_distribution(table: &TableDesc, cols: &[ColRef]) -> DistributionSpec {
    match table.distribution() {
        TableDistribution::Hashed(positions) => {
            match positions
                .iter()
                .map(|pos| cols.get(*pos).cloned())
                .collect::<Option<Vec<ColRef>>>()
            {
                Some(hash_cols) => DistributionSpec::hashed(hash_cols),
                None => DistributionSpec::random(),
            }
        }
        TableDistribution::Random => DistributionSpec::random(),
        TableDistribution::Replicated => DistributionSpec::Replicated,
        TableDistribution::Singleton => DistributionSpec::Singleton,
    }
}

/// Scan of a table, producing `cols` in table column order.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Get {
    table: Arc<TableDesc>,
    cols: Vec<ColRef>,
}

impl Get {
    pub fn new(table: Arc<TableDesc>, cols: Vec<ColRef>) -> Self {
        Self { table, cols }
    }

    pub fn table(&self) -> &Arc<TableDesc> {
        &self.table
    }

    pub fn cols(&self) -> &[ColRef] {
        &self.cols
    }
}

impl LogicalOperatorTrait for Get {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.cols.iter().collect()
    }

    fn derive_keys(&self, _handle: &DeriveHandle) -> KeyCollection {
        table_keys(&self.table, &self.cols)
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        table_max_card(&self.table, handle)
    }

    fn derive_constraint(&self, _handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        Ok(not_null_constraint(&self.cols))
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        let ctx = handle.context();
        table_scan(&self.table, &self.cols, ctx.md(), ctx.config())
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::Get2TableScan.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalGet",
            [hash_kind(&self.table.id()), hash_col_seq(&self.cols)],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalGet(o) => {
                self.table.id() == o.table.id()
                    && equals_col_seq(Some(&self.cols), Some(&o.cols))
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
        LogicalOperator::LogicalGet(Get::new(
            self.table.clone(),
            remap_cols(&self.cols, mapping, must_exist, factory),
        ))
    }
}

impl PhysicalOperatorTrait for Get {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(vec![DerivePropResult {
            output_prop: PhysicalPropertySet::new(
                table_distribution(&self.table, &self.cols),
                OrderSpec::default(),
            ),
            input_required_props: vec![],
        }])
    }
}

impl DisplayFields for Get {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("table", &self.table.name())
            .field("cols", &self.cols)
            .finish()
    }
}

/// Scan of a partitioned table whose partitions are selected at runtime.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct DynamicGet {
    table: Arc<TableDesc>,
    cols: Vec<ColRef>,
    scan_id: u32,
    part_keys: Vec<ColRef>,
}

impl DynamicGet {
    pub fn new(table: Arc<TableDesc>, cols: Vec<ColRef>, scan_id: u32) -> Self {
        let part_keys = table
            .partition_keys()
            .iter()
            .filter_map(|pos| cols.get(*pos).cloned())
            .collect();
        Self {
            table,
            cols,
            scan_id,
            part_keys,
        }
    }

    pub fn table(&self) -> &Arc<TableDesc> {
        &self.table
    }

    pub fn cols(&self) -> &[ColRef] {
        &self.cols
    }

    pub fn scan_id(&self) -> u32 {
        self.scan_id
    }

    pub fn part_keys(&self) -> &[ColRef] {
        &self.part_keys
    }
}

impl LogicalOperatorTrait for DynamicGet {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.cols.iter().collect()
    }

    fn derive_keys(&self, _handle: &DeriveHandle) -> KeyCollection {
        table_keys(&self.table, &self.cols)
    }

    fn derive_partition_info(&self, _handle: &DeriveHandle) -> OptResult<PartInfo> {
        Ok(PartInfo::new(vec![PartInfoEntry {
            scan_id: self.scan_id,
            table_id: self.table.id(),
            part_keys: self.part_keys.clone(),
        }]))
    }

    fn derive_max_card(&self, handle: &DeriveHandle) -> OptResult<MaxCard> {
        table_max_card(&self.table, handle)
    }

    fn derive_constraint(&self, _handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        Ok(not_null_constraint(&self.cols))
    }

    fn derive_statistics(
        &self,
        handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        let ctx = handle.context();
        table_scan(&self.table, &self.cols, ctx.md(), ctx.config())
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::DynamicGet2DynamicTableScan.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalDynamicGet",
            [
                hash_kind(&self.table.id()),
                hash_kind(&self.scan_id),
                hash_col_seq(&self.cols),
            ],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalDynamicGet(o) => {
                self.table.id() == o.table.id()
                    && self.scan_id == o.scan_id
                    && equals_col_seq(Some(&self.cols), Some(&o.cols))
                    && equals_col_seq(Some(&self.part_keys), Some(&o.part_keys))
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
        let cols = remap_cols(&self.cols, mapping, must_exist, factory);
        let part_keys = remap_cols(&self.part_keys, mapping, must_exist, factory);
        LogicalOperator::LogicalDynamicGet(DynamicGet {
            table: self.table.clone(),
            cols,
            scan_id: self.scan_id,
            part_keys,
        })
    }
}

impl PhysicalOperatorTrait for DynamicGet {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(vec![DerivePropResult {
            output_prop: PhysicalPropertySet::new(
                table_distribution(&self.table, &self.cols),
                OrderSpec::default(),
            ),
            input_required_props: vec![],
        }])
    }
}

impl DisplayFields for DynamicGet {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("table", &self.table.name())
            .field("scan_id", &self.scan_id)
            .field("cols", &self.cols)
            .finish()
    }
}

/// Literal rows. `rows[i][j]` is the value of `cols[j]` in row `i`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ConstTableGet {
    cols: Vec<ColRef>,
    rows: Vec<Vec<Datum>>,
}

impl ConstTableGet {
    pub fn new(cols: Vec<ColRef>, rows: Vec<Vec<Datum>>) -> Self {
        Self { cols, rows }
    }

    pub fn cols(&self) -> &[ColRef] {
        &self.cols
    }

    pub fn rows(&self) -> &[Vec<Datum>] {
        &self.rows
    }
}

impl LogicalOperatorTrait for ConstTableGet {
    fn derive_output_columns(&self, _handle: &DeriveHandle) -> ColRefSet {
        self.cols.iter().collect()
    }

    fn derive_keys(&self, _handle: &DeriveHandle) -> KeyCollection {
        KeyCollection::none()
    }

    fn derive_max_card(&self, _handle: &DeriveHandle) -> OptResult<MaxCard> {
        Ok(MaxCard::new(self.rows.len() as u64))
    }

    /// Each column takes one of the values listed for it.
    fn derive_constraint(&self, _handle: &DeriveHandle) -> OptResult<ConstraintProperty> {
        let children = self
            .cols
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let values = self.rows.iter().filter_map(|r| r.get(idx));
                let include_null = values.clone().any(|v| v.is_null());
                let points = values
                    .filter(|v| !v.is_null())
                    .map(|v| Range::point(v.clone()))
                    .collect();
                Arc::new(Constraint::Interval(ConstraintInterval::new(
                    col.clone(),
                    points,
                    include_null,
                )))
            })
            .collect();
        // Few children, each on its own column
        Ok(ConstraintProperty::new(
            vec![],
            conjunction(children, LookupStrategy::Array),
        ))
    }

    fn derive_statistics(
        &self,
        _handle: &DeriveHandle,
        _prop: &LogicalProperty,
    ) -> OptResult<Statistics> {
        Ok(const_table(&self.cols, &self.rows))
    }

    fn candidate_xforms(&self) -> EnumSet<RuleId> {
        RuleId::ConstTableGet2ConstTableScan.into()
    }

    fn hash_value(&self) -> u64 {
        hash_all(
            "LogicalConstTableGet",
            [hash_col_seq(&self.cols), hash_kind(&self.rows)],
        )
    }

    fn matches(&self, other: &LogicalOperator) -> bool {
        match other {
            LogicalOperator::LogicalConstTableGet(o) => {
                equals_col_seq(Some(&self.cols), Some(&o.cols)) && self.rows == o.rows
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
        LogicalOperator::LogicalConstTableGet(ConstTableGet::new(
            remap_cols(&self.cols, mapping, must_exist, factory),
            self.rows.clone(),
        ))
    }
}

impl PhysicalOperatorTrait for ConstTableGet {
    fn derive_properties<O: Optimizer>(
        &self,
        _context: DerivePropContext<O>,
    ) -> OptResult<Vec<DerivePropResult>> {
        Ok(vec![DerivePropResult {
            output_prop: PhysicalPropertySet::new(DistributionSpec::Singleton, OrderSpec::default()),
            input_required_props: vec![],
        }])
    }
}

impl DisplayFields for ConstTableGet {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("cols", &self.cols)
            .field("rows", &self.rows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;

    use crate::column::{ColRefMap, ColumnFactory};
    use crate::operator::{
        ConstTableGet, DynamicGet, Get, LogicalOperator, LogicalOperatorTrait,
    };
    use crate::test_utils::table_with_columns;

    #[test]
    fn test_get_hash_and_match() {
        let factory = ColumnFactory::new();
        let t1 = table_with_columns(1, "t1", &[("a", DataType::Int32)]);
        let t2 = table_with_columns(2, "t2", &[("a", DataType::Int32)]);
        let a = factory.create_table_column(DataType::Int32, "a", 0, 0, true);
        let b = factory.create_table_column(DataType::Int32, "a", 1, 0, true);

        let g1 = LogicalOperator::LogicalGet(Get::new(t1.clone(), vec![a.clone()]));
        let g1_copy = LogicalOperator::LogicalGet(Get::new(t1.clone(), vec![a.clone()]));
        assert_eq!(g1.hash_value(), g1_copy.hash_value());
        assert!(g1.matches(&g1_copy));

        // Different table
        let g2 = LogicalOperator::LogicalGet(Get::new(t2.clone(), vec![a.clone()]));
        assert!(!g1.matches(&g2));

        // Different output columns
        let g3 = LogicalOperator::LogicalGet(Get::new(t1.clone(), vec![b.clone()]));
        assert!(!g1.matches(&g3));

        // Different scan ids
        let d1 = LogicalOperator::LogicalDynamicGet(DynamicGet::new(t1.clone(), vec![a.clone()], 1));
        let d1_copy =
            LogicalOperator::LogicalDynamicGet(DynamicGet::new(t1.clone(), vec![a.clone()], 1));
        let d2 = LogicalOperator::LogicalDynamicGet(DynamicGet::new(t1, vec![a.clone()], 2));
        assert_eq!(d1.hash_value(), d1_copy.hash_value());
        assert!(d1.matches(&d1_copy));
        assert!(!d1.matches(&d2));
        assert!(!d1.matches(&g1));
    }

    #[test]
    fn test_remap_keeps_structure() {
        let factory = ColumnFactory::new();
        let a = factory.create(DataType::Int32, "a");
        let get = LogicalOperator::LogicalConstTableGet(ConstTableGet::new(
            vec![a.clone()],
            vec![vec![ScalarValue::Int32(Some(1))]],
        ));

        let mut mapping = ColRefMap::new();
        let same = get.copy_with_remapped_columns(&mut mapping, false, &factory);
        assert_eq!(get.hash_value(), same.hash_value());
        assert!(get.matches(&same));

        let fresh = get.copy_with_remapped_columns(&mut mapping, true, &factory);
        assert!(!get.matches(&fresh));
        assert_eq!(1, mapping.len());
    }
}

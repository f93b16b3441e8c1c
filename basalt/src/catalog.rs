//! Metadata accessor consumed by the optimizer.
//!
//! Lookups return [`CatalogError::NotFound`] when the catalog has no entry. Existence checks such
//! as [`cast_exists`] turn exactly that error into `false` and propagate everything else.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arrow_schema::DataType;
use datafusion_expr::{AggregateFunction, Operator as BinaryOp};
use strum_macros::Display;
use thiserror::Error;

use crate::error::OptResult;
use crate::stat::Histogram;

pub type TableId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MdKind {
    Table,
    Statistics,
    Comparison,
    Cast,
    ScalarOp,
    Function,
    Aggregate,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("{kind} {name} not found in catalog")]
    NotFound { kind: MdKind, name: String },
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub fn not_found<S: Into<String>>(kind: MdKind, name: S) -> Self {
        CatalogError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDesc {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// How rows of a table are spread over segments. Column positions refer to
/// [`TableDesc::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableDistribution {
    Hashed(Vec<usize>),
    Random,
    Replicated,
    Singleton,
}

/// Table descriptor. Identity is the table id.
#[derive(Debug, Clone)]
pub struct TableDesc {
    id: TableId,
    name: String,
    columns: Vec<ColumnDesc>,
    keys: Vec<Vec<usize>>,
    distribution: TableDistribution,
    partition_keys: Vec<usize>,
}

impl TableDesc {
    pub fn new<S: Into<String>>(id: TableId, name: S, columns: Vec<ColumnDesc>) -> Self {
        Self {
            id,
            name: name.into(),
            columns,
            keys: vec![],
            distribution: TableDistribution::Random,
            partition_keys: vec![],
        }
    }

    pub fn with_keys(mut self, keys: Vec<Vec<usize>>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_distribution(mut self, distribution: TableDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_partition_keys(mut self, partition_keys: Vec<usize>) -> Self {
        self.partition_keys = partition_keys;
        self
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    pub fn keys(&self) -> &[Vec<usize>] {
        &self.keys
    }

    pub fn distribution(&self) -> &TableDistribution {
        &self.distribution
    }

    pub fn partition_keys(&self) -> &[usize] {
        &self.partition_keys
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_keys.is_empty()
    }
}

impl PartialEq for TableDesc {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TableDesc {}

impl Hash for TableDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

/// Statistics of a base table. Histograms are keyed by column position.
#[derive(Debug, Clone, Default)]
pub struct TableStats {
    pub rows: f64,
    pub histograms: HashMap<usize, Histogram>,
}

/// Flags of a scalar operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarOpProps {
    /// Null on any input yields null.
    pub returns_null_on_null_input: bool,
    pub commutative: bool,
}

pub trait MetadataAccessor: Debug + Send + Sync {
    fn table(&self, id: TableId) -> Result<Arc<TableDesc>, CatalogError>;

    fn table_stats(&self, id: TableId) -> Result<Arc<TableStats>, CatalogError>;

    /// Result type of comparing `left` with `right` using `op`.
    fn comparison(
        &self,
        op: BinaryOp,
        left: &DataType,
        right: &DataType,
    ) -> Result<DataType, CatalogError>;

    /// Name of the cast function from `from` to `to`.
    fn cast(&self, from: &DataType, to: &DataType) -> Result<String, CatalogError>;

    fn scalar_op_props(&self, op: BinaryOp) -> Result<ScalarOpProps, CatalogError>;

    fn function_result_type(
        &self,
        name: &str,
        args: &[DataType],
    ) -> Result<DataType, CatalogError>;

    fn aggregate_result_type(
        &self,
        func: &AggregateFunction,
        arg: Option<&DataType>,
    ) -> Result<DataType, CatalogError>;
}

fn exists<T>(lookup: Result<T, CatalogError>) -> OptResult<Option<T>> {
    match lookup {
        Ok(v) => Ok(Some(v)),
        Err(CatalogError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn cast_exists(
    md: &dyn MetadataAccessor,
    from: &DataType,
    to: &DataType,
) -> OptResult<bool> {
    Ok(exists(md.cast(from, to))?.is_some())
}

pub fn comparison_exists(
    md: &dyn MetadataAccessor,
    op: BinaryOp,
    left: &DataType,
    right: &DataType,
) -> OptResult<bool> {
    Ok(exists(md.comparison(op, left, right))?.is_some())
}

pub fn scalar_op_props_if_exists(
    md: &dyn MetadataAccessor,
    op: BinaryOp,
) -> OptResult<Option<ScalarOpProps>> {
    exists(md.scalar_op_props(op))
}

pub fn table_stats_if_exists(
    md: &dyn MetadataAccessor,
    id: TableId,
) -> OptResult<Option<Arc<TableStats>>> {
    exists(md.table_stats(id))
}

/// Catalog kept in memory, used by tests and embedders without a real catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<TableId, Arc<TableDesc>>,
    stats: HashMap<TableId, Arc<TableStats>>,
    casts: HashSet<(DataType, DataType)>,
    functions: HashMap<String, DataType>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableDesc) -> Arc<TableDesc> {
        let table = Arc::new(table);
        self.tables.insert(table.id(), table.clone());
        table
    }

    pub fn add_table_stats(&mut self, id: TableId, stats: TableStats) {
        self.stats.insert(id, Arc::new(stats));
    }

    pub fn add_cast(&mut self, from: DataType, to: DataType) {
        self.casts.insert((from, to));
    }

    pub fn add_function<S: Into<String>>(&mut self, name: S, return_type: DataType) {
        self.functions.insert(name.into(), return_type);
    }

    pub fn table_by_name(&self, name: &str) -> Option<Arc<TableDesc>> {
        self.tables.values().find(|t| t.name() == name).cloned()
    }
}

fn is_numeric(t: &DataType) -> bool {
    t.is_numeric()
}

fn is_comparison(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::IsDistinctFrom
            | BinaryOp::IsNotDistinctFrom
    )
}

impl MetadataAccessor for InMemoryCatalog {
    fn table(&self, id: TableId) -> Result<Arc<TableDesc>, CatalogError> {
        self.tables
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(MdKind::Table, id.to_string()))
    }

    fn table_stats(&self, id: TableId) -> Result<Arc<TableStats>, CatalogError> {
        self.stats
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(MdKind::Statistics, id.to_string()))
    }

    fn comparison(
        &self,
        op: BinaryOp,
        left: &DataType,
        right: &DataType,
    ) -> Result<DataType, CatalogError> {
        let comparable = left == right
            || (is_numeric(left) && is_numeric(right))
            || self.casts.contains(&(left.clone(), right.clone()))
            || self.casts.contains(&(right.clone(), left.clone()));

        if is_comparison(op) && comparable {
            Ok(DataType::Boolean)
        } else {
            Err(CatalogError::not_found(
                MdKind::Comparison,
                format!("{left:?} {op} {right:?}"),
            ))
        }
    }

    fn cast(&self, from: &DataType, to: &DataType) -> Result<String, CatalogError> {
        if from == to
            || (is_numeric(from) && is_numeric(to))
            || self.casts.contains(&(from.clone(), to.clone()))
        {
            Ok(format!("cast_{from:?}_to_{to:?}").to_lowercase())
        } else {
            Err(CatalogError::not_found(
                MdKind::Cast,
                format!("{from:?} -> {to:?}"),
            ))
        }
    }

    fn scalar_op_props(&self, op: BinaryOp) -> Result<ScalarOpProps, CatalogError> {
        match op {
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Plus | BinaryOp::Multiply => {
                Ok(ScalarOpProps {
                    returns_null_on_null_input: true,
                    commutative: true,
                })
            }
            BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::Minus
            | BinaryOp::Divide
            | BinaryOp::Modulo => Ok(ScalarOpProps {
                returns_null_on_null_input: true,
                commutative: false,
            }),
            BinaryOp::IsDistinctFrom | BinaryOp::IsNotDistinctFrom => Ok(ScalarOpProps {
                returns_null_on_null_input: false,
                commutative: true,
            }),
            other => Err(CatalogError::not_found(MdKind::ScalarOp, other.to_string())),
        }
    }

    fn function_result_type(
        &self,
        name: &str,
        _args: &[DataType],
    ) -> Result<DataType, CatalogError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(MdKind::Function, name))
    }

    fn aggregate_result_type(
        &self,
        func: &AggregateFunction,
        arg: Option<&DataType>,
    ) -> Result<DataType, CatalogError> {
        match (func, arg) {
            (AggregateFunction::Count, _) => Ok(DataType::Int64),
            (AggregateFunction::Avg, Some(t)) if is_numeric(t) => Ok(DataType::Float64),
            (AggregateFunction::Sum, Some(t)) if is_numeric(t) => Ok(t.clone()),
            (AggregateFunction::Min | AggregateFunction::Max, Some(t)) => Ok(t.clone()),
            _ => Err(CatalogError::not_found(
                MdKind::Aggregate,
                format!("{func:?}({arg:?})"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_expr::Operator as BinaryOp;

    use crate::catalog::{
        cast_exists, comparison_exists, scalar_op_props_if_exists, CatalogError, InMemoryCatalog,
        MdKind, MetadataAccessor, TableDesc,
    };

    #[test]
    fn test_existence_checks_map_not_found_to_false() {
        let catalog = InMemoryCatalog::new();

        assert!(cast_exists(&catalog, &DataType::Int32, &DataType::Int64).unwrap());
        assert!(!cast_exists(&catalog, &DataType::Utf8, &DataType::Int64).unwrap());
        assert!(
            comparison_exists(&catalog, BinaryOp::Lt, &DataType::Int32, &DataType::Float64)
                .unwrap()
        );
        assert!(
            !comparison_exists(&catalog, BinaryOp::Lt, &DataType::Utf8, &DataType::Int32)
                .unwrap()
        );
        assert!(scalar_op_props_if_exists(&catalog, BinaryOp::And)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_registered_casts_and_functions() {
        let mut catalog = InMemoryCatalog::new();
        assert!(!cast_exists(&catalog, &DataType::Utf8, &DataType::Date32).unwrap());
        assert!(catalog.function_result_type("lower", &[DataType::Utf8]).is_err());

        catalog.add_cast(DataType::Utf8, DataType::Date32);
        catalog.add_function("lower", DataType::Utf8);
        catalog.add_table(TableDesc::new(3, "t3", vec![]));

        assert!(cast_exists(&catalog, &DataType::Utf8, &DataType::Date32).unwrap());
        assert!(
            comparison_exists(&catalog, BinaryOp::Eq, &DataType::Date32, &DataType::Utf8)
                .unwrap()
        );
        assert_eq!(
            DataType::Utf8,
            catalog
                .function_result_type("lower", &[DataType::Utf8])
                .unwrap()
        );
        assert_eq!(3, catalog.table_by_name("t3").unwrap().id());
        assert!(catalog.table_by_name("t4").is_none());
    }

    #[test]
    fn test_other_errors_propagate() {
        #[derive(Debug)]
        struct Broken;

        impl MetadataAccessor for Broken {
            fn table(
                &self,
                _id: u64,
            ) -> Result<std::sync::Arc<crate::catalog::TableDesc>, CatalogError> {
                Err(CatalogError::Unavailable("down".to_string()))
            }

            fn table_stats(
                &self,
                _id: u64,
            ) -> Result<std::sync::Arc<crate::catalog::TableStats>, CatalogError> {
                Err(CatalogError::Unavailable("down".to_string()))
            }

            fn comparison(
                &self,
                _op: BinaryOp,
                _left: &DataType,
                _right: &DataType,
            ) -> Result<DataType, CatalogError> {
                Err(CatalogError::Unavailable("down".to_string()))
            }

            fn cast(&self, _from: &DataType, _to: &DataType) -> Result<String, CatalogError> {
                Err(CatalogError::Unavailable("down".to_string()))
            }

            fn scalar_op_props(
                &self,
                _op: BinaryOp,
            ) -> Result<crate::catalog::ScalarOpProps, CatalogError> {
                Err(CatalogError::not_found(MdKind::ScalarOp, "any"))
            }

            fn function_result_type(
                &self,
                name: &str,
                _args: &[DataType],
            ) -> Result<DataType, CatalogError> {
                Err(CatalogError::not_found(MdKind::Function, name))
            }

            fn aggregate_result_type(
                &self,
                _func: &datafusion_expr::AggregateFunction,
                _arg: Option<&DataType>,
            ) -> Result<DataType, CatalogError> {
                Err(CatalogError::Unavailable("down".to_string()))
            }
        }

        let err = cast_exists(&Broken, &DataType::Int32, &DataType::Int64).unwrap_err();
        assert_eq!(
            Some(&CatalogError::Unavailable("down".to_string())),
            err.downcast_ref::<CatalogError>()
        );
        assert!(scalar_op_props_if_exists(&Broken, BinaryOp::Eq)
            .unwrap()
            .is_none());
    }
}

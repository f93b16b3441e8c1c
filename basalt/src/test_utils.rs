//! Helpers building tables and their columns for tests.
use std::sync::Arc;

use arrow_schema::{DataType, Schema};

use crate::catalog::{ColumnDesc, InMemoryCatalog, TableDesc, TableId, TableStats};
use crate::column::{ColRef, ColumnFactory};

/// A table with nullable columns named and typed after `columns`.
pub fn table_with_columns(id: TableId, name: &str, columns: &[(&str, DataType)]) -> Arc<TableDesc> {
    let columns = columns
        .iter()
        .map(|(name, data_type)| ColumnDesc {
            name: name.to_string(),
            data_type: data_type.clone(),
            nullable: true,
        })
        .collect();
    Arc::new(TableDesc::new(id, name, columns))
}

/// A table plus the columns a scan of it produces, in table order.
pub fn table_and_columns(
    factory: &ColumnFactory,
    id: TableId,
    name: &str,
    columns: &[(&str, DataType)],
) -> (Arc<TableDesc>, Vec<ColRef>) {
    let table = table_with_columns(id, name, columns);
    let cols = scan_columns(factory, &table);
    (table, cols)
}

/// A table with the fields of `schema` as columns.
pub fn table_from_arrow_schema(id: TableId, name: &str, schema: &Schema) -> TableDesc {
    let columns = schema
        .fields()
        .iter()
        .map(|field| ColumnDesc {
            name: field.name().clone(),
            data_type: field.data_type().clone(),
            nullable: field.is_nullable(),
        })
        .collect();
    TableDesc::new(id, name, columns)
}

/// A catalog holding `tables`, with statistics for those that have some.
pub fn catalog_with_tables<I>(tables: I) -> InMemoryCatalog
where
    I: IntoIterator<Item = (TableDesc, Option<TableStats>)>,
{
    let mut catalog = InMemoryCatalog::new();
    for (table, stats) in tables {
        let id = table.id();
        catalog.add_table(table);
        if let Some(stats) = stats {
            catalog.add_table_stats(id, stats);
        }
    }
    catalog
}

/// Fresh columns for every column of `table`.
pub fn scan_columns(factory: &ColumnFactory, table: &TableDesc) -> Vec<ColRef> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(attno, column)| {
            factory.create_table_column(
                column.data_type.clone(),
                column.name.clone(),
                table.id() as u32,
                attno as i32,
                column.nullable,
            )
        })
        .collect()
}

/// A table from an arrow schema serialized as json.
#[cfg(test)]
pub fn table_from_schema(id: TableId, name: &str, json: &str) -> TableDesc {
    let schema: Schema = serde_json::from_str(json).unwrap();
    table_from_arrow_schema(id, name, &schema)
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use crate::column::ColumnFactory;
    use crate::test_utils::{scan_columns, table_from_schema};

    #[test]
    fn test_table_from_schema() {
        let table = table_from_schema(
            7,
            "t7",
            r#"{
                "fields": [
                    {
                        "name": "id",
                        "data_type": "Int64",
                        "nullable": false,
                        "dict_id": 0,
                        "dict_is_ordered": false,
                        "metadata": {}
                    },
                    {
                        "name": "flag",
                        "data_type": "Boolean",
                        "nullable": true,
                        "dict_id": 0,
                        "dict_is_ordered": false,
                        "metadata": {}
                    }
                ],
                "metadata": {}
            }"#,
        );

        assert_eq!(7, table.id());
        assert_eq!(2, table.columns().len());
        assert_eq!(DataType::Boolean, table.columns()[1].data_type);
        assert!(!table.columns()[0].nullable);

        let cols = scan_columns(&ColumnFactory::new(), &table);
        assert_eq!(2, cols.len());
        assert_ne!(cols[0].id(), cols[1].id());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::column::{ColId, ColRef};
use crate::constraint::{ConstraintRef, ConstraintTrait};

/// How a conjunction or disjunction finds the children constraining one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LookupStrategy {
    /// Scan all children on every lookup.
    Array,
    /// Index single column children by column at construction.
    #[default]
    Hash,
}

/// Returns children referencing `col`.
///
/// With `exclusive` only children whose used columns are exactly `{col}` are returned.
pub fn constraints_on_column(
    children: &[ConstraintRef],
    col: &ColRef,
    exclusive: bool,
) -> Vec<ConstraintRef> {
    children
        .iter()
        .filter(|c| {
            let used = c.used_columns();
            if exclusive {
                used.len() == 1 && used.contains(col)
            } else {
                used.contains(col)
            }
        })
        .cloned()
        .collect()
}

/// Column to constraints index built with one of the [`LookupStrategy`]s.
#[derive(Clone)]
pub(crate) enum ColumnLookup {
    Array,
    Hash(HashMap<ColId, Arc<Vec<ConstraintRef>>>),
}

impl ColumnLookup {
    pub(crate) fn build(strategy: LookupStrategy, children: &[ConstraintRef]) -> Self {
        match strategy {
            LookupStrategy::Array => ColumnLookup::Array,
            LookupStrategy::Hash => {
                let mut index: HashMap<ColId, Vec<ConstraintRef>> = HashMap::new();
                for child in children {
                    let used = child.used_columns();
                    if used.len() != 1 {
                        continue;
                    }
                    if let Some(col) = used.first() {
                        index.entry(col.id()).or_default().push(child.clone());
                    }
                }
                ColumnLookup::Hash(index.into_iter().map(|(k, v)| (k, Arc::new(v))).collect())
            }
        }
    }

    pub(crate) fn strategy(&self) -> LookupStrategy {
        match self {
            ColumnLookup::Array => LookupStrategy::Array,
            ColumnLookup::Hash(_) => LookupStrategy::Hash,
        }
    }

    /// Children whose only used column is `col`.
    pub(crate) fn lookup(&self, children: &[ConstraintRef], col: &ColRef) -> Arc<Vec<ConstraintRef>> {
        match self {
            ColumnLookup::Array => Arc::new(constraints_on_column(children, col, true)),
            ColumnLookup::Hash(index) => index
                .get(&col.id())
                .cloned()
                .unwrap_or_else(|| Arc::new(vec![])),
        }
    }
}

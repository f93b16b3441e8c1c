use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::column::{ColRef, ColRefSet};
use crate::properties::PhysicalProp;

/// Ordering of one column.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Ordering {
    column: ColRef,
    /// Ascending or descending.
    asc: bool,
    /// Should null be treated first.
    null_first: bool,
}

impl Ordering {
    pub fn new(column: ColRef, asc: bool, null_first: bool) -> Self {
        Self {
            column,
            asc,
            null_first,
        }
    }

    pub fn column(&self) -> &ColRef {
        &self.column
    }

    pub fn asc(&self) -> bool {
        self.asc
    }

    pub fn null_first(&self) -> bool {
        self.null_first
    }
}

/// Ordering property specification.
#[derive(Hash, Debug, Clone, Eq, PartialEq, Default)]
pub struct OrderSpec {
    orders: Vec<Ordering>,
}

impl OrderSpec {
    pub fn new(orders: Vec<Ordering>) -> Self {
        Self { orders }
    }

    pub fn orders(&self) -> &[Ordering] {
        &self.orders
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn used_columns(&self) -> ColRefSet {
        self.orders.iter().map(|o| &o.column).collect()
    }
}

impl PhysicalProp for OrderSpec {
    /// An ordering satisfies every prefix of itself.
    fn satisfies(&self, required: &Self) -> bool {
        required.orders.len() <= self.orders.len()
            && required
                .orders
                .iter()
                .zip(self.orders.iter())
                .all(|(r, s)| r == s)
    }
}

impl Display for OrderSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.orders
                .iter()
                .map(|o| format!("{} {}", o.column, if o.asc { "asc" } else { "desc" }))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use crate::column::ColumnFactory;
    use crate::properties::{OrderSpec, Ordering, PhysicalProp};

    #[test]
    fn test_prefix_satisfies() {
        let factory = ColumnFactory::new();
        let a = Ordering::new(factory.create(DataType::Int32, "a"), true, false);
        let b = Ordering::new(factory.create(DataType::Int32, "b"), true, false);

        let ab = OrderSpec::new(vec![a.clone(), b.clone()]);
        assert!(ab.satisfies(&OrderSpec::new(vec![a.clone()])));
        assert!(ab.satisfies(&OrderSpec::default()));
        assert!(!ab.satisfies(&OrderSpec::new(vec![b.clone()])));
        assert!(!OrderSpec::new(vec![a]).satisfies(&ab));
    }
}

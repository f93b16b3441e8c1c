//! Column references and column sets.
//!
//! A [`ColumnRef`] is identified by its integer id only. Two column references with the same id
//! are the same column, no matter what their names or types say, so hashing and equality only
//! look at the id. Columns are shared through [`ColRef`] and never mutated after creation.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arrow_schema::DataType;
use itertools::Itertools;

pub type ColId = u32;

/// Where a column comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Column produced by a table scan.
    Table {
        /// Id of the scan operator producing this column.
        source_op_id: u32,
        /// Attribute number in the table.
        attno: i32,
        nullable: bool,
        width: u32,
    },
    /// Column computed by an expression, e.g. a projection or an aggregate.
    Computed,
}

pub struct ColumnRef {
    id: ColId,
    data_type: DataType,
    type_modifier: i32,
    name: String,
    kind: ColumnKind,
}

pub type ColRef = Arc<ColumnRef>;

impl ColumnRef {
    pub fn id(&self) -> ColId {
        self.id
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        match &self.kind {
            ColumnKind::Table { nullable, .. } => *nullable,
            ColumnKind::Computed => true,
        }
    }

    /// Width in bytes, falling back to the type's fixed width.
    pub fn width(&self) -> f64 {
        match &self.kind {
            ColumnKind::Table { width, .. } => *width as f64,
            ColumnKind::Computed => self
                .data_type
                .primitive_width()
                .map(|w| w as f64)
                .unwrap_or(8.0),
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.data_type, DataType::Boolean)
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ColumnRef {}

impl Hash for ColumnRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialOrd for ColumnRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl Debug for ColumnRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Stable hash of a column id.
pub fn hash_col_id(id: ColId) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// Stable hash of a column, same as the hash of its id.
pub fn hash_col(col: &ColRef) -> u64 {
    hash_col_id(col.id)
}

pub fn combine_hashes(left: u64, right: u64) -> u64 {
    left.rotate_left(5) ^ right
}

/// Order sensitive hash of a column sequence.
pub fn hash_col_seq(cols: &[ColRef]) -> u64 {
    cols.iter()
        .fold(hash_col_id(cols.len() as ColId), |acc, c| {
            combine_hashes(acc, hash_col(c))
        })
}

/// Element wise equality of two optional column sequences.
///
/// Two absent sequences are equal, an absent sequence never equals a present one.
pub fn equals_col_seq(left: Option<&[ColRef]>, right: Option<&[ColRef]>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(l), Some(r)) => l.len() == r.len() && l.iter().zip(r).all(|(a, b)| a.id == b.id),
        _ => false,
    }
}

/// Element wise equality of two optional sequences of column sequences.
pub fn equals_col_seqs(left: Option<&[Vec<ColRef>]>, right: Option<&[Vec<ColRef>]>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(l), Some(r)) => {
            l.len() == r.len()
                && l.iter()
                    .zip(r)
                    .all(|(a, b)| equals_col_seq(Some(a), Some(b)))
        }
        _ => false,
    }
}

/// An unordered set of columns, iterated in id order.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ColRefSet {
    cols: BTreeMap<ColId, ColRef>,
}

impl ColRefSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, col: ColRef) {
        self.cols.insert(col.id, col);
    }

    pub fn extend<'a, I: IntoIterator<Item = &'a ColRef>>(&mut self, cols: I) {
        for c in cols {
            self.insert(c.clone());
        }
    }

    pub fn remove(&mut self, col: &ColRef) -> bool {
        self.cols.remove(&col.id).is_some()
    }

    pub fn contains(&self, col: &ColRef) -> bool {
        self.cols.contains_key(&col.id)
    }

    pub fn contains_id(&self, id: ColId) -> bool {
        self.cols.contains_key(&id)
    }

    pub fn get(&self, id: ColId) -> Option<&ColRef> {
        self.cols.get(&id)
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColRef> {
        self.cols.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ColId> + '_ {
        self.cols.keys().copied()
    }

    pub fn first(&self) -> Option<&ColRef> {
        self.cols.values().next()
    }

    pub fn union(&self, other: &ColRefSet) -> ColRefSet {
        let mut ret = self.clone();
        ret.union_with(other);
        ret
    }

    pub fn union_with(&mut self, other: &ColRefSet) {
        for (id, col) in &other.cols {
            self.cols.entry(*id).or_insert_with(|| col.clone());
        }
    }

    pub fn intersection(&self, other: &ColRefSet) -> ColRefSet {
        self.iter().filter(|c| other.contains(c)).cloned().collect()
    }

    pub fn difference(&self, other: &ColRefSet) -> ColRefSet {
        self.iter().filter(|c| !other.contains(c)).cloned().collect()
    }

    pub fn is_subset(&self, other: &ColRefSet) -> bool {
        self.cols.keys().all(|id| other.cols.contains_key(id))
    }

    pub fn is_disjoint(&self, other: &ColRefSet) -> bool {
        self.cols.keys().all(|id| !other.cols.contains_key(id))
    }

    pub fn to_vec(&self) -> Vec<ColRef> {
        self.cols.values().cloned().collect()
    }

    /// Order insensitive hash.
    pub fn hash_value(&self) -> u64 {
        self.cols
            .keys()
            .fold(0u64, |acc, id| acc.wrapping_add(hash_col_id(*id)))
    }
}

impl FromIterator<ColRef> for ColRefSet {
    fn from_iter<T: IntoIterator<Item = ColRef>>(iter: T) -> Self {
        let mut ret = ColRefSet::new();
        for c in iter {
            ret.insert(c);
        }
        ret
    }
}

impl<'a> FromIterator<&'a ColRef> for ColRefSet {
    fn from_iter<T: IntoIterator<Item = &'a ColRef>>(iter: T) -> Self {
        iter.into_iter().cloned().collect()
    }
}

impl Debug for ColRefSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().map(|c| c.to_string()).join(", "))
    }
}

/// Column substitution map used by column remapping copies.
#[derive(Clone, Default, Debug)]
pub struct ColRefMap {
    mapping: HashMap<ColId, ColRef>,
}

impl ColRefMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps each column of `from` to the column at the same position of `to`.
    pub fn from_pairs(from: &[ColRef], to: &[ColRef]) -> Self {
        let mut ret = Self::new();
        for (f, t) in from.iter().zip(to) {
            ret.insert(f, t.clone());
        }
        ret
    }

    pub fn insert(&mut self, from: &ColRef, to: ColRef) {
        self.mapping.insert(from.id, to);
    }

    pub fn get(&self, col: &ColRef) -> Option<&ColRef> {
        self.mapping.get(&col.id)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// Allocates columns with fresh ids.
#[derive(Debug, Default)]
pub struct ColumnFactory {
    next_id: AtomicU32,
}

impl ColumnFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ColId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates a computed column.
    pub fn create<S: Into<String>>(&self, data_type: DataType, name: S) -> ColRef {
        self.create_with_modifier(data_type, -1, name)
    }

    pub fn create_with_modifier<S: Into<String>>(
        &self,
        data_type: DataType,
        type_modifier: i32,
        name: S,
    ) -> ColRef {
        Arc::new(ColumnRef {
            id: self.next_id(),
            data_type,
            type_modifier,
            name: name.into(),
            kind: ColumnKind::Computed,
        })
    }

    /// Creates a column produced by a table scan.
    pub fn create_table_column<S: Into<String>>(
        &self,
        data_type: DataType,
        name: S,
        source_op_id: u32,
        attno: i32,
        nullable: bool,
    ) -> ColRef {
        let width = data_type.primitive_width().unwrap_or(8) as u32;
        Arc::new(ColumnRef {
            id: self.next_id(),
            data_type,
            type_modifier: -1,
            name: name.into(),
            kind: ColumnKind::Table {
                source_op_id,
                attno,
                nullable,
                width,
            },
        })
    }

    /// Creates a fresh computed column with the same type and name as `col`.
    pub fn copy_of(&self, col: &ColRef) -> ColRef {
        self.create_with_modifier(col.data_type.clone(), col.type_modifier, col.name.clone())
    }
}

/// Remaps one column.
///
/// When the mapping has no entry for `col`, a fresh column is created and recorded if
/// `must_exist` is set, otherwise `col` is kept.
pub fn remap_col(
    col: &ColRef,
    mapping: &mut ColRefMap,
    must_exist: bool,
    factory: &ColumnFactory,
) -> ColRef {
    if let Some(mapped) = mapping.get(col) {
        return mapped.clone();
    }

    if must_exist {
        let fresh = factory.copy_of(col);
        mapping.insert(col, fresh.clone());
        fresh
    } else {
        col.clone()
    }
}

pub fn remap_cols(
    cols: &[ColRef],
    mapping: &mut ColRefMap,
    must_exist: bool,
    factory: &ColumnFactory,
) -> Vec<ColRef> {
    cols.iter()
        .map(|c| remap_col(c, mapping, must_exist, factory))
        .collect()
}

pub fn remap_col_set(
    cols: &ColRefSet,
    mapping: &mut ColRefMap,
    must_exist: bool,
    factory: &ColumnFactory,
) -> ColRefSet {
    cols.iter()
        .map(|c| remap_col(c, mapping, must_exist, factory))
        .collect()
}

//! Properties of relation operators.
//!
//! There are two kinds of properties: [`LogicalProperty`] and [`PhysicalPropertySet`].
//! Logical properties are shared by logically equivalent plans, such as output columns, keys and
//! constraints, and are derived once per memo group. Physical properties are concerned with data
//! distribution and ordering, they are required top down and delivered bottom up.

mod distribution;

use std::fmt::Debug;
use std::hash::Hash;

pub use distribution::*;
mod order;
pub use order::*;
mod logical;
pub use logical::*;
mod physical;
pub use physical::*;

pub trait PhysicalProp: Debug + Hash {
    /// Tests whether self satisfies `required`.
    fn satisfies(&self, required: &Self) -> bool;
}

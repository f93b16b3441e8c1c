//! Cascades style search over a memo of equivalent expressions.
//!
//! The input plan is loaded into a [`memo::Memo`], one group per set of logically equivalent
//! expressions. A stack of tasks then explores groups with exploration rules, implements them
//! with implementation rules and costs physical expressions top down for the required physical
//! property, appending enforcers where an expression can't deliver it. The search runs in
//! [`SearchStage`]s, each with its own rules and thresholds.
mod binding;
mod memo;
mod optimizer;
mod search;
mod task;

pub use memo::{Group, GroupExpr, GroupExprId, GroupId};
pub use optimizer::CascadesOptimizer;
pub use search::SearchStage;

//! ## Background
//!
//! The query optimizer accepts an unoptimized logical query plan, and outputs an optimized physical
//! plan ready to be executed. This crate implements a cost based optimizer for massively parallel
//! databases: besides the join order and join algorithm, it decides where data has to move
//! between segments, so data distribution is a physical property next to sort order.
//!
//! [2] proposed a top-down searching strategy to enumerate possible plans, and used dynamic
//! programming to reduce duplicated computation. The search here follows it, extended with the
//! staged search and the enforcer framework of [3]: a plan that can't deliver the required order
//! or distribution gets a sort or a motion appended, and the search compares the cost of doing
//! so with the cost of alternatives delivering the property natively.
//!
//! Statistics and constraints are derived once per memo group. Constraints prove that a
//! relation is empty or bound its cardinality, statistics carry per column histograms estimating
//! row counts for costing.
//!
//! ## Design
//!
//! * [`cascades`] Cascades style cost based optimizer.
//! * [`catalog`] Metadata accessed during optimization.
//! * [`column`] Column references and column sets.
//! * [`constraint`] Column constraints derived from predicates.
//! * [`cost`] Cost model.
//! * [`operator`] Relational operators.
//! * [`plan`] Plans, plan builders and plan explanation.
//! * [`properties`] Logical and physical properties.
//! * [`rules`] Optimization rule definition and implementation.
//! * [`scalar`] Scalar expressions carried by operators.
//! * [`stat`] Histograms and statistics derivation.
//!
//! ## Reference
//!
//! 1. Selinger, P. Griffiths, et al. "Access path selection in a relational database management
//! system." Readings in Artificial Intelligence and Databases. Morgan Kaufmann, 1989. 511-522.
//! 2. Graefe, G., 1995. The cascades framework for query optimization. IEEE Data Eng. Bull., 18(3),
//! pp.19-29.
//! 3. Soliman, M.A., Antova, L., Raghavan, V., El-Helw, A., Gu, Z., Shen, E., Caragea, G.C.,
//! Garcia-Alvarado, C., Rahman, F., Petropoulos, M. and Waas, F., 2014, June. Orca: a modular
//! query optimizer architecture for big data. In Proceedings of the 2014 ACM SIGMOD
//! international conference on Management of data (pp. 337-348).

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod cascades;
pub mod catalog;
pub mod column;
pub mod constraint;
pub mod cost;
pub mod datum;
pub mod error;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod properties;
pub mod rules;
pub mod scalar;
pub mod stat;

#[doc(hidden)]
pub mod test_utils;

//! Pull-based query operators.
//!
//! Plans are trees of [`Operator`]s, each wrapping one [`PlanNode`]. Leaves
//! produce tuples ([`SeqScan`], [`Values`]); inner nodes transform the stream
//! of their children.

mod aggregate;
mod delete;
mod filter;
mod insert;
mod join;
mod operator;
mod predicate;
mod seq_scan;
mod values;

pub use aggregate::{Aggregate, AggregateOp};
pub use delete::Delete;
pub use filter::Filter;
pub use insert::Insert;
pub use join::Join;
pub use operator::{Operator, PlanNode};
pub use predicate::{JoinPredicate, Predicate};
pub use seq_scan::SeqScan;
pub use values::Values;

mod data_type;
mod field;
mod schema;
mod tuple;

pub use data_type::DataType;
pub use field::{CompareOp, Field};
pub use schema::{Column, Schema, SchemaBuilder};
pub use tuple::{Tuple, TupleBuilder};

mod lock_manager;
mod transaction;
mod wait_for_graph;

pub use lock_manager::*;
pub use transaction::Transaction;
pub use wait_for_graph::WaitForGraph;

//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{HandleResult, handle_response};
pub use machine::{Transaction, TransactionState};

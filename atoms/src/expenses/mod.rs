pub mod model;
pub mod service;

pub use model::{CreateExpensePayload, Expense, Receipt};
pub use service::*;

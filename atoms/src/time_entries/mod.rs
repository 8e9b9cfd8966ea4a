pub mod model;
pub mod service;

pub use model::{CreateTimeEntryPayload, TimeEntry};
pub use service::*;

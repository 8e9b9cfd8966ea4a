pub mod model;
pub mod service;

pub use model::{CreateTaskPayload, Task, TaskStatus, UpdateTaskPayload};
pub use service::*;

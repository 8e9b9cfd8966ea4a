pub mod model;
pub mod service;

pub use model::{CreateProjectPayload, Project};
pub use service::*;

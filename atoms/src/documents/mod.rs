pub mod model;
pub mod service;

pub use model::Document;
pub use service::*;

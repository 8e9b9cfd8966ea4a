pub mod blob;
pub mod error;
pub mod session;
pub mod store;

pub use error::DataError;

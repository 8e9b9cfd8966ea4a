pub mod authz;
pub mod documents;
pub mod expenses;
pub mod gateway;
pub mod projects;
pub mod tasks;
pub mod time_entries;

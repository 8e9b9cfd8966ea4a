//! Realtime composition layer: live-query subscriptions over the document
//! store, the upload coordinator, and the upload-then-record flows that
//! combine blob and record writes.

pub mod flows;
pub mod subscription;
pub mod upload;

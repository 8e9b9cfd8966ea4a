//! In-memory [`BlobStore`] for tests. Records the order of committed
//! operations so tests can assert two-step delete sequencing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::blob::{BlobStore, BlobUpload};
use crate::error::DataError;

pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    ops: Arc<Mutex<Vec<String>>>,
    fail_deletes: AtomicBool,
    fail_uploads: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(Mutex::new(Vec::new())))
    }

    /// Share an operation log with the caller, e.g. to interleave blob ops
    /// with record ops in one observed sequence.
    pub fn with_ops(ops: Arc<Mutex<Vec<String>>>) -> Self {
        MemoryBlobStore {
            objects: Arc::new(Mutex::new(HashMap::new())),
            ops,
            fail_deletes: AtomicBool::new(false),
            fail_uploads: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make subsequent `delete` calls fail with a transport error.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make chunk writes of in-flight and future uploads fail with a
    /// transport error; nothing gets committed.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingUpload {
    path: String,
    buffer: Vec<u8>,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    ops: Arc<Mutex<Vec<String>>>,
    fail_uploads: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl BlobUpload for PendingUpload {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DataError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(DataError::Transport(format!(
                "blob write failed: {}",
                self.path
            )));
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), DataError> {
        self.objects
            .lock()
            .unwrap()
            .insert(self.path.clone(), self.buffer);
        self.ops
            .lock()
            .unwrap()
            .push(format!("blob.put {}", self.path));
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), DataError> {
        // Nothing committed until finish; dropping the buffer is enough.
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn begin_upload(
        &self,
        path: &str,
        _total_bytes: u64,
    ) -> Result<Box<dyn BlobUpload>, DataError> {
        Ok(Box::new(PendingUpload {
            path: path.to_string(),
            buffer: Vec::new(),
            objects: Arc::clone(&self.objects),
            ops: Arc::clone(&self.ops),
            fail_uploads: Arc::clone(&self.fail_uploads),
        }))
    }

    async fn delete(&self, path: &str) -> Result<(), DataError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DataError::Transport(format!("blob delete failed: {}", path)));
        }
        self.objects.lock().unwrap().remove(path);
        self.ops
            .lock()
            .unwrap()
            .push(format!("blob.delete {}", path));
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, DataError> {
        if !self.contains(path) {
            return Err(DataError::not_found("blobs", path));
        }
        Ok(format!("memory://{}", path))
    }
}

//! Upload coordinator: chunked blob transfer with observable progress.
//!
//! Per upload: `Idle → Uploading(progress) → Completed | Failed`. Progress
//! fractions are bytes-sent over total bytes, so they never decrease. The
//! destination path is built from the parent namespace plus an upload-time
//! instant and the original file name, which keeps identically named files
//! from colliding.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use taskhub_shared::blob::BlobStore;
use taskhub_shared::error::DataError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Path for a project document, optionally namespaced under a task.
pub fn document_path(project_id: &str, task_id: Option<&str>, file_name: &str) -> String {
    let prefix = match task_id {
        Some(task_id) => format!("projects/{}/tasks/{}/", project_id, task_id),
        None => format!("projects/{}/general/", project_id),
    };
    format!("{}{}_{}", prefix, Utc::now().timestamp_millis(), file_name)
}

/// Path for an expense receipt.
pub fn receipt_path(project_id: &str, file_name: &str) -> String {
    format!(
        "projects/{}/receipts/{}_{}",
        project_id,
        Utc::now().timestamp_millis(),
        file_name
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    /// Fraction of bytes transferred, in [0, 1].
    Uploading(f64),
    Completed(UploadResult),
    Failed(String),
}

/// Handle to an in-flight upload. Dropping it mid-transfer requests a
/// best-effort abort, as when the owning form is dismissed.
pub struct Upload {
    state: watch::Receiver<UploadState>,
    cancel: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

impl Upload {
    pub fn current(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<UploadState> {
        self.state.clone()
    }

    /// Request a best-effort abort. Bytes the backend already committed
    /// remain an orphan blob.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Wait for the terminal state. No metadata is written here; callers
    /// record metadata only after this returns the path and url.
    pub async fn wait(mut self) -> Result<UploadResult, DataError> {
        // Disarm drop-cancellation: waiting means we want the transfer.
        self.cancel = None;
        let mut rx = self.state.clone();
        loop {
            let terminal = match &*rx.borrow() {
                UploadState::Completed(result) => Some(Ok(result.clone())),
                UploadState::Failed(message) => Some(Err(DataError::Transport(message.clone()))),
                _ => None,
            };
            if let Some(result) = terminal {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(DataError::Transport("upload task ended".to_string()));
            }
        }
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

enum UploadFailure {
    Cancelled,
    Error(DataError),
}

/// Start streaming `bytes` to `path`.
pub fn start_upload(blobs: Arc<dyn BlobStore>, path: String, bytes: Vec<u8>) -> Upload {
    let (tx, rx) = watch::channel(UploadState::Idle);
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        match run_upload(blobs, &path, bytes, &tx, cancel_rx).await {
            Ok(url) => {
                tx.send_replace(UploadState::Completed(UploadResult { path, url }));
            }
            Err(UploadFailure::Cancelled) => {
                tx.send_replace(UploadState::Failed("upload cancelled".to_string()));
            }
            Err(UploadFailure::Error(e)) => {
                tx.send_replace(UploadState::Failed(e.to_string()));
            }
        }
    });
    Upload {
        state: rx,
        cancel: Some(cancel_tx),
        _task: task,
    }
}

async fn run_upload(
    blobs: Arc<dyn BlobStore>,
    path: &str,
    bytes: Vec<u8>,
    tx: &watch::Sender<UploadState>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<String, UploadFailure> {
    let total = bytes.len();
    let mut upload = blobs
        .begin_upload(path, total as u64)
        .await
        .map_err(UploadFailure::Error)?;

    tx.send_replace(UploadState::Uploading(0.0));
    let mut sent = 0usize;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        // Cancellation is only observed between chunks; best-effort.
        if cancel.try_recv().is_ok() {
            if let Err(e) = upload.abort().await {
                tracing::warn!(path, error = %e, "abort after cancellation failed");
            }
            return Err(UploadFailure::Cancelled);
        }
        upload.write_chunk(chunk).await.map_err(UploadFailure::Error)?;
        sent += chunk.len();
        tx.send_replace(UploadState::Uploading(sent as f64 / total as f64));
    }
    if total == 0 {
        tx.send_replace(UploadState::Uploading(1.0));
    }

    upload.finish().await.map_err(UploadFailure::Error)?;
    blobs
        .download_url(path)
        .await
        .map_err(UploadFailure::Error)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use taskhub_shared::blob::memory::MemoryBlobStore;
    use taskhub_shared::blob::{BlobStore, BlobUpload};

    use super::*;

    /// Blob store whose chunk writes and finish wait for a permit from the
    /// test, so progress can be observed one step at a time.
    struct GatedBlobStore {
        inner: MemoryBlobStore,
        permits: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl GatedBlobStore {
        fn new(permits: mpsc::Receiver<()>) -> Self {
            GatedBlobStore {
                inner: MemoryBlobStore::new(),
                permits: Mutex::new(Some(permits)),
            }
        }
    }

    struct GatedUpload {
        inner: Box<dyn BlobUpload>,
        permits: mpsc::Receiver<()>,
    }

    #[async_trait::async_trait]
    impl BlobUpload for GatedUpload {
        async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DataError> {
            self.permits.recv().await;
            self.inner.write_chunk(chunk).await
        }

        async fn finish(self: Box<Self>) -> Result<(), DataError> {
            let mut this = *self;
            this.permits.recv().await;
            this.inner.finish().await
        }

        async fn abort(self: Box<Self>) -> Result<(), DataError> {
            self.inner.abort().await
        }
    }

    #[async_trait::async_trait]
    impl BlobStore for GatedBlobStore {
        async fn begin_upload(
            &self,
            path: &str,
            total_bytes: u64,
        ) -> Result<Box<dyn BlobUpload>, DataError> {
            let permits = self
                .permits
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| DataError::Transport("one upload per store".to_string()))?;
            Ok(Box::new(GatedUpload {
                inner: self.inner.begin_upload(path, total_bytes).await?,
                permits,
            }))
        }

        async fn delete(&self, path: &str) -> Result<(), DataError> {
            self.inner.delete(path).await
        }

        async fn download_url(&self, path: &str) -> Result<String, DataError> {
            self.inner.download_url(path).await
        }
    }

    #[test]
    fn paths_are_namespaced_by_parent() {
        let general = document_path("p1", None, "plan.pdf");
        assert!(general.starts_with("projects/p1/general/"));
        assert!(general.ends_with("_plan.pdf"));

        let task_scoped = document_path("p1", Some("t9"), "notes.txt");
        assert!(task_scoped.starts_with("projects/p1/tasks/t9/"));

        assert!(receipt_path("p1", "r.png").starts_with("projects/p1/receipts/"));
    }

    #[tokio::test]
    async fn upload_completes_with_path_and_url() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let bytes = vec![7u8; 3 * CHUNK_SIZE + 11];
        let upload = start_upload(blobs.clone(), "projects/p1/general/1_f.bin".to_string(), bytes.clone());

        let result = upload.wait().await.unwrap();
        assert_eq!(result.path, "projects/p1/general/1_f.bin");
        assert_eq!(result.url, "memory://projects/p1/general/1_f.bin");
        assert_eq!(blobs.object(&result.path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn observed_progress_is_monotone_and_ends_at_one() {
        const CHUNKS: usize = 5;
        let (permit_tx, permit_rx) = mpsc::channel(1);
        let blobs = Arc::new(GatedBlobStore::new(permit_rx));
        let upload = start_upload(
            blobs,
            "projects/p1/general/2_f.bin".to_string(),
            vec![0u8; CHUNKS * CHUNK_SIZE],
        );
        let mut rx = upload.watch();

        // Release one chunk at a time and watch the fraction advance; the
        // gated finish keeps the final fraction observable before Completed
        // replaces it.
        let mut seen = Vec::new();
        for chunk in 1..=CHUNKS {
            permit_tx.send(()).await.unwrap();
            let target = chunk as f64 / CHUNKS as f64;
            loop {
                rx.changed().await.unwrap();
                if let UploadState::Uploading(p) = rx.borrow_and_update().clone() {
                    seen.push(p);
                    if p >= target {
                        break;
                    }
                }
            }
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(seen.last().copied(), Some(1.0), "progress never reached 1.0: {:?}", seen);

        permit_tx.send(()).await.unwrap();
        let result = upload.wait().await.unwrap();
        assert_eq!(result.path, "projects/p1/general/2_f.bin");
    }

    #[tokio::test]
    async fn cancelled_upload_fails_without_committing() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let mut upload = start_upload(
            blobs.clone(),
            "projects/p1/general/3_f.bin".to_string(),
            vec![0u8; 50 * CHUNK_SIZE],
        );
        upload.cancel();

        let mut rx = upload.watch();
        loop {
            match rx.borrow_and_update().clone() {
                UploadState::Failed(message) => {
                    assert!(message.contains("cancelled"));
                    break;
                }
                UploadState::Completed(_) => {
                    // Cancellation raced completion; nothing to assert.
                    return;
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        assert!(!blobs.contains("projects/p1/general/3_f.bin"));
    }
}

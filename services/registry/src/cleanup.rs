//! Best-effort reclamation of photos that no guest points at anymore.
//!
//! Deletions are queued after the owning row change has committed and run on a
//! background task, so a slow or failing disk never delays an HTTP response.
//! Failures are logged and counted, never retried.

use crate::asset_manager::{AssetManager, AssetRef};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum CleanupJob {
    Delete(AssetRef),
    Flush(oneshot::Sender<()>),
}

/// Handle for scheduling asset deletions on the cleanup worker
#[derive(Clone, Debug)]
pub struct CleanupQueue {
    tx: mpsc::UnboundedSender<CleanupJob>,
}

impl std::fmt::Debug for CleanupJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupJob::Delete(asset) => f.debug_tuple("Delete").field(asset).finish(),
            CleanupJob::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl CleanupQueue {
    /// Spawn the worker task. It stops once every queue handle is dropped.
    pub fn spawn(assets: Arc<AssetManager>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(assets, rx));
        (Self { tx }, handle)
    }

    /// Schedule deletion of an asset no guest references anymore.
    /// The default avatar and `None` are ignored.
    pub fn retire(&self, asset: Option<AssetRef>) {
        let Some(asset) = asset.filter(AssetRef::is_owned) else {
            return;
        };

        debug!(asset = %asset, "Scheduling photo cleanup");
        if let Err(mpsc::error::SendError(job)) = self.tx.send(CleanupJob::Delete(asset)) {
            warn!(job = ?job, "Cleanup worker stopped, photo left on disk");
            metrics::counter!("registry.assets.cleanup_failed").increment(1);
        }
    }

    /// Wait until every deletion scheduled before this call has been attempted
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(CleanupJob::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run_worker(assets: Arc<AssetManager>, mut rx: mpsc::UnboundedReceiver<CleanupJob>) {
    info!("Cleanup worker started");

    while let Some(job) = rx.recv().await {
        match job {
            CleanupJob::Delete(asset) => {
                if let Err(e) = assets.delete(Some(&asset)).await {
                    warn!(asset = %asset, error = %e, "Failed to delete retired photo");
                    metrics::counter!("registry.assets.cleanup_failed").increment(1);
                }
            }
            CleanupJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    info!("Cleanup worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_manager::Upload;
    use crate::config::AssetConfig;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<AssetManager>, CleanupQueue) {
        let dir = TempDir::new().unwrap();
        let assets = Arc::new(AssetManager::new(&AssetConfig::in_dir(dir.path())).await.unwrap());
        let (queue, _handle) = CleanupQueue::spawn(Arc::clone(&assets));
        (dir, assets, queue)
    }

    #[tokio::test]
    async fn test_retire_deletes_after_flush() {
        let (_dir, assets, queue) = setup().await;
        let asset = assets.store(&Upload::new(b"old".to_vec())).await.unwrap();

        queue.retire(Some(asset.clone()));
        queue.flush().await;

        assert!(!assets.exists(&asset).await);
    }

    #[tokio::test]
    async fn test_retire_ignores_default_and_none() {
        let (_dir, assets, queue) = setup().await;

        queue.retire(Some(AssetRef::Default));
        queue.retire(None);
        queue.flush().await;

        assert!(assets.exists(&AssetRef::Default).await);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_worker() {
        let (dir, assets, queue) = setup().await;

        // A directory cannot be removed with remove_file
        std::fs::create_dir(dir.path().join("stuck.png")).unwrap();
        let stuck = AssetRef::Stored("stuck.png".to_string());
        let fine = assets.store(&Upload::new(b"bye".to_vec())).await.unwrap();

        queue.retire(Some(stuck.clone()));
        queue.retire(Some(fine.clone()));
        queue.flush().await;

        assert!(assets.exists(&stuck).await);
        assert!(!assets.exists(&fine).await);
    }
}

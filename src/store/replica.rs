use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{TrackerError, TrackerResult};

use super::write_atomically;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::replica";

use crate::{log_debug, log_warn};

/// Receives a copy of the durable form after every successful local save.
/// Failures are logged by the store and never undo the local write.
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn replicate(&self, payload: &[u8]) -> TrackerResult<()>;
}

/// Keeps a second copy of the record file at another path (a mounted volume,
/// a synced folder, ...).
#[derive(Debug, Clone)]
pub struct FileMirror {
    target: PathBuf,
}

impl FileMirror {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Replicator for FileMirror {
    async fn replicate(&self, payload: &[u8]) -> TrackerResult<()> {
        let target = self.target.clone();
        let payload = payload.to_vec();

        tokio::task::spawn_blocking(move || write_atomically(&target, &payload))
            .await
            .map_err(TrackerError::collaborator)?
            .map_err(TrackerError::collaborator)
    }
}

/// Single worker feeding a [`Replicator`] in save order. Only the newest
/// payload is kept while a replication is in flight, so the replica can skip
/// intermediate saves but never ends up behind the last one.
pub(crate) struct ReplicaFeed {
    latest: watch::Sender<Arc<Vec<u8>>>,
}

impl ReplicaFeed {
    /// `None` outside a tokio runtime.
    pub(crate) fn spawn(replicator: Arc<dyn Replicator>) -> Option<Self> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let (latest, mut pending) = watch::channel(Arc::new(Vec::new()));

        handle.spawn(async move {
            // ends once the store (and with it the sender) is dropped
            while pending.changed().await.is_ok() {
                let payload = pending.borrow_and_update().clone();
                if let Err(err) = replicator.replicate(&payload).await {
                    log_warn!("Replication failed: {err}");
                }
            }
            log_debug!("Replication worker stopped");
        });
        Some(Self { latest })
    }

    pub(crate) fn push(&self, payload: Vec<u8>) {
        self.latest.send_replace(Arc::new(payload));
    }
}

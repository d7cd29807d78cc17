use crate::models::AttemptUpdate;
use crate::store::AttemptStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// A write the content was told succeeded but the store rejected.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFailure {
    pub attempt_id: Uuid,
    pub error: String,
    pub at: DateTime<Utc>,
}

pub type FailureSender = mpsc::UnboundedSender<SaveFailure>;

enum WriteOp {
    Save(AttemptUpdate),
    Flush(oneshot::Sender<()>),
}

/// Detached per-session writer. Saves run in the order they were scheduled;
/// the task ends once the owning runtime is dropped and the queue drains.
pub(crate) struct AttemptWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
    attempt_id: Uuid,
}

impl AttemptWriter {
    pub fn spawn(
        store: Arc<dyn AttemptStore>,
        attempt_id: Uuid,
        failures: Option<FailureSender>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Save(update) => match store.save(attempt_id, &update).await {
                        Ok(()) => {
                            tracing::debug!(attempt_id = %attempt_id, status = ?update.status, "attempt saved");
                        }
                        Err(e) => {
                            tracing::error!(attempt_id = %attempt_id, error = %e, "attempt save failed");
                            if let Some(failures) = &failures {
                                let _ = failures.send(SaveFailure {
                                    attempt_id,
                                    error: e.to_string(),
                                    at: Utc::now(),
                                });
                            }
                        }
                    },
                    WriteOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx, attempt_id }
    }

    /// Queues a save and returns immediately.
    pub fn schedule(&self, update: AttemptUpdate) {
        if self.tx.send(WriteOp::Save(update)).is_err() {
            tracing::error!(attempt_id = %self.attempt_id, "attempt writer stopped, save dropped");
        }
    }

    /// Resolves once every save scheduled so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

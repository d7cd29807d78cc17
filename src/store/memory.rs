use super::AttemptStore;
use crate::error::StoreError;
use crate::models::{AttemptRecord, AttemptUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryAttemptStore {
    attempts: RwLock<HashMap<Uuid, AttemptRecord>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn insert(&self, record: &AttemptRecord) -> Result<(), StoreError> {
        let mut attempts = self.attempts.write().await;
        if attempts.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        attempts.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(self.attempts.read().await.get(&attempt_id).cloned())
    }

    async fn save(&self, attempt_id: Uuid, update: &AttemptUpdate) -> Result<(), StoreError> {
        let mut attempts = self.attempts.write().await;
        let record = attempts
            .get_mut(&attempt_id)
            .ok_or(StoreError::NotFound(attempt_id))?;
        record.apply(update);
        Ok(())
    }

    async fn list(&self, user_id: &str, package_id: Uuid) -> Result<Vec<AttemptRecord>, StoreError> {
        let attempts = self.attempts.read().await;
        let mut out: Vec<AttemptRecord> = attempts
            .values()
            .filter(|a| a.user_id == user_id && a.package_id == package_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.attempt_number);
        Ok(out)
    }

    async fn max_attempt_number(&self, user_id: &str, package_id: Uuid) -> Result<i32, StoreError> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .filter(|a| a.user_id == user_id && a.package_id == package_id)
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0))
    }
}

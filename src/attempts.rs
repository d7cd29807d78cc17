//! Attempt lifecycle: creating new attempts, finding one to resume, and the
//! read-only queries used by progress dashboards.

use crate::error::StoreError;
use crate::models::AttemptRecord;
use crate::store::AttemptStore;
use uuid::Uuid;

/// Creates the next attempt for a learner on a package. Numbering continues
/// from the highest existing attempt; no ceiling is enforced here.
pub async fn create_attempt(
    store: &dyn AttemptStore,
    user_id: &str,
    package_id: Uuid,
) -> Result<AttemptRecord, StoreError> {
    let next = store.max_attempt_number(user_id, package_id).await? + 1;
    let record = AttemptRecord::new(user_id, package_id, next);
    store.insert(&record).await?;
    tracing::info!(
        attempt_id = %record.id,
        user_id,
        package_id = %package_id,
        attempt_number = next,
        "attempt created"
    );
    Ok(record)
}

/// Id of the most recent attempt, but only while it can still be resumed.
/// Terminal attempts yield `None`; callers create a new attempt to retry.
pub async fn get_latest_attempt(
    store: &dyn AttemptStore,
    user_id: &str,
    package_id: Uuid,
) -> Result<Option<Uuid>, StoreError> {
    let attempts = store.list(user_id, package_id).await?;
    Ok(attempts
        .iter()
        .max_by_key(|a| a.attempt_number)
        .filter(|a| a.status.is_resumable())
        .map(|a| a.id))
}

pub async fn list_attempts(
    store: &dyn AttemptStore,
    user_id: &str,
    package_id: Uuid,
) -> Result<Vec<AttemptRecord>, StoreError> {
    store.list(user_id, package_id).await
}

pub async fn get_attempt(
    store: &dyn AttemptStore,
    attempt_id: Uuid,
) -> Result<Option<AttemptRecord>, StoreError> {
    store.load(attempt_id).await
}

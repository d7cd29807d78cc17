//! Attempt persistence.
//!
//! The runtimes only ever see the [`AttemptStore`] trait. `load` happens once
//! when a session opens, `save` on every commit and on terminate. Everything
//! else is used by the attempt lifecycle helpers and the query endpoints.

use crate::error::StoreError;
use crate::models::{AttemptRecord, AttemptUpdate};
use async_trait::async_trait;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryAttemptStore;
pub use postgres::PgAttemptStore;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Stores a freshly created attempt.
    async fn insert(&self, record: &AttemptRecord) -> Result<(), StoreError>;

    async fn load(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>, StoreError>;

    /// Applies a partial update. Fields left `None` keep their stored value.
    async fn save(&self, attempt_id: Uuid, update: &AttemptUpdate) -> Result<(), StoreError>;

    /// Every attempt for the pair, ordered by attempt number ascending.
    async fn list(&self, user_id: &str, package_id: Uuid) -> Result<Vec<AttemptRecord>, StoreError>;

    /// Highest attempt number for the pair, `0` when none exist.
    async fn max_attempt_number(&self, user_id: &str, package_id: Uuid) -> Result<i32, StoreError>;
}

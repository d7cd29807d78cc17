use super::AttemptStore;
use crate::db::Db;
use crate::error::StoreError;
use crate::models::{AttemptRecord, AttemptUpdate, CmiData, Score};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, user_id, package_id, attempt_number, status, success_status,
    score_raw, score_min, score_max, score_scaled, progress, total_time_seconds,
    suspend_data, location, cmi_data, exit_reason,
    started_at, last_accessed_at, completed_at
"#;

#[derive(sqlx::FromRow, Debug)]
struct AttemptRow {
    id: Uuid,
    user_id: String,
    package_id: Uuid,
    attempt_number: i32,
    status: String,
    success_status: String,
    score_raw: Option<f64>,
    score_min: Option<f64>,
    score_max: Option<f64>,
    score_scaled: Option<f64>,
    progress: Option<f64>,
    total_time_seconds: f64,
    suspend_data: String,
    location: String,
    cmi_data: Json<CmiData>,
    exit_reason: Option<String>,
    started_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for AttemptRecord {
    type Error = StoreError;

    fn try_from(r: AttemptRow) -> Result<Self, Self::Error> {
        let score = Score {
            raw: r.score_raw,
            min: r.score_min,
            max: r.score_max,
            scaled: r.score_scaled,
        };
        Ok(AttemptRecord {
            id: r.id,
            user_id: r.user_id,
            package_id: r.package_id,
            attempt_number: r.attempt_number,
            status: r.status.parse().map_err(StoreError::Corrupt)?,
            success_status: r.success_status.parse().map_err(StoreError::Corrupt)?,
            score: (!score.is_empty()).then_some(score),
            progress: r.progress,
            total_time_seconds: r.total_time_seconds,
            suspend_data: r.suspend_data,
            location: r.location,
            cmi_data: r.cmi_data.0,
            exit_reason: r
                .exit_reason
                .map(|e| e.parse())
                .transpose()
                .map_err(StoreError::Corrupt)?,
            started_at: r.started_at,
            last_accessed_at: r.last_accessed_at,
            completed_at: r.completed_at,
        })
    }
}

/// Postgres-backed attempt store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgAttemptStore {
    pool: Db,
}

impl PgAttemptStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

fn map_insert_err(id: Uuid, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            StoreError::Conflict(id)
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn insert(&self, rec: &AttemptRecord) -> Result<(), StoreError> {
        let score = rec.score.unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO scorm_attempts (
                id, user_id, package_id, attempt_number, status, success_status,
                score_raw, score_min, score_max, score_scaled, progress, total_time_seconds,
                suspend_data, location, cmi_data, exit_reason,
                started_at, last_accessed_at, completed_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            "#,
        )
        .bind(rec.id)
        .bind(&rec.user_id)
        .bind(rec.package_id)
        .bind(rec.attempt_number)
        .bind(rec.status.as_str())
        .bind(rec.success_status.as_str())
        .bind(score.raw)
        .bind(score.min)
        .bind(score.max)
        .bind(score.scaled)
        .bind(rec.progress)
        .bind(rec.total_time_seconds)
        .bind(&rec.suspend_data)
        .bind(&rec.location)
        .bind(Json(rec.cmi_data.clone()))
        .bind(rec.exit_reason.map(|e| e.as_str()))
        .bind(rec.started_at)
        .bind(rec.last_accessed_at)
        .bind(rec.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(rec.id, e))?;
        Ok(())
    }

    async fn load(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM scorm_attempts WHERE id = $1");
        let row: Option<AttemptRow> = sqlx::query_as(&sql)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttemptRecord::try_from).transpose()
    }

    async fn save(&self, attempt_id: Uuid, u: &AttemptUpdate) -> Result<(), StoreError> {
        // A present score replaces all four columns so partial scores stay partial.
        let score = u.score.unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE scorm_attempts SET
                status = COALESCE($2, status),
                success_status = COALESCE($3, success_status),
                score_raw = CASE WHEN $4 THEN $5 ELSE score_raw END,
                score_min = CASE WHEN $4 THEN $6 ELSE score_min END,
                score_max = CASE WHEN $4 THEN $7 ELSE score_max END,
                score_scaled = CASE WHEN $4 THEN $8 ELSE score_scaled END,
                progress = COALESCE($9, progress),
                total_time_seconds = COALESCE($10, total_time_seconds),
                suspend_data = COALESCE($11, suspend_data),
                location = COALESCE($12, location),
                cmi_data = COALESCE($13, cmi_data),
                exit_reason = COALESCE($14, exit_reason),
                last_accessed_at = COALESCE($15, last_accessed_at),
                completed_at = COALESCE($16, completed_at)
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(u.status.map(|s| s.as_str()))
        .bind(u.success_status.map(|s| s.as_str()))
        .bind(u.score.is_some())
        .bind(score.raw)
        .bind(score.min)
        .bind(score.max)
        .bind(score.scaled)
        .bind(u.progress)
        .bind(u.total_time_seconds)
        .bind(u.suspend_data.as_deref())
        .bind(u.location.as_deref())
        .bind(u.cmi_data.clone().map(Json))
        .bind(u.exit_reason.map(|e| e.as_str()))
        .bind(u.last_accessed_at)
        .bind(u.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(attempt_id));
        }
        Ok(())
    }

    async fn list(&self, user_id: &str, package_id: Uuid) -> Result<Vec<AttemptRecord>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM scorm_attempts \
             WHERE user_id = $1 AND package_id = $2 ORDER BY attempt_number ASC"
        );
        let rows: Vec<AttemptRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(package_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AttemptRecord::try_from).collect()
    }

    async fn max_attempt_number(&self, user_id: &str, package_id: Uuid) -> Result<i32, StoreError> {
        let max: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(attempt_number) FROM scorm_attempts WHERE user_id = $1 AND package_id = $2",
        )
        .bind(user_id)
        .bind(package_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0))
    }
}

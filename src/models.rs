use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Flat snapshot of every data-model element the content saw.
pub type CmiData = BTreeMap<String, String>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    #[default]
    NotAttempted,
    Incomplete,
    Completed,
    Passed,
    Failed,
    Browsed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::NotAttempted => "not-attempted",
            AttemptStatus::Incomplete => "incomplete",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Passed => "passed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Browsed => "browsed",
        }
    }

    /// Statuses that stamp `completed_at` when first reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Completed | AttemptStatus::Passed | AttemptStatus::Failed
        )
    }

    /// A later session may pick this attempt back up.
    pub fn is_resumable(&self) -> bool {
        matches!(self, AttemptStatus::NotAttempted | AttemptStatus::Incomplete)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-attempted" => Ok(AttemptStatus::NotAttempted),
            "incomplete" => Ok(AttemptStatus::Incomplete),
            "completed" => Ok(AttemptStatus::Completed),
            "passed" => Ok(AttemptStatus::Passed),
            "failed" => Ok(AttemptStatus::Failed),
            "browsed" => Ok(AttemptStatus::Browsed),
            other => Err(format!("unknown attempt status `{other}`")),
        }
    }
}

/// SCORM 2004 mastery axis, tracked apart from completion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
}

impl SuccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessStatus::Unknown => "unknown",
            SuccessStatus::Passed => "passed",
            SuccessStatus::Failed => "failed",
        }
    }
}

impl FromStr for SuccessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(SuccessStatus::Unknown),
            "passed" => Ok(SuccessStatus::Passed),
            "failed" => Ok(SuccessStatus::Failed),
            other => Err(format!("unknown success status `{other}`")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    TimeOut,
    Suspend,
    Logout,
    #[default]
    Normal,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TimeOut => "time-out",
            ExitReason::Suspend => "suspend",
            ExitReason::Logout => "logout",
            ExitReason::Normal => "normal",
        }
    }

    /// Maps the content's `exit` element; blank and unknown values are a normal exit.
    pub fn from_cmi(value: &str) -> Self {
        match value {
            "time-out" => ExitReason::TimeOut,
            "suspend" => ExitReason::Suspend,
            "logout" => ExitReason::Logout,
            _ => ExitReason::Normal,
        }
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time-out" => Ok(ExitReason::TimeOut),
            "suspend" => Ok(ExitReason::Suspend),
            "logout" => Ok(ExitReason::Logout),
            "normal" => Ok(ExitReason::Normal),
            other => Err(format!("unknown exit reason `{other}`")),
        }
    }
}

/// Partial scores are kept partial: a field the content never set stays `None`.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Score {
    pub raw: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub scaled: Option<f64>,
}

impl Score {
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.min.is_none() && self.max.is_none() && self.scaled.is_none()
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: Uuid,
    pub user_id: String,
    pub package_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    #[serde(default)]
    pub success_status: SuccessStatus,
    pub score: Option<Score>,
    pub progress: Option<f64>,
    #[serde(default)]
    pub total_time_seconds: f64,
    #[serde(default)]
    pub suspend_data: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub cmi_data: CmiData,
    pub exit_reason: Option<ExitReason>,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    pub fn new(user_id: impl Into<String>, package_id: Uuid, attempt_number: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            package_id,
            attempt_number,
            status: AttemptStatus::NotAttempted,
            success_status: SuccessStatus::Unknown,
            score: None,
            progress: None,
            total_time_seconds: 0.0,
            suspend_data: String::new(),
            location: String::new(),
            cmi_data: CmiData::new(),
            exit_reason: None,
            started_at: Utc::now(),
            last_accessed_at: None,
            completed_at: None,
        }
    }

    /// Folds a write-back into the record. Absent fields leave stored values alone.
    pub fn apply(&mut self, update: &AttemptUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(success) = update.success_status {
            self.success_status = success;
        }
        if let Some(score) = update.score {
            self.score = Some(score);
        }
        if let Some(progress) = update.progress {
            self.progress = Some(progress);
        }
        if let Some(total) = update.total_time_seconds {
            self.total_time_seconds = total;
        }
        if let Some(suspend) = &update.suspend_data {
            self.suspend_data = suspend.clone();
        }
        if let Some(location) = &update.location {
            self.location = location.clone();
        }
        if let Some(cmi) = &update.cmi_data {
            self.cmi_data = cmi.clone();
        }
        if let Some(exit) = update.exit_reason {
            self.exit_reason = Some(exit);
        }
        if let Some(at) = update.last_accessed_at {
            self.last_accessed_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
    }
}

/// Partial write produced by a runtime on commit/terminate.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttemptUpdate {
    pub status: Option<AttemptStatus>,
    pub success_status: Option<SuccessStatus>,
    pub score: Option<Score>,
    pub progress: Option<f64>,
    pub total_time_seconds: Option<f64>,
    pub suspend_data: Option<String>,
    pub location: Option<String>,
    pub cmi_data: Option<CmiData>,
    pub exit_reason: Option<ExitReason>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttemptReq {
    pub user_id: String,
    pub package_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttemptQuery {
    pub user_id: String,
    pub package_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScormVersion {
    #[serde(rename = "1.2")]
    Scorm12,
    #[serde(rename = "2004")]
    Scorm2004,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OpenRuntimeReq {
    pub version: ScormVersion,
    #[serde(default)]
    pub learner_name: Option<String>,
    #[serde(default)]
    pub launch_data: Option<String>,
    #[serde(default)]
    pub completion_threshold: Option<f64>,
    #[serde(default)]
    pub scaled_passing_score: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RuntimeCallReq {
    pub method: String,
    #[serde(default)]
    pub args: Vec<String>,
}

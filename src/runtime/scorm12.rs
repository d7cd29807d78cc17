//! SCORM 1.2 API (`LMSInitialize` … `LMSGetDiagnostic`).

use super::duration::{format_time_interval, parse_time_interval};
use super::{
    collection_count, format_number, number, text, AttemptWriter, Extracted, LaunchContext,
    SessionLedger, SessionState,
};
use crate::config::DEFAULT_SUSPEND_LIMIT_12;
use crate::error::RuntimeError;
use crate::models::{AttemptRecord, AttemptStatus, CmiData, ExitReason, Score};
use crate::store::AttemptStore;
use std::sync::Arc;
use uuid::Uuid;

const TRUE: &str = "true";
const FALSE: &str = "false";

pub const NO_ERROR: u16 = 0;
pub const GENERAL_EXCEPTION: u16 = 101;
pub const CONTENT_TERMINATED: u16 = 104;
pub const TERMINATION_FAILURE: u16 = 111;
pub const GET_AFTER_TERMINATION: u16 = 123;
pub const INVALID_ARGUMENT: u16 = 201;
pub const NO_CHILDREN: u16 = 202;
pub const NOT_AN_ARRAY: u16 = 203;
pub const NOT_INITIALIZED: u16 = 301;
pub const KEYWORD: u16 = 402;
pub const READ_ONLY: u16 = 403;
pub const INCORRECT_DATA_TYPE: u16 = 405;

fn error_string(code: u16) -> Option<&'static str> {
    Some(match code {
        0 => "No error",
        101 => "General exception",
        102 => "General initialization failure",
        103 => "Already initialized",
        104 => "Content instance terminated",
        111 => "General termination failure",
        123 => "Retrieve data after termination",
        201 => "Invalid argument error",
        202 => "Element cannot have children",
        203 => "Element not an array - cannot have count",
        301 => "Not initialized",
        401 => "Not implemented error",
        402 => "Invalid set value, element is a keyword",
        403 => "Element is read only",
        404 => "Element is write only",
        405 => "Incorrect data type",
        _ => return None,
    })
}

const READ_ONLY_ELEMENTS: &[&str] = &[
    "cmi.core.student_id",
    "cmi.core.student_name",
    "cmi.core.credit",
    "cmi.core.entry",
    "cmi.core.total_time",
    "cmi.core.lesson_mode",
    "cmi.launch_data",
    "cmi.comments_from_lms",
];

/// Session-scoped elements that never carry over into the next session.
const SESSION_ONLY: &[&str] = &["cmi.core.session_time", "cmi.core.exit"];

const ARRAYS: &[&str] = &["cmi.objectives", "cmi.interactions"];

fn children(element: &str) -> Option<&'static str> {
    Some(match element {
        "cmi.core" => {
            "student_id,student_name,lesson_location,credit,lesson_status,entry,score,total_time,lesson_mode,exit,session_time"
        }
        "cmi.core.score" => "raw,min,max",
        "cmi.objectives" => "id,score,status",
        "cmi.interactions" => {
            "id,objectives,time,type,correct_responses,weighting,student_response,result,latency"
        }
        _ => return None,
    })
}

fn is_keyword(element: &str) -> bool {
    element.ends_with("._children") || element.ends_with("._count")
}

/// The six `cmi.core.lesson_status` vocabulary values, mapped 1:1.
pub fn normalize_lesson_status(v: &str) -> Option<AttemptStatus> {
    match v {
        "passed" => Some(AttemptStatus::Passed),
        "failed" => Some(AttemptStatus::Failed),
        "completed" => Some(AttemptStatus::Completed),
        "incomplete" => Some(AttemptStatus::Incomplete),
        "browsed" => Some(AttemptStatus::Browsed),
        "not attempted" => Some(AttemptStatus::NotAttempted),
        _ => None,
    }
}

fn lesson_status_of(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::NotAttempted => "not attempted",
        other => other.as_str(),
    }
}

/// One SCORM 1.2 content session against a single attempt.
pub struct Scorm12Runtime {
    attempt: AttemptRecord,
    ctx: LaunchContext,
    state: SessionState,
    cmi: CmiData,
    last_error: u16,
    diagnostic: String,
    ledger: SessionLedger,
    writer: AttemptWriter,
}

impl Scorm12Runtime {
    /// Loads the attempt once and prepares a session; nothing is visible to
    /// the content until `LMSInitialize`.
    pub async fn open(
        store: Arc<dyn AttemptStore>,
        attempt_id: Uuid,
        ctx: LaunchContext,
    ) -> Result<Self, RuntimeError> {
        let attempt = store
            .load(attempt_id)
            .await?
            .ok_or(RuntimeError::MissingAttempt(attempt_id))?;
        let writer = AttemptWriter::spawn(store, attempt_id, ctx.failures.clone());
        tracing::info!(attempt_id = %attempt_id, status = %attempt.status, "scorm 1.2 session opened");

        Ok(Self {
            ledger: SessionLedger::new(attempt.total_time_seconds, attempt.status),
            attempt,
            ctx,
            state: SessionState::Uninitialized,
            cmi: CmiData::new(),
            last_error: NO_ERROR,
            diagnostic: String::new(),
            writer,
        })
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Waits until every scheduled save has reached the store.
    pub async fn flush(&self) {
        self.writer.flush().await
    }

    fn fail(&mut self, code: u16, detail: impl Into<String>) {
        self.last_error = code;
        self.diagnostic = detail.into();
    }

    fn ok(&mut self) {
        self.last_error = NO_ERROR;
        self.diagnostic.clear();
    }

    fn suspend_limit(&self) -> usize {
        self.ctx.suspend_data_limit.unwrap_or(DEFAULT_SUSPEND_LIMIT_12)
    }

    fn populate(&mut self) {
        let a = &self.attempt;
        let mut cmi = CmiData::new();
        let mut set = |k: &str, v: &str| {
            cmi.insert(k.to_string(), v.to_string());
        };
        set("cmi.core.student_id", &a.user_id);
        set("cmi.core.student_name", &self.ctx.learner_name);
        set("cmi.core.lesson_location", "");
        set("cmi.core.credit", "credit");
        set("cmi.core.lesson_status", "not attempted");
        set("cmi.core.entry", "ab-initio");
        set("cmi.core.score.raw", "");
        set("cmi.core.score.min", "0");
        set("cmi.core.score.max", "100");
        set("cmi.core.total_time", "0000:00:00.00");
        set("cmi.core.lesson_mode", "normal");
        set("cmi.core.exit", "");
        set("cmi.core.session_time", "0000:00:00.00");
        set("cmi.suspend_data", "");
        set("cmi.launch_data", &self.ctx.launch_data);
        set("cmi.comments", "");
        set("cmi.comments_from_lms", "");

        // Whatever the content wrote last time, minus session-scoped and LMS-owned keys.
        for (k, v) in &a.cmi_data {
            if SESSION_ONLY.contains(&k.as_str()) || READ_ONLY_ELEMENTS.contains(&k.as_str()) {
                continue;
            }
            cmi.insert(k.clone(), v.clone());
        }

        cmi.insert("cmi.core.lesson_location".into(), a.location.clone());
        cmi.insert("cmi.suspend_data".into(), a.suspend_data.clone());
        cmi.insert(
            "cmi.core.total_time".into(),
            format_time_interval(a.total_time_seconds),
        );
        cmi.insert(
            "cmi.core.lesson_status".into(),
            lesson_status_of(a.status).to_string(),
        );
        // The snapshot keeps the content's own spelling ("85.50"); the record
        // only fills in scores that never went through a snapshot.
        if let Some(score) = a.score {
            for (key, value) in [
                ("cmi.core.score.raw", score.raw),
                ("cmi.core.score.min", score.min),
                ("cmi.core.score.max", score.max),
            ] {
                if let Some(v) = value.filter(|_| !a.cmi_data.contains_key(key)) {
                    cmi.insert(key.into(), format_number(v));
                }
            }
        }

        let resumed = !a.suspend_data.is_empty() && a.status != AttemptStatus::NotAttempted;
        cmi.insert(
            "cmi.core.entry".into(),
            if resumed { "resume" } else { "ab-initio" }.to_string(),
        );

        self.cmi = cmi;
    }

    fn extract(cmi: &CmiData) -> Extracted {
        let lesson_status = text(cmi, "cmi.core.lesson_status");
        let status = normalize_lesson_status(lesson_status);
        if status.is_none() {
            tracing::warn!(lesson_status, "unrecognised lesson_status, keeping stored status");
        }

        let raw = number(cmi, "cmi.core.score.raw");
        let max = number(cmi, "cmi.core.score.max");
        let scaled = match (raw, max) {
            (Some(raw), Some(max)) if max > 0.0 => Some(raw / max),
            _ => None,
        };

        Extracted {
            status,
            success_status: None,
            score: Score {
                raw,
                min: number(cmi, "cmi.core.score.min"),
                max,
                scaled,
            },
            progress: None,
            session_seconds: parse_time_interval(text(cmi, "cmi.core.session_time")),
            exit: ExitReason::from_cmi(text(cmi, "cmi.core.exit")),
            location: cmi.get("cmi.core.lesson_location").cloned(),
            suspend_data: cmi.get("cmi.suspend_data").cloned(),
        }
    }

    fn save(&mut self) {
        let update = self.ledger.write_back(&self.cmi, Self::extract);
        self.writer.schedule(update);
    }

    #[allow(non_snake_case)]
    pub fn LMSInitialize(&mut self, _param: &str) -> String {
        match self.state {
            SessionState::Initialized => {
                self.fail(GENERAL_EXCEPTION, "LMSInitialize called more than once");
                FALSE.into()
            }
            SessionState::Terminated => {
                self.fail(CONTENT_TERMINATED, "LMSInitialize called after LMSFinish");
                FALSE.into()
            }
            SessionState::Uninitialized => {
                self.populate();
                self.state = SessionState::Initialized;
                self.ok();
                TRUE.into()
            }
        }
    }

    #[allow(non_snake_case)]
    pub fn LMSFinish(&mut self, _param: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(NOT_INITIALIZED, "LMSFinish called before LMSInitialize");
                FALSE.into()
            }
            SessionState::Terminated => {
                self.fail(TERMINATION_FAILURE, "LMSFinish called more than once");
                FALSE.into()
            }
            SessionState::Initialized => {
                self.save();
                self.state = SessionState::Terminated;
                self.ok();
                tracing::info!(attempt_id = %self.attempt.id, "scorm 1.2 session finished");
                TRUE.into()
            }
        }
    }

    #[allow(non_snake_case)]
    pub fn LMSGetValue(&mut self, element: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(NOT_INITIALIZED, "LMSGetValue called before LMSInitialize");
                return String::new();
            }
            SessionState::Terminated => {
                self.fail(GET_AFTER_TERMINATION, "LMSGetValue called after LMSFinish");
                return String::new();
            }
            SessionState::Initialized => {}
        }

        if let Some(parent) = element.strip_suffix("._children") {
            return match children(parent) {
                Some(list) => {
                    self.ok();
                    list.to_string()
                }
                None if self.cmi.contains_key(parent) => {
                    self.fail(NO_CHILDREN, format!("{parent} has no children"));
                    String::new()
                }
                None => {
                    self.fail(INVALID_ARGUMENT, format!("{element} is not defined"));
                    String::new()
                }
            };
        }
        if let Some(parent) = element.strip_suffix("._count") {
            if ARRAYS.contains(&parent) {
                self.ok();
                return collection_count(&self.cmi, parent).to_string();
            }
            self.fail(NOT_AN_ARRAY, format!("{parent} is not an array"));
            return String::new();
        }

        match self.cmi.get(element).cloned() {
            Some(value) => {
                self.ok();
                value
            }
            None => {
                self.fail(INVALID_ARGUMENT, format!("{element} is not defined"));
                String::new()
            }
        }
    }

    #[allow(non_snake_case)]
    pub fn LMSSetValue(&mut self, element: &str, value: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(NOT_INITIALIZED, "LMSSetValue called before LMSInitialize");
                return FALSE.into();
            }
            SessionState::Terminated => {
                self.fail(GET_AFTER_TERMINATION, "LMSSetValue called after LMSFinish");
                return FALSE.into();
            }
            SessionState::Initialized => {}
        }

        if element.is_empty() {
            self.fail(INVALID_ARGUMENT, "empty element name");
            return FALSE.into();
        }
        if is_keyword(element) {
            self.fail(KEYWORD, format!("{element} is a keyword"));
            return FALSE.into();
        }
        if READ_ONLY_ELEMENTS.contains(&element) {
            self.fail(READ_ONLY, format!("{element} is read only"));
            return FALSE.into();
        }
        if element == "cmi.suspend_data" && value.chars().count() > self.suspend_limit() {
            self.fail(
                INCORRECT_DATA_TYPE,
                format!("cmi.suspend_data exceeds {} characters", self.suspend_limit()),
            );
            return FALSE.into();
        }

        self.cmi.insert(element.to_string(), value.to_string());
        self.ok();
        TRUE.into()
    }

    #[allow(non_snake_case)]
    pub fn LMSCommit(&mut self, _param: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(NOT_INITIALIZED, "LMSCommit called before LMSInitialize");
                FALSE.into()
            }
            SessionState::Terminated => {
                self.fail(CONTENT_TERMINATED, "LMSCommit called after LMSFinish");
                FALSE.into()
            }
            SessionState::Initialized => {
                self.save();
                self.ok();
                TRUE.into()
            }
        }
    }

    #[allow(non_snake_case)]
    pub fn LMSGetLastError(&self) -> String {
        self.last_error.to_string()
    }

    #[allow(non_snake_case)]
    pub fn LMSGetErrorString(&self, code: &str) -> String {
        code.trim()
            .parse::<u16>()
            .ok()
            .and_then(error_string)
            .unwrap_or("Unknown error")
            .to_string()
    }

    /// Detail for the last error when `code` is blank or matches it, else the error string.
    #[allow(non_snake_case)]
    pub fn LMSGetDiagnostic(&self, code: &str) -> String {
        let code = code.trim();
        let wanted = if code.is_empty() {
            Some(self.last_error)
        } else {
            code.parse::<u16>().ok()
        };
        match wanted {
            Some(c) if c == self.last_error && !self.diagnostic.is_empty() => self.diagnostic.clone(),
            Some(c) => error_string(c).unwrap_or("Unknown error").to_string(),
            None => "Unknown error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAttemptStore;

    async fn fresh() -> (Arc<MemoryAttemptStore>, Scorm12Runtime) {
        let store = Arc::new(MemoryAttemptStore::new());
        let rec = AttemptRecord::new("learner-1", Uuid::new_v4(), 1);
        store.insert(&rec).await.unwrap();
        let rt = Scorm12Runtime::open(store.clone(), rec.id, LaunchContext::default())
            .await
            .unwrap();
        (store, rt)
    }

    #[tokio::test]
    async fn double_initialize_is_101() {
        let (_, mut rt) = fresh().await;
        assert_eq!(rt.LMSInitialize(""), "true");
        assert_eq!(rt.LMSInitialize(""), "false");
        assert_eq!(rt.LMSGetLastError(), "101");
    }

    #[tokio::test]
    async fn initialize_after_finish_is_104() {
        let (_, mut rt) = fresh().await;
        rt.LMSInitialize("");
        assert_eq!(rt.LMSFinish(""), "true");
        assert_eq!(rt.LMSInitialize(""), "false");
        assert_eq!(rt.LMSGetLastError(), "104");
        assert_eq!(rt.LMSFinish(""), "false");
        assert_eq!(rt.LMSGetLastError(), "111");
    }

    #[tokio::test]
    async fn guards_before_and_after_session() {
        let (_, mut rt) = fresh().await;
        assert_eq!(rt.LMSGetValue("cmi.core.lesson_status"), "");
        assert_eq!(rt.LMSGetLastError(), "301");
        assert_eq!(rt.LMSSetValue("cmi.core.lesson_location", "x"), "false");
        assert_eq!(rt.LMSGetLastError(), "301");
        assert_eq!(rt.LMSCommit(""), "false");
        assert_eq!(rt.LMSFinish(""), "false");
        assert_eq!(rt.LMSGetLastError(), "301");

        rt.LMSInitialize("");
        rt.LMSFinish("");
        assert_eq!(rt.LMSGetValue("cmi.core.lesson_status"), "");
        assert_eq!(rt.LMSGetLastError(), "123");
        assert_eq!(rt.LMSSetValue("cmi.core.lesson_location", "x"), "false");
        assert_eq!(rt.LMSGetLastError(), "123");
    }

    #[tokio::test]
    async fn defaults_after_initialize() {
        let (_, mut rt) = fresh().await;
        rt.LMSInitialize("");
        assert_eq!(rt.LMSGetValue("cmi.core.lesson_status"), "not attempted");
        assert_eq!(rt.LMSGetValue("cmi.core.entry"), "ab-initio");
        assert_eq!(rt.LMSGetValue("cmi.core.score.min"), "0");
        assert_eq!(rt.LMSGetValue("cmi.core.score.max"), "100");
        assert_eq!(rt.LMSGetValue("cmi.core.student_id"), "learner-1");
        assert_eq!(rt.LMSGetLastError(), "0");
    }

    #[tokio::test]
    async fn read_only_and_unknown_elements() {
        let (_, mut rt) = fresh().await;
        rt.LMSInitialize("");
        assert_eq!(rt.LMSSetValue("cmi.core.student_id", "someone-else"), "false");
        assert_eq!(rt.LMSGetLastError(), "403");
        assert_eq!(rt.LMSGetValue("cmi.core.student_id"), "learner-1");

        assert_eq!(rt.LMSGetValue("cmi.core.nope"), "");
        assert_eq!(rt.LMSGetLastError(), "201");
        assert!(rt.LMSGetDiagnostic("").contains("cmi.core.nope"));
    }

    #[tokio::test]
    async fn keywords() {
        let (_, mut rt) = fresh().await;
        rt.LMSInitialize("");
        assert_eq!(rt.LMSGetValue("cmi.core.score._children"), "raw,min,max");
        assert_eq!(rt.LMSGetValue("cmi.core.lesson_status._children"), "");
        assert_eq!(rt.LMSGetLastError(), "202");
        assert_eq!(rt.LMSGetValue("cmi.core._count"), "");
        assert_eq!(rt.LMSGetLastError(), "203");

        rt.LMSSetValue("cmi.interactions.0.id", "q1");
        rt.LMSSetValue("cmi.interactions.1.id", "q2");
        assert_eq!(rt.LMSGetValue("cmi.interactions._count"), "2");
        assert_eq!(rt.LMSSetValue("cmi.interactions._count", "5"), "false");
        assert_eq!(rt.LMSGetLastError(), "402");
    }

    #[tokio::test]
    async fn error_strings() {
        let (_, rt) = fresh().await;
        assert_eq!(rt.LMSGetErrorString("403"), "Element is read only");
        assert_eq!(rt.LMSGetErrorString("0"), "No error");
        assert_eq!(rt.LMSGetErrorString("999"), "Unknown error");
        assert_eq!(rt.LMSGetErrorString("abc"), "Unknown error");
        assert_eq!(rt.LMSGetDiagnostic("999"), "Unknown error");
        assert_eq!(rt.LMSGetDiagnostic("301"), "Not initialized");
    }

    #[tokio::test]
    async fn oversized_suspend_data_rejected() {
        let store = Arc::new(MemoryAttemptStore::new());
        let rec = AttemptRecord::new("learner-1", Uuid::new_v4(), 1);
        store.insert(&rec).await.unwrap();
        let ctx = LaunchContext {
            suspend_data_limit: Some(4),
            ..Default::default()
        };
        let mut rt = Scorm12Runtime::open(store, rec.id, ctx).await.unwrap();
        rt.LMSInitialize("");
        assert_eq!(rt.LMSSetValue("cmi.suspend_data", "abcd"), "true");
        assert_eq!(rt.LMSSetValue("cmi.suspend_data", "abcde"), "false");
        assert_eq!(rt.LMSGetLastError(), "405");
        assert_eq!(rt.LMSGetValue("cmi.suspend_data"), "abcd");
    }

    #[tokio::test]
    async fn scaled_score_derived_from_raw_and_max() {
        let (store, mut rt) = fresh().await;
        rt.LMSInitialize("");
        rt.LMSSetValue("cmi.core.score.raw", "40");
        rt.LMSSetValue("cmi.core.score.max", "50");
        rt.LMSCommit("");
        rt.flush().await;

        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        let score = rec.score.unwrap();
        assert_eq!(score.raw, Some(40.0));
        assert_eq!(score.scaled, Some(0.8));
    }

    #[tokio::test]
    async fn unknown_lesson_status_keeps_stored_status() {
        let (store, mut rt) = fresh().await;
        rt.LMSInitialize("");
        rt.LMSSetValue("cmi.core.lesson_status", "done-ish");
        rt.LMSCommit("");
        rt.flush().await;
        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        assert_eq!(rec.status, AttemptStatus::NotAttempted);
        assert_eq!(
            rec.cmi_data.get("cmi.core.lesson_status").map(String::as_str),
            Some("done-ish")
        );
    }
}

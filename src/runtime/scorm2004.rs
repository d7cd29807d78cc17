//! SCORM 2004 API (`Initialize` … `GetDiagnostic`).
//!
//! Completion and success are independent axes here; the attempt status is
//! derived from both on every save, success taking precedence.

use super::duration::{iso8601_to_seconds, seconds_to_iso8601, try_iso8601_to_seconds};
use super::{
    collection_count, format_number, number, text, AttemptWriter, Extracted, LaunchContext,
    SessionLedger, SessionState,
};
use crate::config::DEFAULT_SUSPEND_LIMIT_2004;
use crate::error::RuntimeError;
use crate::models::{AttemptRecord, AttemptStatus, CmiData, ExitReason, Score, SuccessStatus};
use crate::store::AttemptStore;
use std::sync::Arc;
use uuid::Uuid;

const TRUE: &str = "true";
const FALSE: &str = "false";

pub const NO_ERROR: u16 = 0;
pub const ALREADY_INITIALIZED: u16 = 103;
pub const CONTENT_TERMINATED: u16 = 104;
pub const TERMINATE_BEFORE_INIT: u16 = 112;
pub const TERMINATE_AFTER_TERMINATE: u16 = 113;
pub const GET_BEFORE_INIT: u16 = 122;
pub const GET_AFTER_TERMINATE: u16 = 123;
pub const SET_BEFORE_INIT: u16 = 132;
pub const SET_AFTER_TERMINATE: u16 = 133;
pub const COMMIT_BEFORE_INIT: u16 = 142;
pub const COMMIT_AFTER_TERMINATE: u16 = 143;
pub const GENERAL_ARGUMENT: u16 = 201;
pub const GENERAL_GET_FAILURE: u16 = 301;
pub const GENERAL_SET_FAILURE: u16 = 351;
pub const UNDEFINED_ELEMENT: u16 = 401;
pub const NOT_INITIALIZED_VALUE: u16 = 403;
pub const READ_ONLY: u16 = 404;
pub const TYPE_MISMATCH: u16 = 406;
pub const OUT_OF_RANGE: u16 = 407;

fn error_string(code: u16) -> Option<&'static str> {
    Some(match code {
        0 => "No Error",
        101 => "General Exception",
        102 => "General Initialization Failure",
        103 => "Already Initialized",
        104 => "Content Instance Terminated",
        111 => "General Termination Failure",
        112 => "Termination Before Initialization",
        113 => "Termination After Termination",
        122 => "Retrieve Data Before Initialization",
        123 => "Retrieve Data After Termination",
        132 => "Store Data Before Initialization",
        133 => "Store Data After Termination",
        142 => "Commit Before Initialization",
        143 => "Commit After Termination",
        201 => "General Argument Error",
        301 => "General Get Failure",
        351 => "General Set Failure",
        391 => "General Commit Failure",
        401 => "Undefined Data Model Element",
        402 => "Unimplemented Data Model Element",
        403 => "Data Model Element Value Not Initialized",
        404 => "Data Model Element Is Read Only",
        405 => "Data Model Element Is Write Only",
        406 => "Data Model Element Type Mismatch",
        407 => "Data Model Element Value Out Of Range",
        408 => "Data Model Dependency Not Established",
        _ => return None,
    })
}

const READ_ONLY_ELEMENTS: &[&str] = &[
    "cmi.learner_id",
    "cmi.learner_name",
    "cmi.credit",
    "cmi.entry",
    "cmi.total_time",
    "cmi.mode",
    "cmi.launch_data",
    "cmi.comments_from_lms",
    "cmi.completion_threshold",
    "cmi.scaled_passing_score",
];

/// Scalar elements that always carry a value once the session is initialized.
const DEFINED_SCALARS: &[&str] = &[
    "cmi.learner_id",
    "cmi.learner_name",
    "cmi.location",
    "cmi.credit",
    "cmi.completion_status",
    "cmi.success_status",
    "cmi.entry",
    "cmi.mode",
    "cmi.total_time",
    "cmi.exit",
    "cmi.session_time",
    "cmi.suspend_data",
    "cmi.launch_data",
];

/// Elements the data model defines but that start out with no value.
const DEFINED_UNSET: &[&str] = &[
    "cmi.learner_preference.audio_level",
    "cmi.learner_preference.language",
    "cmi.learner_preference.delivery_speed",
    "cmi.learner_preference.audio_captioning",
    "cmi.score.scaled",
    "cmi.score.raw",
    "cmi.score.min",
    "cmi.score.max",
    "cmi.progress_measure",
    "cmi.completion_threshold",
    "cmi.scaled_passing_score",
    "cmi.max_time_allowed",
    "cmi.time_limit_action",
];

const COLLECTIONS: &[&str] = &[
    "cmi.objectives",
    "cmi.interactions",
    "cmi.comments_from_learner",
    "cmi.comments_from_lms",
];

const SESSION_ONLY: &[&str] = &["cmi.session_time", "cmi.exit"];

fn children(element: &str) -> Option<&'static str> {
    Some(match element {
        "cmi.score" => "scaled,raw,min,max",
        "cmi.objectives" => {
            "id,score,success_status,completion_status,progress_measure,description"
        }
        "cmi.interactions" => {
            "id,type,objectives,timestamp,correct_responses,weighting,learner_response,result,latency,description"
        }
        "cmi.comments_from_learner" | "cmi.comments_from_lms" => "comment,location,timestamp",
        _ => return None,
    })
}

fn is_read_only(element: &str) -> bool {
    READ_ONLY_ELEMENTS.contains(&element) || element.starts_with("cmi.comments_from_lms.")
}

fn is_keyword(element: &str) -> bool {
    element.ends_with("._children") || element.ends_with("._count") || element.ends_with("._version")
}

fn in_collection(element: &str) -> bool {
    COLLECTIONS
        .iter()
        .any(|c| element.strip_prefix(*c).is_some_and(|rest| rest.starts_with('.')))
}

fn is_defined(element: &str) -> bool {
    DEFINED_SCALARS.contains(&element) || DEFINED_UNSET.contains(&element) || in_collection(element)
}

fn check_vocab(element: &str, value: &str, allowed: &[&str]) -> Result<(), (u16, String)> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err((TYPE_MISMATCH, format!("`{value}` is not a valid {element} value")))
    }
}

fn check_real(element: &str, value: &str, range: Option<(f64, f64)>) -> Result<(), (u16, String)> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => match range {
            Some((lo, hi)) if v < lo || v > hi => Err((
                OUT_OF_RANGE,
                format!("{element} must be between {lo} and {hi}"),
            )),
            _ => Ok(()),
        },
        _ => Err((TYPE_MISMATCH, format!("{element} must be a real number"))),
    }
}

/// Status derived from the two 2004 axes; success wins over completion.
pub fn derive_status(completion: &str, success: SuccessStatus) -> AttemptStatus {
    match success {
        SuccessStatus::Passed => AttemptStatus::Passed,
        SuccessStatus::Failed => AttemptStatus::Failed,
        SuccessStatus::Unknown => match completion {
            "completed" => AttemptStatus::Completed,
            "incomplete" => AttemptStatus::Incomplete,
            _ => AttemptStatus::NotAttempted,
        },
    }
}

/// One SCORM 2004 content session against a single attempt.
pub struct Scorm2004Runtime {
    attempt: AttemptRecord,
    ctx: LaunchContext,
    state: SessionState,
    cmi: CmiData,
    last_error: u16,
    diagnostic: String,
    ledger: SessionLedger,
    writer: AttemptWriter,
}

impl Scorm2004Runtime {
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
        tracing::info!(attempt_id = %attempt_id, status = %attempt.status, "scorm 2004 session opened");

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
        self.ctx.suspend_data_limit.unwrap_or(DEFAULT_SUSPEND_LIMIT_2004)
    }

    fn populate(&mut self) {
        let a = &self.attempt;
        let mut cmi = CmiData::new();
        let mut set = |k: &str, v: String| {
            cmi.insert(k.to_string(), v);
        };
        set("cmi.learner_id", a.user_id.clone());
        set("cmi.learner_name", self.ctx.learner_name.clone());
        set("cmi.location", String::new());
        set("cmi.credit", "credit".into());
        set("cmi.completion_status", "unknown".into());
        set("cmi.success_status", "unknown".into());
        set("cmi.entry", "ab-initio".into());
        set("cmi.mode", "normal".into());
        set("cmi.total_time", "PT0S".into());
        set("cmi.exit", String::new());
        set("cmi.session_time", "PT0S".into());
        set("cmi.suspend_data", String::new());
        set("cmi.launch_data", self.ctx.launch_data.clone());
        if let Some(threshold) = self.ctx.completion_threshold {
            set("cmi.completion_threshold", format_number(threshold));
        }
        if let Some(passing) = self.ctx.scaled_passing_score {
            set("cmi.scaled_passing_score", format_number(passing));
        }

        for (k, v) in &a.cmi_data {
            if SESSION_ONLY.contains(&k.as_str()) || is_read_only(k) {
                continue;
            }
            cmi.insert(k.clone(), v.clone());
        }

        cmi.insert("cmi.location".into(), a.location.clone());
        cmi.insert("cmi.suspend_data".into(), a.suspend_data.clone());
        cmi.insert("cmi.total_time".into(), seconds_to_iso8601(a.total_time_seconds));
        if a.success_status != SuccessStatus::Unknown {
            cmi.insert("cmi.success_status".into(), a.success_status.as_str().into());
        }
        match a.status {
            AttemptStatus::Completed => {
                cmi.insert("cmi.completion_status".into(), "completed".into());
            }
            AttemptStatus::Incomplete => {
                cmi.insert("cmi.completion_status".into(), "incomplete".into());
            }
            _ => {}
        }
        if let Some(score) = a.score {
            for (key, value) in [
                ("cmi.score.raw", score.raw),
                ("cmi.score.min", score.min),
                ("cmi.score.max", score.max),
                ("cmi.score.scaled", score.scaled),
            ] {
                if let Some(v) = value.filter(|_| !a.cmi_data.contains_key(key)) {
                    cmi.insert(key.into(), format_number(v));
                }
            }
        }
        if let Some(progress) = a.progress.filter(|_| !a.cmi_data.contains_key("cmi.progress_measure")) {
            cmi.insert("cmi.progress_measure".into(), format_number(progress / 100.0));
        }

        let resumed = !a.suspend_data.is_empty() && a.status != AttemptStatus::NotAttempted;
        cmi.insert(
            "cmi.entry".into(),
            if resumed { "resume" } else { "ab-initio" }.to_string(),
        );

        self.cmi = cmi;
    }

    fn extract(cmi: &CmiData) -> Extracted {
        let progress_measure = number(cmi, "cmi.progress_measure");
        let scaled = number(cmi, "cmi.score.scaled");

        // An LMS-provided threshold or passing score overrides the content's own verdict.
        let completion = match (number(cmi, "cmi.completion_threshold"), progress_measure) {
            (Some(threshold), Some(measure)) if measure >= threshold => "completed",
            (Some(_), Some(_)) => "incomplete",
            _ => text(cmi, "cmi.completion_status"),
        };
        let success = match (number(cmi, "cmi.scaled_passing_score"), scaled) {
            (Some(passing), Some(scaled)) if scaled >= passing => SuccessStatus::Passed,
            (Some(_), Some(_)) => SuccessStatus::Failed,
            _ => text(cmi, "cmi.success_status")
                .parse::<SuccessStatus>()
                .unwrap_or_default(),
        };

        Extracted {
            status: Some(derive_status(completion, success)),
            success_status: Some(success),
            score: Score {
                raw: number(cmi, "cmi.score.raw"),
                min: number(cmi, "cmi.score.min"),
                max: number(cmi, "cmi.score.max"),
                scaled,
            },
            progress: progress_measure.map(|m| m * 100.0),
            session_seconds: iso8601_to_seconds(text(cmi, "cmi.session_time")),
            exit: ExitReason::from_cmi(text(cmi, "cmi.exit")),
            location: cmi.get("cmi.location").cloned(),
            suspend_data: cmi.get("cmi.suspend_data").cloned(),
        }
    }

    fn save(&mut self) {
        let update = self.ledger.write_back(&self.cmi, Self::extract);
        self.writer.schedule(update);
    }

    /// Vocabulary, type and range checks for the elements the LMS interprets.
    fn validate(&self, element: &str, value: &str) -> Result<(), (u16, String)> {
        match element {
            "cmi.completion_status" => {
                check_vocab(element, value, &["completed", "incomplete", "not attempted", "unknown"])
            }
            "cmi.success_status" => check_vocab(element, value, &["passed", "failed", "unknown"]),
            "cmi.exit" => check_vocab(element, value, &["time-out", "suspend", "logout", "normal", ""]),
            "cmi.score.scaled" => check_real(element, value, Some((-1.0, 1.0))),
            "cmi.score.raw" | "cmi.score.min" | "cmi.score.max" => check_real(element, value, None),
            "cmi.progress_measure" => check_real(element, value, Some((0.0, 1.0))),
            "cmi.session_time" => match try_iso8601_to_seconds(value) {
                Some(_) => Ok(()),
                None => Err((TYPE_MISMATCH, format!("`{value}` is not an ISO 8601 duration"))),
            },
            "cmi.suspend_data" if value.chars().count() > self.suspend_limit() => Err((
                OUT_OF_RANGE,
                format!("cmi.suspend_data exceeds {} characters", self.suspend_limit()),
            )),
            _ => Ok(()),
        }
    }

    #[allow(non_snake_case)]
    pub fn Initialize(&mut self, param: &str) -> String {
        match self.state {
            SessionState::Initialized => {
                self.fail(ALREADY_INITIALIZED, "Initialize called more than once");
                FALSE.into()
            }
            SessionState::Terminated => {
                self.fail(CONTENT_TERMINATED, "Initialize called after Terminate");
                FALSE.into()
            }
            SessionState::Uninitialized if !param.is_empty() => {
                self.fail(GENERAL_ARGUMENT, "Initialize expects an empty string");
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
    pub fn Terminate(&mut self, param: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(TERMINATE_BEFORE_INIT, "Terminate called before Initialize");
                FALSE.into()
            }
            SessionState::Terminated => {
                self.fail(TERMINATE_AFTER_TERMINATE, "Terminate called more than once");
                FALSE.into()
            }
            SessionState::Initialized if !param.is_empty() => {
                self.fail(GENERAL_ARGUMENT, "Terminate expects an empty string");
                FALSE.into()
            }
            SessionState::Initialized => {
                self.save();
                self.state = SessionState::Terminated;
                self.ok();
                tracing::info!(attempt_id = %self.attempt.id, "scorm 2004 session terminated");
                TRUE.into()
            }
        }
    }

    #[allow(non_snake_case)]
    pub fn GetValue(&mut self, element: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(GET_BEFORE_INIT, "GetValue called before Initialize");
                return String::new();
            }
            SessionState::Terminated => {
                self.fail(GET_AFTER_TERMINATE, "GetValue called after Terminate");
                return String::new();
            }
            SessionState::Initialized => {}
        }

        if element.is_empty() {
            self.fail(GENERAL_GET_FAILURE, "empty element name");
            return String::new();
        }
        if element == "cmi._version" {
            self.ok();
            return "1.0".into();
        }
        if let Some(parent) = element.strip_suffix("._children") {
            if let Some(list) = children(parent) {
                self.ok();
                return list.to_string();
            }
            self.fail(GENERAL_GET_FAILURE, format!("{parent} has no children"));
            return String::new();
        }
        if let Some(parent) = element.strip_suffix("._count") {
            if COLLECTIONS.contains(&parent) {
                self.ok();
                return collection_count(&self.cmi, parent).to_string();
            }
            self.fail(GENERAL_GET_FAILURE, format!("{parent} is not a collection"));
            return String::new();
        }

        if let Some(value) = self.cmi.get(element).cloned() {
            self.ok();
            return value;
        }
        if is_defined(element) {
            self.fail(NOT_INITIALIZED_VALUE, format!("{element} has not been set"));
        } else {
            self.fail(UNDEFINED_ELEMENT, format!("{element} is not defined"));
        }
        String::new()
    }

    #[allow(non_snake_case)]
    pub fn SetValue(&mut self, element: &str, value: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(SET_BEFORE_INIT, "SetValue called before Initialize");
                return FALSE.into();
            }
            SessionState::Terminated => {
                self.fail(SET_AFTER_TERMINATE, "SetValue called after Terminate");
                return FALSE.into();
            }
            SessionState::Initialized => {}
        }

        if element.is_empty() {
            self.fail(GENERAL_SET_FAILURE, "empty element name");
            return FALSE.into();
        }
        if is_keyword(element) || is_read_only(element) {
            self.fail(READ_ONLY, format!("{element} is read only"));
            return FALSE.into();
        }
        if !is_defined(element) {
            self.fail(UNDEFINED_ELEMENT, format!("{element} is not defined"));
            return FALSE.into();
        }
        if let Err((code, detail)) = self.validate(element, value) {
            self.fail(code, detail);
            return FALSE.into();
        }

        self.cmi.insert(element.to_string(), value.to_string());
        self.ok();
        TRUE.into()
    }

    #[allow(non_snake_case)]
    pub fn Commit(&mut self, param: &str) -> String {
        match self.state {
            SessionState::Uninitialized => {
                self.fail(COMMIT_BEFORE_INIT, "Commit called before Initialize");
                FALSE.into()
            }
            SessionState::Terminated => {
                self.fail(COMMIT_AFTER_TERMINATE, "Commit called after Terminate");
                FALSE.into()
            }
            SessionState::Initialized if !param.is_empty() => {
                self.fail(GENERAL_ARGUMENT, "Commit expects an empty string");
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
    pub fn GetLastError(&self) -> String {
        self.last_error.to_string()
    }

    #[allow(non_snake_case)]
    pub fn GetErrorString(&self, code: &str) -> String {
        code.trim()
            .parse::<u16>()
            .ok()
            .and_then(error_string)
            .unwrap_or("Unknown error")
            .to_string()
    }

    #[allow(non_snake_case)]
    pub fn GetDiagnostic(&self, code: &str) -> String {
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

    async fn open_with(ctx: LaunchContext) -> (Arc<MemoryAttemptStore>, Scorm2004Runtime) {
        let store = Arc::new(MemoryAttemptStore::new());
        let rec = AttemptRecord::new("learner-9", Uuid::new_v4(), 1);
        store.insert(&rec).await.unwrap();
        let rt = Scorm2004Runtime::open(store.clone(), rec.id, ctx).await.unwrap();
        (store, rt)
    }

    async fn fresh() -> (Arc<MemoryAttemptStore>, Scorm2004Runtime) {
        open_with(LaunchContext::default()).await
    }

    #[test]
    fn success_takes_precedence() {
        assert_eq!(derive_status("completed", SuccessStatus::Failed), AttemptStatus::Failed);
        assert_eq!(derive_status("incomplete", SuccessStatus::Passed), AttemptStatus::Passed);
        assert_eq!(derive_status("completed", SuccessStatus::Unknown), AttemptStatus::Completed);
        assert_eq!(derive_status("incomplete", SuccessStatus::Unknown), AttemptStatus::Incomplete);
        assert_eq!(derive_status("unknown", SuccessStatus::Unknown), AttemptStatus::NotAttempted);
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let (_, mut rt) = fresh().await;
        assert_eq!(rt.GetValue("cmi.location"), "");
        assert_eq!(rt.GetLastError(), "122");
        assert_eq!(rt.SetValue("cmi.location", "p1"), "false");
        assert_eq!(rt.GetLastError(), "132");
        assert_eq!(rt.Commit(""), "false");
        assert_eq!(rt.GetLastError(), "142");
        assert_eq!(rt.Terminate(""), "false");
        assert_eq!(rt.GetLastError(), "112");

        assert_eq!(rt.Initialize(""), "true");
        assert_eq!(rt.Initialize(""), "false");
        assert_eq!(rt.GetLastError(), "103");

        assert_eq!(rt.Terminate(""), "true");
        assert_eq!(rt.Terminate(""), "false");
        assert_eq!(rt.GetLastError(), "113");
        assert_eq!(rt.Initialize(""), "false");
        assert_eq!(rt.GetLastError(), "104");
        assert_eq!(rt.GetValue("cmi.location"), "");
        assert_eq!(rt.GetLastError(), "123");
        assert_eq!(rt.SetValue("cmi.location", "p1"), "false");
        assert_eq!(rt.GetLastError(), "133");
        assert_eq!(rt.Commit(""), "false");
        assert_eq!(rt.GetLastError(), "143");
    }

    #[tokio::test]
    async fn non_empty_parameter_is_argument_error() {
        let (_, mut rt) = fresh().await;
        assert_eq!(rt.Initialize("x"), "false");
        assert_eq!(rt.GetLastError(), "201");
        assert_eq!(rt.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn read_only_elements_are_404() {
        let ctx = LaunchContext {
            completion_threshold: Some(0.8),
            ..Default::default()
        };
        let (_, mut rt) = open_with(ctx).await;
        rt.Initialize("");
        for el in ["cmi.learner_id", "cmi.completion_threshold", "cmi.scaled_passing_score", "cmi._version"] {
            assert_eq!(rt.SetValue(el, "x"), "false", "{el}");
            assert_eq!(rt.GetLastError(), "404", "{el}");
        }
        assert_eq!(rt.GetValue("cmi.learner_id"), "learner-9");
        assert_eq!(rt.GetValue("cmi.completion_threshold"), "0.8");
    }

    #[tokio::test]
    async fn unset_and_undefined_elements() {
        let (_, mut rt) = fresh().await;
        rt.Initialize("");
        assert_eq!(rt.GetValue("cmi.score.raw"), "");
        assert_eq!(rt.GetLastError(), "403");
        assert_eq!(rt.GetValue("cmi.interactions.0.id"), "");
        assert_eq!(rt.GetLastError(), "403");
        assert_eq!(rt.GetValue("cmi.bogus"), "");
        assert_eq!(rt.GetLastError(), "401");
        assert_eq!(rt.GetValue("cmi._version"), "1.0");
        assert_eq!(rt.GetValue("cmi.score._children"), "scaled,raw,min,max");
        assert_eq!(rt.GetValue("cmi.interactions._count"), "0");
    }

    #[tokio::test]
    async fn undefined_elements_cannot_be_set() {
        let (store, mut rt) = fresh().await;
        rt.Initialize("");
        assert_eq!(rt.SetValue("cmi.bogus", "x"), "false");
        assert_eq!(rt.GetLastError(), "401");
        assert!(rt.GetDiagnostic("").contains("cmi.bogus"));
        assert_eq!(rt.GetValue("cmi.bogus"), "");
        assert_eq!(rt.GetLastError(), "401");

        assert_eq!(rt.SetValue("cmi.interactions.0.id", "q1"), "true");
        assert_eq!(rt.SetValue("cmi.learner_preference.language", "en"), "true");
        rt.Commit("");
        rt.flush().await;
        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        assert!(!rec.cmi_data.contains_key("cmi.bogus"));
        assert_eq!(
            rec.cmi_data.get("cmi.interactions.0.id").map(String::as_str),
            Some("q1")
        );
    }

    #[tokio::test]
    async fn resume_keeps_numbers_as_written() {
        let (store, mut rt) = fresh().await;
        let id = rt.attempt_id();
        rt.Initialize("");
        rt.SetValue("cmi.score.raw", "85.50");
        rt.SetValue("cmi.progress_measure", "0.50");
        rt.SetValue("cmi.completion_status", "incomplete");
        rt.SetValue("cmi.suspend_data", "p=2");
        rt.Terminate("");
        rt.flush().await;

        let mut rt = Scorm2004Runtime::open(store, id, LaunchContext::default())
            .await
            .unwrap();
        rt.Initialize("");
        assert_eq!(rt.GetValue("cmi.score.raw"), "85.50");
        assert_eq!(rt.GetValue("cmi.progress_measure"), "0.50");
    }

    #[tokio::test]
    async fn oversized_session_time_is_rejected() {
        let (store, mut rt) = fresh().await;
        rt.Initialize("");
        let huge = format!("PT{}S", "9".repeat(400));
        assert_eq!(rt.SetValue("cmi.session_time", &huge), "false");
        assert_eq!(rt.GetLastError(), "406");
        rt.SetValue("cmi.session_time", "PT10S");
        assert_eq!(rt.Commit(""), "true");
        rt.flush().await;
        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        assert_eq!(rec.total_time_seconds, 10.0);
    }

    #[tokio::test]
    async fn value_validation() {
        let (_, mut rt) = fresh().await;
        rt.Initialize("");
        assert_eq!(rt.SetValue("cmi.completion_status", "done"), "false");
        assert_eq!(rt.GetLastError(), "406");
        assert_eq!(rt.SetValue("cmi.score.scaled", "1.5"), "false");
        assert_eq!(rt.GetLastError(), "407");
        assert_eq!(rt.SetValue("cmi.score.raw", "eighty"), "false");
        assert_eq!(rt.GetLastError(), "406");
        assert_eq!(rt.SetValue("cmi.progress_measure", "-0.1"), "false");
        assert_eq!(rt.GetLastError(), "407");
        assert_eq!(rt.SetValue("cmi.session_time", "5 minutes"), "false");
        assert_eq!(rt.GetLastError(), "406");
        assert_eq!(rt.SetValue("cmi.session_time", "PT5M"), "true");
        assert_eq!(rt.GetLastError(), "0");
    }

    #[tokio::test]
    async fn progress_measure_becomes_percentage() {
        let (store, mut rt) = fresh().await;
        rt.Initialize("");
        rt.SetValue("cmi.progress_measure", "0.5");
        rt.SetValue("cmi.score.scaled", "0.9");
        rt.Commit("");
        rt.flush().await;

        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        assert_eq!(rec.progress, Some(50.0));
        assert_eq!(rec.score.unwrap().scaled, Some(0.9));
        assert_eq!(rec.score.unwrap().raw, None);
    }

    #[tokio::test]
    async fn absent_progress_measure_leaves_progress_unset() {
        let (store, mut rt) = fresh().await;
        rt.Initialize("");
        rt.Commit("");
        rt.flush().await;
        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        assert_eq!(rec.progress, None);
        assert!(rec.score.is_none());
    }

    #[tokio::test]
    async fn passing_score_decides_success() {
        let ctx = LaunchContext {
            scaled_passing_score: Some(0.7),
            ..Default::default()
        };
        let (store, mut rt) = open_with(ctx).await;
        rt.Initialize("");
        rt.SetValue("cmi.success_status", "failed");
        rt.SetValue("cmi.score.scaled", "0.75");
        rt.Terminate("");
        rt.flush().await;
        let rec = store.load(rt.attempt_id()).await.unwrap().unwrap();
        assert_eq!(rec.status, AttemptStatus::Passed);
        assert_eq!(rec.success_status, SuccessStatus::Passed);
        assert!(rec.completed_at.is_some());
    }
}

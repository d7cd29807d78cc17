//! SCORM run-time environment.
//!
//! [`Scorm12Runtime`] and [`Scorm2004Runtime`] are separate
//! types: their method names, error tables and data models differ. They
//! share the duration codecs, the write-back routine in [`SessionLedger`]
//! and the background [`AttemptWriter`] that persists commits without
//! blocking the synchronous protocol call.

pub mod duration;
mod scorm12;
mod scorm2004;
mod writer;

pub use scorm12::Scorm12Runtime;
pub use scorm2004::Scorm2004Runtime;
pub use writer::{FailureSender, SaveFailure};

pub(crate) use writer::AttemptWriter;

use crate::models::{AttemptStatus, AttemptUpdate, CmiData, ExitReason, Score, SuccessStatus};
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Terminated,
}

/// Host-supplied launch values that the content may read but never write.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub learner_name: String,
    pub launch_data: String,
    pub completion_threshold: Option<f64>,
    pub scaled_passing_score: Option<f64>,
    /// Overrides the per-version suspend data ceiling.
    pub suspend_data_limit: Option<usize>,
    pub failures: Option<FailureSender>,
}

/// What one save pulls out of a version-specific data model.
#[derive(Debug, Clone, Default)]
pub(crate) struct Extracted {
    pub status: Option<AttemptStatus>,
    pub success_status: Option<SuccessStatus>,
    pub score: Score,
    pub progress: Option<f64>,
    pub session_seconds: f64,
    pub exit: ExitReason,
    pub location: Option<String>,
    pub suspend_data: Option<String>,
}

/// Running totals a runtime carries between saves within one session.
#[derive(Debug, Clone)]
pub(crate) struct SessionLedger {
    pub total_time_seconds: f64,
    pub status: AttemptStatus,
}

impl SessionLedger {
    pub fn new(total_time_seconds: f64, status: AttemptStatus) -> Self {
        Self {
            total_time_seconds,
            status,
        }
    }

    /// Builds the partial update for one commit or terminate.
    ///
    /// The session time is added on every call. Content that commits twice
    /// without resetting `session_time` is credited twice.
    pub fn write_back(
        &mut self,
        cmi: &CmiData,
        extract: impl FnOnce(&CmiData) -> Extracted,
    ) -> AttemptUpdate {
        let ex = extract(cmi);
        let now = Utc::now();

        if ex.session_seconds.is_finite() && ex.session_seconds > 0.0 {
            self.total_time_seconds += ex.session_seconds;
        }

        let completed_at = match ex.status {
            Some(next) if next.is_terminal() && !self.status.is_terminal() => Some(now),
            _ => None,
        };
        if let Some(next) = ex.status {
            self.status = next;
        }

        AttemptUpdate {
            status: ex.status,
            success_status: ex.success_status,
            score: (!ex.score.is_empty()).then_some(ex.score),
            progress: ex.progress,
            total_time_seconds: Some(self.total_time_seconds),
            suspend_data: ex.suspend_data,
            location: ex.location,
            cmi_data: Some(cmi.clone()),
            exit_reason: Some(ex.exit),
            last_accessed_at: Some(now),
            completed_at,
        }
    }
}

/// Numeric element value, `None` when absent, blank or not a finite number.
pub(crate) fn number(cmi: &CmiData, key: &str) -> Option<f64> {
    cmi.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Element value, or `""` when the element was never set.
pub(crate) fn text<'a>(cmi: &'a CmiData, key: &str) -> &'a str {
    cmi.get(key).map(String::as_str).unwrap_or("")
}

/// Number of distinct indices stored under a collection such as `cmi.interactions`.
pub(crate) fn collection_count(cmi: &CmiData, collection: &str) -> usize {
    let prefix = format!("{collection}.");
    let mut indices: Vec<usize> = cmi
        .keys()
        .filter_map(|k| k.strip_prefix(&prefix))
        .filter_map(|rest| rest.split('.').next())
        .filter_map(|idx| idx.parse().ok())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices.len()
}

pub(crate) fn format_number(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmi(pairs: &[(&str, &str)]) -> CmiData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ledger_accumulates_every_save() {
        let mut ledger = SessionLedger::new(100.0, AttemptStatus::Incomplete);
        let data = cmi(&[]);
        let extract = || Extracted {
            session_seconds: 30.0,
            ..Default::default()
        };

        let first = ledger.write_back(&data, |_| extract());
        let second = ledger.write_back(&data, |_| extract());
        assert_eq!(first.total_time_seconds, Some(130.0));
        assert_eq!(second.total_time_seconds, Some(160.0));
    }

    #[test]
    fn non_finite_session_time_is_not_credited() {
        let mut ledger = SessionLedger::new(42.0, AttemptStatus::Incomplete);
        let data = cmi(&[]);
        for bad in [f64::INFINITY, f64::NAN, -5.0] {
            let update = ledger.write_back(&data, |_| Extracted {
                session_seconds: bad,
                ..Default::default()
            });
            assert_eq!(update.total_time_seconds, Some(42.0));
        }
    }

    #[test]
    fn completed_at_only_on_transition() {
        let mut ledger = SessionLedger::new(0.0, AttemptStatus::NotAttempted);
        let data = cmi(&[]);
        let passed = || Extracted {
            status: Some(AttemptStatus::Passed),
            ..Default::default()
        };

        assert!(ledger.write_back(&data, |_| passed()).completed_at.is_some());
        assert!(ledger.write_back(&data, |_| passed()).completed_at.is_none());
    }

    #[test]
    fn empty_score_is_omitted() {
        let mut ledger = SessionLedger::new(0.0, AttemptStatus::NotAttempted);
        let update = ledger.write_back(&cmi(&[("cmi.x", "1")]), |_| Extracted::default());
        assert!(update.score.is_none());
        assert_eq!(update.exit_reason, Some(ExitReason::Normal));
        assert_eq!(update.cmi_data.unwrap().get("cmi.x").map(String::as_str), Some("1"));
    }

    #[test]
    fn counts_collection_members() {
        let data = cmi(&[
            ("cmi.interactions.0.id", "q1"),
            ("cmi.interactions.0.result", "correct"),
            ("cmi.interactions.1.id", "q2"),
            ("cmi.interactions_extra", "x"),
        ]);
        assert_eq!(collection_count(&data, "cmi.interactions"), 2);
        assert_eq!(collection_count(&data, "cmi.objectives"), 0);
    }

    #[test]
    fn numbers_ignore_blank_and_garbage() {
        let data = cmi(&[("a", ""), ("b", "abc"), ("c", " 42.5 ")]);
        assert_eq!(number(&data, "a"), None);
        assert_eq!(number(&data, "b"), None);
        assert_eq!(number(&data, "c"), Some(42.5));
        assert_eq!(number(&data, "missing"), None);
        assert_eq!(format_number(85.0), "85");
    }
}

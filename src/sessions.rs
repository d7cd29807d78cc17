//! Live runtime sessions keyed by attempt id, and literal method dispatch.

use crate::runtime::{Scorm12Runtime, Scorm2004Runtime, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub enum ActiveRuntime {
    Scorm12(Scorm12Runtime),
    Scorm2004(Scorm2004Runtime),
}

fn arg(args: &[String], i: usize) -> &str {
    args.get(i).map(String::as_str).unwrap_or("")
}

impl ActiveRuntime {
    /// Invokes an API method by its literal SCORM name. `None` when the name
    /// does not belong to this runtime's version.
    pub fn call(&mut self, method: &str, args: &[String]) -> Option<String> {
        let a0 = arg(args, 0);
        let a1 = arg(args, 1);
        match self {
            ActiveRuntime::Scorm12(rt) => Some(match method {
                "LMSInitialize" => rt.LMSInitialize(a0),
                "LMSFinish" => rt.LMSFinish(a0),
                "LMSGetValue" => rt.LMSGetValue(a0),
                "LMSSetValue" => rt.LMSSetValue(a0, a1),
                "LMSCommit" => rt.LMSCommit(a0),
                "LMSGetLastError" => rt.LMSGetLastError(),
                "LMSGetErrorString" => rt.LMSGetErrorString(a0),
                "LMSGetDiagnostic" => rt.LMSGetDiagnostic(a0),
                _ => return None,
            }),
            ActiveRuntime::Scorm2004(rt) => Some(match method {
                "Initialize" => rt.Initialize(a0),
                "Terminate" => rt.Terminate(a0),
                "GetValue" => rt.GetValue(a0),
                "SetValue" => rt.SetValue(a0, a1),
                "Commit" => rt.Commit(a0),
                "GetLastError" => rt.GetLastError(),
                "GetErrorString" => rt.GetErrorString(a0),
                "GetDiagnostic" => rt.GetDiagnostic(a0),
                _ => return None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        match self {
            ActiveRuntime::Scorm12(rt) => rt.state(),
            ActiveRuntime::Scorm2004(rt) => rt.state(),
        }
    }
}

/// Open sessions. One per attempt; opening again replaces the previous one.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, ActiveRuntime>>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Result(String),
    NoSession,
    UnknownMethod,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, attempt_id: Uuid, runtime: ActiveRuntime) {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.insert(attempt_id, runtime).is_some() {
            tracing::warn!(attempt_id = %attempt_id, "replaced an open session");
        }
    }

    pub fn contains(&self, attempt_id: Uuid) -> bool {
        let sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions.contains_key(&attempt_id)
    }

    /// Drops a session. Its writer still finishes any queued saves.
    pub fn remove(&self, attempt_id: Uuid) -> bool {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&attempt_id).is_some()
    }

    /// Runs one API call. Terminated sessions stay registered so the content
    /// can still ask for the last error; they go away on `remove` or reopen.
    pub fn call(&self, attempt_id: Uuid, method: &str, args: &[String]) -> CallOutcome {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(runtime) = sessions.get_mut(&attempt_id) else {
            return CallOutcome::NoSession;
        };
        let Some(result) = runtime.call(method, args) else {
            return CallOutcome::UnknownMethod;
        };
        if runtime.state() == SessionState::Terminated {
            tracing::debug!(attempt_id = %attempt_id, method, "call on terminated session");
        }
        CallOutcome::Result(result)
    }
}

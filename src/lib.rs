//! SCORM 1.2 / 2004 run-time bridge.
//!
//! Content-facing runtimes live in [`runtime`]; they persist through an
//! [`store::AttemptStore`]. [`attempts`] creates and finds attempts, and
//! [`routes`] exposes both over HTTP.

pub mod attempts;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod runtime;
pub mod sessions;
pub mod store;

pub use error::{ApiError, RuntimeError, StoreError};
pub use models::{AttemptRecord, AttemptStatus, AttemptUpdate, ExitReason, Score, SuccessStatus};
pub use runtime::{LaunchContext, Scorm12Runtime, Scorm2004Runtime};
pub use store::{AttemptStore, MemoryAttemptStore, PgAttemptStore};

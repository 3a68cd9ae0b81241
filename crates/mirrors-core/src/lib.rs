//! Sync orchestration engine for linux-mirrors.
//!
//! This crate ties together distribution records, mirror tree layout, and
//! sandbox backends into the `Engine`: it expands targets, builds the
//! deterministic apt-mirror/reposync invocation for each, schedules sync jobs
//! under a concurrency ceiling with cancellation and timeouts, and runs
//! verification passes whose results gate cleanup.

pub mod admission;
pub mod cancel;
pub mod command;
pub mod engine;
pub mod lifecycle;
pub mod registry;
pub mod scheduler;
pub mod summary;

pub use admission::{AdmissionGate, Permit};
pub use cancel::{install_signal_handler, CancelToken};
pub use command::{build_plan, SyncPlan};
pub use engine::{Engine, SyncOptions, TargetFilter};
pub use lifecycle::{validate_transition, JobState};
pub use registry::{ExitReason, JobRegistry, JobResult, SyncJob};
pub use scheduler::{JobStream, Scheduler, SchedulerOptions};
pub use summary::SyncSummary;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] mirrors_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] mirrors_store::StoreError),
    #[error("sandbox error: {0}")]
    Sandbox(#[from] mirrors_runtime::SandboxError),
    #[error("sandbox backend unavailable: {0}")]
    SandboxUnavailable(String),
    #[error("invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("target {0} already has an active sync job")]
    DuplicateJob(String),
    #[error("no job registered for target {0}")]
    JobNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the error means no sync job could run at all.
    pub fn is_sandbox_unavailable(&self) -> bool {
        match self {
            Self::SandboxUnavailable(_) => true,
            Self::Sandbox(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

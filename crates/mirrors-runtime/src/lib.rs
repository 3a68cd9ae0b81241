//! Sandbox backends for linux-mirrors sync jobs.
//!
//! This crate implements the execution layer: the `Sandbox` capability trait
//! with a podman/docker CLI backend (`ContainerSandbox`) and a recording
//! `MockSandbox` for tests, the `CancelToken`/`RunControl` pair threaded
//! through every blocking wait, sync tool image recipes, and prerequisite
//! checking.

pub mod backend;
pub mod cancel;
pub mod container;
pub mod image;
pub mod mock;
pub mod prereq;

pub use backend::{
    select_backend, RunControl, RunOutcome, Sandbox, SandboxFile, SandboxHandle, SandboxSpec,
    MIRROR_MOUNT,
};
pub use cancel::CancelToken;
pub use container::ContainerSandbox;
pub use image::{recipe_for, ImageRecipe};
pub use mock::{MockBehavior, MockCall, MockSandbox};
pub use prereq::{check_container_prereqs, check_verifier_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sandbox backend '{0}' is not available on this system")]
    Unavailable(String),
    #[error("sandbox execution failed: {0}")]
    ExecutionFailed(String),
}

impl SandboxError {
    /// Whether this error means no job can run at all, as opposed to one job
    /// failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

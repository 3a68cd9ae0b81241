use crate::cancel::CancelToken;
use crate::SandboxError;
use mirrors_schema::RepoKind;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the mirror tree appears inside every sandbox.
pub const MIRROR_MOUNT: &str = "/mirror";

/// A file staged into the mirror tree before the job starts, addressed
/// relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFile {
    pub path: String,
    pub contents: String,
}

/// What a sync job needs from its sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSpec {
    /// Unique per target; reused across runs so stale sandboxes can be found.
    pub name: String,
    pub kind: RepoKind,
    /// Host directory mounted read-write at [`MIRROR_MOUNT`].
    pub tree: PathBuf,
    pub env: Vec<(String, String)>,
    pub files: Vec<SandboxFile>,
}

impl SandboxSpec {
    /// Spec for one target's sync with the standard environment.
    pub fn for_target(
        key_slug: &str,
        kind: RepoKind,
        tree: PathBuf,
        distribution: &str,
        version: &str,
    ) -> Self {
        Self {
            name: format!("linux-mirrors-{key_slug}"),
            kind,
            tree,
            env: vec![
                ("DIST_NAME".to_owned(), distribution.to_owned()),
                ("DIST_VERSION".to_owned(), version.to_owned()),
                ("MIRROR_PATH".to_owned(), MIRROR_MOUNT.to_owned()),
            ],
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub id: String,
    pub spec: SandboxSpec,
}

/// Cancellation and deadline for one blocking run. Backends poll it at
/// least once per `tick`.
#[derive(Debug, Clone)]
pub struct RunControl {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
    pub tick: Duration,
}

impl RunControl {
    pub fn new(cancel: CancelToken, timeout: Option<Duration>, tick: Duration) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
            tick,
        }
    }

    /// The interruption that applies right now, if any. Cancellation wins
    /// over an expired deadline.
    pub fn interrupted(&self) -> Option<RunOutcome> {
        if self.cancel.is_cancelled() {
            Some(RunOutcome::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(RunOutcome::TimedOut)
        } else {
            None
        }
    }

    /// How long to block before polling again.
    pub fn next_wait(&self) -> Duration {
        match self.deadline {
            Some(d) => self.tick.min(d.saturating_duration_since(Instant::now())),
            None => self.tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exited { code: i32, output: String },
    Cancelled,
    TimedOut,
}

/// An isolated execution context for one sync job.
pub trait Sandbox: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Prepare the context: clear leftovers of an earlier run under the same
    /// name and stage `spec.files` into the tree.
    fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError>;

    /// Run `command` to completion, or until `control` interrupts it. An
    /// interrupted run has already stopped its process when this returns.
    fn run(
        &self,
        handle: &SandboxHandle,
        command: &[String],
        control: &RunControl,
    ) -> Result<RunOutcome, SandboxError>;

    /// Force-stop anything still running in the context.
    fn terminate(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;

    fn destroy(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;
}

/// Write `spec.files` into the tree. Paths must stay inside the tree.
pub(crate) fn stage_files(spec: &SandboxSpec) -> Result<(), SandboxError> {
    for file in &spec.files {
        let rel = Path::new(&file.path);
        if rel.as_os_str().is_empty()
            || !rel.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(SandboxError::ExecutionFailed(format!(
                "refusing to stage '{}' outside the mirror tree",
                file.path
            )));
        }
        let dest = spec.tree.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &file.contents)?;
    }
    Ok(())
}

pub fn select_backend(name: &str) -> Result<Arc<dyn Sandbox>, SandboxError> {
    match name {
        "podman" | "docker" => Ok(Arc::new(crate::container::ContainerSandbox::new(name))),
        "mock" => Ok(Arc::new(crate::mock::MockSandbox::new())),
        other => Err(SandboxError::Unavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_backends() {
        assert_eq!(select_backend("podman").unwrap().name(), "podman");
        assert_eq!(select_backend("docker").unwrap().name(), "docker");
        assert_eq!(select_backend("mock").unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_backend_fails() {
        assert!(select_backend("lxc").is_err());
    }

    #[test]
    fn spec_for_target_sets_environment() {
        let spec = SandboxSpec::for_target(
            "debian-bookworm",
            RepoKind::Apt,
            PathBuf::from("/srv/mirror/apt/debian/bookworm"),
            "debian",
            "bookworm",
        );
        assert_eq!(spec.name, "linux-mirrors-debian-bookworm");
        assert!(spec
            .env
            .contains(&("MIRROR_PATH".to_owned(), "/mirror".to_owned())));
        assert!(spec
            .env
            .contains(&("DIST_VERSION".to_owned(), "bookworm".to_owned())));
    }

    #[test]
    fn staging_writes_inside_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = SandboxSpec::for_target(
            "rocky-9",
            RepoKind::Yum,
            dir.path().to_path_buf(),
            "rocky",
            "9",
        );
        spec.files.push(SandboxFile {
            path: ".linux-mirrors/yum.repos.d/mirror.repo".to_owned(),
            contents: "[baseos]\n".to_owned(),
        });
        stage_files(&spec).unwrap();
        let staged = dir.path().join(".linux-mirrors/yum.repos.d/mirror.repo");
        assert_eq!(std::fs::read_to_string(staged).unwrap(), "[baseos]\n");
    }

    #[test]
    fn staging_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../outside", "/etc/passwd", ""] {
            let mut spec = SandboxSpec::for_target(
                "x",
                RepoKind::Apt,
                dir.path().to_path_buf(),
                "debian",
                "bookworm",
            );
            spec.files.push(SandboxFile {
                path: bad.to_owned(),
                contents: String::new(),
            });
            assert!(stage_files(&spec).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn control_reports_cancel_before_timeout() {
        let cancel = CancelToken::new();
        let control = RunControl::new(
            cancel.clone(),
            Some(Duration::ZERO),
            Duration::from_millis(10),
        );
        assert_eq!(control.interrupted(), Some(RunOutcome::TimedOut));
        cancel.cancel();
        assert_eq!(control.interrupted(), Some(RunOutcome::Cancelled));
    }

    #[test]
    fn next_wait_never_overshoots_deadline() {
        let control = RunControl::new(
            CancelToken::new(),
            Some(Duration::from_millis(5)),
            Duration::from_secs(1),
        );
        assert!(control.next_wait() <= Duration::from_millis(5));
        let open = RunControl::new(CancelToken::new(), None, Duration::from_millis(50));
        assert_eq!(open.next_wait(), Duration::from_millis(50));
        assert_eq!(open.interrupted(), None);
    }
}

use crate::lifecycle::{validate_transition, JobState};
use crate::CoreError;
use chrono::{DateTime, Utc};
use mirrors_schema::{ErrorKind, Target, TargetKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Why a job ended: a machine-readable kind (absent on success) and a
/// human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReason {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub detail: String,
}

impl ExitReason {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            kind: None,
            detail: detail.into(),
        }
    }

    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.detail),
            None => f.write_str(&self.detail),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub target: Target,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit: Option<ExitReason>,
}

/// Terminal outcome of one job, delivered once the job leaves the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub target: Target,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub exit: ExitReason,
}

/// Active sync jobs keyed by target. Owned by one scheduler run; a job is
/// removed as soon as it reaches a terminal state.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<TargetKey, SyncJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TargetKey, SyncJob>>, CoreError> {
        self.jobs
            .lock()
            .map_err(|e| CoreError::Internal(format!("job registry poisoned: {e}")))
    }

    /// Register `target` as queued. A target may have one active job at a time.
    pub fn enqueue(&self, target: &Target) -> Result<(), CoreError> {
        let mut jobs = self.lock()?;
        let key = target.key();
        if jobs.contains_key(&key) {
            return Err(CoreError::DuplicateJob(key.into_inner()));
        }
        jobs.insert(
            key,
            SyncJob {
                target: target.clone(),
                state: JobState::Queued,
                started_at: None,
                finished_at: None,
                exit: None,
            },
        );
        Ok(())
    }

    /// Move a job to a non-terminal state.
    pub fn transition(&self, key: &TargetKey, to: JobState) -> Result<(), CoreError> {
        let mut jobs = self.lock()?;
        let job = jobs
            .get_mut(key)
            .ok_or_else(|| CoreError::JobNotFound(key.to_string()))?;
        validate_transition(job.state, to)?;
        if to == JobState::Running {
            job.started_at = Some(Utc::now());
        }
        job.state = to;
        Ok(())
    }

    /// Move a job to its terminal state and remove it.
    pub fn finish(
        &self,
        key: &TargetKey,
        to: JobState,
        exit: ExitReason,
    ) -> Result<JobResult, CoreError> {
        let mut jobs = self.lock()?;
        let job = jobs
            .get(key)
            .ok_or_else(|| CoreError::JobNotFound(key.to_string()))?;
        validate_transition(job.state, to)?;
        let job = jobs
            .remove(key)
            .ok_or_else(|| CoreError::JobNotFound(key.to_string()))?;
        Ok(JobResult {
            target: job.target,
            state: to,
            started_at: job.started_at,
            finished_at: Utc::now(),
            exit,
        })
    }

    pub fn state(&self, key: &TargetKey) -> Option<JobState> {
        self.lock().ok()?.get(key).map(|j| j.state)
    }

    /// Number of jobs currently in `state`.
    pub fn count(&self, state: JobState) -> usize {
        self.lock()
            .map(|jobs| jobs.values().filter(|j| j.state == state).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every active job, ordered by target key.
    pub fn snapshot(&self) -> Vec<SyncJob> {
        let mut jobs: Vec<SyncJob> = self
            .lock()
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default();
        jobs.sort_by(|a, b| a.target.cmp(&b.target));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrors_schema::RepoKind;

    fn target() -> Target {
        Target::new("debian", RepoKind::Apt, "bookworm")
    }

    #[test]
    fn job_walks_lifecycle_and_leaves_registry() {
        let reg = JobRegistry::new();
        let t = target();
        reg.enqueue(&t).unwrap();
        reg.transition(&t.key(), JobState::Admitted).unwrap();
        reg.transition(&t.key(), JobState::Running).unwrap();
        assert_eq!(reg.count(JobState::Running), 1);

        let result = reg
            .finish(&t.key(), JobState::Succeeded, ExitReason::ok("exit 0"))
            .unwrap();
        assert_eq!(result.state, JobState::Succeeded);
        assert!(result.started_at.is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn duplicate_active_job_rejected() {
        let reg = JobRegistry::new();
        reg.enqueue(&target()).unwrap();
        assert!(matches!(
            reg.enqueue(&target()),
            Err(CoreError::DuplicateJob(_))
        ));
        let per_arch = target().with_architecture("amd64");
        reg.enqueue(&per_arch).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn invalid_transition_keeps_job() {
        let reg = JobRegistry::new();
        let t = target();
        reg.enqueue(&t).unwrap();
        assert!(reg
            .finish(&t.key(), JobState::Succeeded, ExitReason::ok(""))
            .is_err());
        assert_eq!(reg.state(&t.key()), Some(JobState::Queued));
    }

    #[test]
    fn exit_reason_display() {
        let r = ExitReason::error(ErrorKind::Timeout, "exceeded 60s");
        assert_eq!(r.to_string(), "timeout: exceeded 60s");
        assert_eq!(ExitReason::ok("exit 0").to_string(), "exit 0");
    }
}

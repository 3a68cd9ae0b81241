use crate::admission::AdmissionGate;
use crate::cancel::CancelToken;
use crate::command::{build_plan, SyncPlan};
use crate::lifecycle::JobState;
use crate::registry::{ExitReason, JobRegistry, JobResult, SyncJob};
use crate::CoreError;
use mirrors_runtime::{RunControl, RunOutcome, Sandbox, SandboxError, SandboxSpec};
use mirrors_schema::{
    interleave_by_distribution, Distribution, ErrorKind, Target, DEFAULT_MAX_CONCURRENT_SYNCS,
};
use mirrors_store::{LockMode, MirrorLayout, TreeLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal state plus reason for a job that has finished.
type Ended = (JobState, ExitReason);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Maximum number of jobs admitted at once.
    pub concurrency: usize,
    /// Wall-clock limit per job, counted from admission.
    pub job_timeout: Option<Duration>,
    /// Upper bound on how long any wait goes without re-checking
    /// cancellation and deadlines.
    pub tick: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_MAX_CONCURRENT_SYNCS,
            job_timeout: None,
            tick: Duration::from_millis(250),
        }
    }
}

/// Runs sync jobs for a set of targets against a sandbox backend.
pub struct Scheduler {
    sandbox: Arc<dyn Sandbox>,
    layout: MirrorLayout,
    options: SchedulerOptions,
}

/// Job results in completion order. Call [`JobStream::finish`] after
/// draining it to learn whether the run was aborted.
pub struct JobStream {
    results: Receiver<JobResult>,
    registry: Arc<JobRegistry>,
    coordinator: Option<JoinHandle<Option<String>>>,
}

impl Iterator for JobStream {
    type Item = JobResult;

    fn next(&mut self) -> Option<JobResult> {
        self.results.recv().ok()
    }
}

impl JobStream {
    /// Jobs that have not reached a terminal state yet.
    pub fn active_jobs(&self) -> Vec<SyncJob> {
        self.registry.snapshot()
    }

    /// Wait for the run to settle. Returns results not yet consumed from the
    /// stream, or the batch-level error that aborted the run.
    pub fn finish(mut self) -> Result<Vec<JobResult>, CoreError> {
        let rest: Vec<JobResult> = self.results.iter().collect();
        let fatal = match self.coordinator.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CoreError::Internal("sync coordinator panicked".to_owned()))?,
            None => None,
        };
        match fatal {
            Some(reason) => Err(CoreError::SandboxUnavailable(reason)),
            None => Ok(rest),
        }
    }
}

impl Scheduler {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        layout: MirrorLayout,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            sandbox,
            layout,
            options,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Start syncing `targets`. Targets are admitted in round-robin order
    /// across distributions; results stream back as jobs finish.
    ///
    /// Fails up front if the sandbox backend is unavailable. Once `cancel`
    /// is set no further job is admitted and running jobs are stopped.
    pub fn run(
        &self,
        distributions: &BTreeMap<String, Distribution>,
        targets: Vec<Target>,
        cancel: &CancelToken,
    ) -> Result<JobStream, CoreError> {
        if !self.sandbox.available() {
            return Err(CoreError::SandboxUnavailable(format!(
                "container runtime '{}' is not usable",
                self.sandbox.name()
            )));
        }

        let registry = Arc::new(JobRegistry::new());
        let run = Arc::new(Run {
            sandbox: Arc::clone(&self.sandbox),
            layout: self.layout.clone(),
            distributions: distributions.clone(),
            options: self.options,
            registry: Arc::clone(&registry),
            gate: AdmissionGate::new(self.options.concurrency),
            cancel: cancel.child(),
            fatal: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel();
        let coordinator = std::thread::Builder::new()
            .name("sync-coordinator".to_owned())
            .spawn(move || run.coordinate(targets, &tx))?;

        Ok(JobStream {
            results: rx,
            registry,
            coordinator: Some(coordinator),
        })
    }
}

/// State shared by the coordinator and workers of one run.
struct Run {
    sandbox: Arc<dyn Sandbox>,
    layout: MirrorLayout,
    distributions: BTreeMap<String, Distribution>,
    options: SchedulerOptions,
    registry: Arc<JobRegistry>,
    gate: AdmissionGate,
    /// Set by the caller's token or by a batch-fatal error.
    cancel: CancelToken,
    fatal: Mutex<Option<String>>,
}

impl Run {
    fn coordinate(&self, targets: Vec<Target>, tx: &Sender<JobResult>) -> Option<String> {
        let mut runnable: VecDeque<(Target, SyncPlan)> = VecDeque::new();
        for target in interleave_by_distribution(targets) {
            if let Err(e) = self.registry.enqueue(&target) {
                warn!("{target}: {e}");
                continue;
            }
            match self.prepare(&target) {
                Ok(plan) => runnable.push_back((target, plan)),
                Err((state, exit)) => self.emit(tx, &target, state, exit),
            }
        }

        std::thread::scope(|scope| {
            while let Some((target, plan)) = runnable.pop_front() {
                let Some(permit) = self.gate.acquire(&self.cancel, self.options.tick) else {
                    runnable.push_front((target, plan));
                    break;
                };
                if let Err(e) = self.registry.transition(&target.key(), JobState::Admitted) {
                    warn!("{target}: {e}");
                    continue;
                }
                info!("{target}: admitted");
                let tx = tx.clone();
                scope.spawn(move || {
                    let (state, exit) = self.execute(&target, &plan);
                    drop(permit);
                    self.emit(&tx, &target, state, exit);
                });
            }

            let reason = if self.fatal_reason().is_some() {
                "run aborted: sandbox backend unavailable"
            } else {
                "cancelled before admission"
            };
            for (target, _) in runnable.drain(..) {
                let exit = ExitReason::error(ErrorKind::Cancelled, reason);
                self.emit(tx, &target, JobState::Cancelled, exit);
            }
        });

        self.fatal_reason()
    }

    /// Classify a queued target before admission: skipped, invalid, or
    /// ready to run with its plan.
    fn prepare(&self, target: &Target) -> Result<SyncPlan, Ended> {
        let Some(dist) = self.distributions.get(&target.distribution) else {
            return Err((
                JobState::Failed,
                ExitReason::error(
                    ErrorKind::ConfigInvalid,
                    format!("unknown distribution '{}'", target.distribution),
                ),
            ));
        };
        if !dist.enabled {
            return Err((
                JobState::Skipped,
                ExitReason::ok(format!("distribution '{}' is disabled", dist.name)),
            ));
        }
        build_plan(dist, target).map_err(|e| {
            (
                JobState::Failed,
                ExitReason::error(ErrorKind::ConfigInvalid, e.to_string()),
            )
        })
    }

    fn execute(&self, target: &Target, plan: &SyncPlan) -> Ended {
        let control = RunControl::new(
            self.cancel.clone(),
            self.options.job_timeout,
            self.options.tick,
        );
        match self.drive(target, plan, &control) {
            Ok(ended) | Err(ended) => ended,
        }
    }

    fn drive(
        &self,
        target: &Target,
        plan: &SyncPlan,
        control: &RunControl,
    ) -> Result<Ended, Ended> {
        let _lock = self.lock_tree(target, control)?;
        let tree = self
            .layout
            .initialize_tree(target)
            .map_err(|e| failed(ErrorKind::Io, e.to_string()))?;

        let mut spec = SandboxSpec::for_target(
            &target.key().slug(),
            target.kind,
            tree,
            &target.distribution,
            &target.version,
        );
        spec.files.clone_from(&plan.files);
        let handle = self
            .sandbox
            .create(&spec)
            .map_err(|e| self.sandbox_failure(target, &e))?;

        if let Err(e) = self.registry.transition(&target.key(), JobState::Running) {
            if let Err(destroy) = self.sandbox.destroy(&handle) {
                warn!("{target}: destroying sandbox failed: {destroy}");
            }
            return Err(failed(ErrorKind::ExecutionFailed, e.to_string()));
        }
        info!("{target}: running {}", plan.command.first().map_or("", String::as_str));

        let ended = match self.sandbox.run(&handle, &plan.command, control) {
            Ok(RunOutcome::Exited { code: 0, .. }) => {
                (JobState::Succeeded, ExitReason::ok("exited with code 0"))
            }
            Ok(RunOutcome::Exited { code, output }) => {
                let detail = match output.lines().rev().find(|l| !l.trim().is_empty()) {
                    Some(last) => format!("exited with code {code}: {}", last.trim()),
                    None => format!("exited with code {code}"),
                };
                failed(ErrorKind::ExecutionFailed, detail)
            }
            Ok(outcome @ (RunOutcome::Cancelled | RunOutcome::TimedOut)) => {
                if let Err(e) = self.sandbox.terminate(&handle) {
                    warn!("{target}: terminate failed: {e}");
                }
                self.interrupted(&outcome)
            }
            Err(e) => self.sandbox_failure(target, &e),
        };

        if let Err(e) = self.sandbox.destroy(&handle) {
            warn!("{target}: destroying sandbox failed: {e}");
        }
        Ok(ended)
    }

    /// Take the exclusive tree lock, polling so cancellation and the
    /// deadline still apply while another job or a verifier holds it.
    fn lock_tree(&self, target: &Target, control: &RunControl) -> Result<TreeLock, Ended> {
        let path = self.layout.lock_path(target);
        let mut waiting = false;
        loop {
            if let Some(outcome) = control.interrupted() {
                return Err(self.interrupted(&outcome));
            }
            match TreeLock::try_acquire(&path, LockMode::Exclusive) {
                Ok(Some(lock)) => return Ok(lock),
                Ok(None) => {
                    if !waiting {
                        debug!("{target}: waiting for tree lock {}", path.display());
                        waiting = true;
                    }
                    std::thread::sleep(control.next_wait());
                }
                Err(e) => return Err(failed(ErrorKind::Io, e.to_string())),
            }
        }
    }

    fn interrupted(&self, outcome: &RunOutcome) -> Ended {
        match outcome {
            RunOutcome::TimedOut => failed(
                ErrorKind::Timeout,
                format!(
                    "exceeded the {}s job timeout",
                    self.options.job_timeout.map_or(0, |t| t.as_secs())
                ),
            ),
            _ => {
                let detail = match self.fatal_reason() {
                    Some(_) => "run aborted: sandbox backend unavailable",
                    None => "cancelled while running",
                };
                (
                    JobState::Cancelled,
                    ExitReason::error(ErrorKind::Cancelled, detail),
                )
            }
        }
    }

    /// An unavailable backend aborts the whole run; any other sandbox error
    /// fails only this job.
    fn sandbox_failure(&self, target: &Target, e: &SandboxError) -> Ended {
        if e.is_unavailable() {
            if let Ok(mut fatal) = self.fatal.lock() {
                fatal.get_or_insert_with(|| e.to_string());
            }
            warn!("{target}: {e}; aborting run");
            self.cancel.cancel();
            failed(ErrorKind::SandboxUnavailable, e.to_string())
        } else {
            failed(ErrorKind::ExecutionFailed, e.to_string())
        }
    }

    fn fatal_reason(&self) -> Option<String> {
        self.fatal.lock().ok().and_then(|f| f.clone())
    }

    fn emit(&self, tx: &Sender<JobResult>, target: &Target, state: JobState, exit: ExitReason) {
        match self.registry.finish(&target.key(), state, exit) {
            Ok(result) => {
                match result.state {
                    JobState::Succeeded | JobState::Skipped => {
                        info!("{target}: {} ({})", result.state, result.exit);
                    }
                    _ => warn!("{target}: {} ({})", result.state, result.exit),
                }
                let _ = tx.send(result);
            }
            Err(e) => warn!("{target}: {e}"),
        }
    }
}

fn failed(kind: ErrorKind, detail: String) -> Ended {
    (JobState::Failed, ExitReason::error(kind, detail))
}

use crate::backend::{stage_files, RunControl, RunOutcome, Sandbox, SandboxHandle, SandboxSpec};
use crate::SandboxError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How a mock sandbox behaves when its job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Exit with `code` after `after` has elapsed.
    Exit { code: i32, after: Duration },
    /// Run until cancelled or timed out.
    Hang,
    /// Lose the backend in the middle of the run.
    Vanish,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self::Exit {
            code: 0,
            after: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create { name: String },
    Run { name: String, command: Vec<String> },
    Terminate { name: String },
    Destroy { name: String },
}

/// In-process sandbox that records every call and never starts a process.
pub struct MockSandbox {
    calls: Mutex<Vec<MockCall>>,
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    default_behavior: Mutex<MockBehavior>,
    unavailable: AtomicBool,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behaviors: Mutex::new(HashMap::new()),
            default_behavior: Mutex::new(MockBehavior::default()),
            unavailable: AtomicBool::new(false),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `available` reports false.
    pub fn unavailable() -> Self {
        let mock = Self::default();
        mock.unavailable.store(true, Ordering::SeqCst);
        mock
    }

    /// Behavior for the sandbox called `name`.
    pub fn set_behavior(&self, name: &str, behavior: MockBehavior) {
        if let Ok(mut map) = self.behaviors.lock() {
            map.insert(name.to_owned(), behavior);
        }
    }

    /// Behavior for sandboxes without their own entry.
    pub fn set_default_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut b) = self.default_behavior.lock() {
            *b = behavior;
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of runs observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) -> Result<(), SandboxError> {
        self.calls
            .lock()
            .map_err(|e| SandboxError::ExecutionFailed(format!("mutex poisoned: {e}")))?
            .push(call);
        Ok(())
    }

    fn behavior_for(&self, name: &str) -> Result<MockBehavior, SandboxError> {
        let poisoned = |e: String| SandboxError::ExecutionFailed(format!("mutex poisoned: {e}"));
        let map = self.behaviors.lock().map_err(|e| poisoned(e.to_string()))?;
        if let Some(b) = map.get(name) {
            return Ok(b.clone());
        }
        drop(map);
        let default = self
            .default_behavior
            .lock()
            .map_err(|e| poisoned(e.to_string()))?;
        Ok(default.clone())
    }

    fn simulate(&self, behavior: &MockBehavior, control: &RunControl) -> RunOutcome {
        let started = Instant::now();
        loop {
            if let Some(outcome) = control.interrupted() {
                return outcome;
            }
            if let MockBehavior::Exit { code, after } = behavior {
                if started.elapsed() >= *after {
                    return RunOutcome::Exited {
                        code: *code,
                        output: format!("mock-exit: {code}"),
                    };
                }
            }
            std::thread::sleep(control.next_wait().min(Duration::from_millis(5)));
        }
    }
}

/// Decrements the in-flight counter when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Sandbox for MockSandbox {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        if !self.available() {
            return Err(SandboxError::Unavailable("mock".to_owned()));
        }
        self.record(MockCall::Create {
            name: spec.name.clone(),
        })?;
        std::fs::create_dir_all(&spec.tree)?;
        stage_files(spec)?;
        Ok(SandboxHandle {
            id: spec.name.clone(),
            spec: spec.clone(),
        })
    }

    fn run(
        &self,
        handle: &SandboxHandle,
        command: &[String],
        control: &RunControl,
    ) -> Result<RunOutcome, SandboxError> {
        self.record(MockCall::Run {
            name: handle.id.clone(),
            command: command.to_vec(),
        })?;
        let behavior = self.behavior_for(&handle.id)?;
        if behavior == MockBehavior::Vanish {
            self.unavailable.store(true, Ordering::SeqCst);
            return Err(SandboxError::Unavailable("mock".to_owned()));
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(&self.running);
        self.max_running.fetch_max(now, Ordering::SeqCst);

        Ok(self.simulate(&behavior, control))
    }

    fn terminate(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.record(MockCall::Terminate {
            name: handle.id.clone(),
        })
    }

    fn destroy(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.record(MockCall::Destroy {
            name: handle.id.clone(),
        })
    }
}

use crate::backend::{
    stage_files, RunControl, RunOutcome, Sandbox, SandboxHandle, SandboxSpec, MIRROR_MOUNT,
};
use crate::image::{recipe_for, ImageRecipe};
use crate::SandboxError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Lines of combined output kept per run for error reporting.
const OUTPUT_TAIL_LINES: usize = 40;

/// Runs sync jobs in containers through the podman or docker CLI.
pub struct ContainerSandbox {
    runtime: String,
}

impl ContainerSandbox {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.runtime)
    }

    fn spawn_error(&self, e: std::io::Error) -> SandboxError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandboxError::Unavailable(self.runtime.clone())
        } else {
            SandboxError::ExecutionFailed(format!("{} failed to start: {e}", self.runtime))
        }
    }

    /// Run a short housekeeping command, discarding its output.
    fn quiet(&self, args: &[&str]) -> Result<bool, SandboxError> {
        let status = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| self.spawn_error(e))?;
        Ok(status.success())
    }

    fn image_exists(&self, recipe: &ImageRecipe) -> Result<bool, SandboxError> {
        self.quiet(&["image", "inspect", recipe.tag])
    }

    /// Build the kind's image unless it is already present. Returns `None`
    /// when the build was interrupted.
    fn ensure_image(
        &self,
        recipe: &ImageRecipe,
        control: &RunControl,
    ) -> Result<Option<()>, SandboxError> {
        if self.image_exists(recipe)? {
            return Ok(Some(()));
        }
        info!("building image {}", recipe.tag);
        let mut child = self
            .command()
            .args(["build", "-t", recipe.tag, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(recipe.dockerfile.as_bytes())?;
        }
        let readers = attach_readers(&mut child, recipe.tag);
        let status = self.wait(&mut child, control, None)?;
        let output = join_readers(readers);
        match status {
            None => Ok(None),
            Some(s) if s.success() => Ok(Some(())),
            Some(s) => Err(SandboxError::ExecutionFailed(format!(
                "building {} exited with {}: {}",
                recipe.tag,
                s.code().unwrap_or(-1),
                output.trim()
            ))),
        }
    }

    /// Wait for `child`, polling `control` every tick. On interruption the
    /// child is killed, along with the named container if one is given.
    fn wait(
        &self,
        child: &mut Child,
        control: &RunControl,
        container: Option<&str>,
    ) -> Result<Option<ExitStatus>, SandboxError> {
        loop {
            if control.interrupted().is_some() {
                if let Some(name) = container {
                    let _ = self.quiet(&["kill", name]);
                }
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            if let Some(status) = child.wait_timeout(control.next_wait())? {
                return Ok(Some(status));
            }
        }
    }
}

impl Sandbox for ContainerSandbox {
    fn name(&self) -> &str {
        &self.runtime
    }

    fn available(&self) -> bool {
        self.command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        // A container left by an interrupted earlier run would clash on name.
        self.quiet(&["rm", "-f", &spec.name])?;
        std::fs::create_dir_all(&spec.tree)?;
        stage_files(spec)?;
        debug!("prepared container {} for {}", spec.name, spec.tree.display());
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
        let recipe = recipe_for(handle.spec.kind);
        if self.ensure_image(&recipe, control)?.is_none() {
            return Ok(control.interrupted().unwrap_or(RunOutcome::Cancelled));
        }

        let mut cmd = self.command();
        cmd.args(["run", "--rm", "--name", &handle.id])
            .arg("-v")
            .arg(format!(
                "{}:{MIRROR_MOUNT}:rw",
                handle.spec.tree.to_string_lossy()
            ));
        for (k, v) in &handle.spec.env {
            cmd.arg("-e").arg(format!("{k}={v}"));
        }
        cmd.arg(recipe.tag).args(command);

        debug!("starting {} in {}", command.join(" "), handle.id);
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        let readers = attach_readers(&mut child, &handle.id);
        let status = self.wait(&mut child, control, Some(&handle.id))?;
        let output = join_readers(readers);

        match status {
            None => {
                let outcome = control.interrupted().unwrap_or(RunOutcome::Cancelled);
                warn!("{}: stopped ({outcome:?})", handle.id);
                Ok(outcome)
            }
            Some(s) => Ok(RunOutcome::Exited {
                code: s.code().unwrap_or(-1),
                output,
            }),
        }
    }

    fn terminate(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.quiet(&["kill", &handle.id])?;
        Ok(())
    }

    fn destroy(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.quiet(&["rm", "-f", &handle.id])?;
        Ok(())
    }
}

fn attach_readers(child: &mut Child, label: &str) -> Vec<JoinHandle<VecDeque<String>>> {
    let mut readers = Vec::new();
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_tail(out, label.to_owned()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_tail(err, label.to_owned()));
    }
    readers
}

fn spawn_tail<R>(stream: R, label: String) -> JoinHandle<VecDeque<String>>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            debug!(target: "mirrors_runtime::output", "{label}: {line}");
            if tail.len() == OUTPUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail
    })
}

fn join_readers(readers: Vec<JoinHandle<VecDeque<String>>>) -> String {
    let mut lines = Vec::new();
    for r in readers {
        if let Ok(tail) = r.join() {
            lines.extend(tail);
        }
    }
    lines.join("\n")
}

//! Command execution with child-process tracking.
//!
//! [`CommandRunner`] spawns external tools (go, pnpm, npm, swag) with inherited
//! standard I/O so their output streams live. Every child is recorded in a
//! [`ProcessRegistry`] until it exits. The registry is owned by the runner:
//! dropping the runner, or an interrupt delivered to the process, stops any
//! children that are still running.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::types::{CommandFailure, ReleaseError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long terminated children get to exit before they are force-killed.
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Exit code used after an interrupt (SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code used after a termination request (SIGTERM).
pub const EXIT_TERMINATED: i32 = 143;

/// Per-invocation options for [`CommandRunner::run`].
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory. Defaults to the runner's project root.
    pub cwd: Option<PathBuf>,
    /// Variables merged over the current process environment.
    pub env: BTreeMap<String, String>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Set of children that are still running.
///
/// Cloning shares the same set, so a signal watcher can hold a handle while
/// the runner keeps spawning.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    children: Arc<Mutex<HashMap<u32, Child>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        // A poisoned lock only means another thread panicked mid-poll; the map
        // itself is still consistent.
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, child: Child) -> u32 {
        let pid = child.id();
        self.lock().insert(pid, child);
        log::debug!("Tracking child process {pid}");
        pid
    }

    /// Polls the child once. Returns its status and forgets it when it has
    /// exited, `Ok(None)` while it is still running.
    fn try_wait(&self, pid: u32) -> std::io::Result<Option<ExitStatus>> {
        let mut children = self.lock();
        let Some(child) = children.get_mut(&pid) else {
            return Err(std::io::Error::other("process is no longer tracked"));
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                children.remove(&pid);
                log::debug!("Child process {pid} exited with {status}");
                Ok(Some(status))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                children.remove(&pid);
                Err(e)
            }
        }
    }

    /// Number of children currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every tracked child. Failures are logged and otherwise ignored.
    ///
    /// Children are asked to terminate first (SIGTERM on Unix) so tools like
    /// `go run` and `pnpm dev` can stop their own children; anything still
    /// running after a grace period is force-killed.
    ///
    /// Stopped children stay tracked until their `run` call observes the exit,
    /// so the caller still reports the failure.
    pub fn kill_all(&self) {
        self.for_each_running(|pid, child| {
            if let Err(e) = terminate(child) {
                log::warn!("Failed to terminate child process {pid}: {e}");
            }
        });

        let deadline = Instant::now() + KILL_GRACE;
        while Instant::now() < deadline && self.any_running() {
            thread::sleep(POLL_INTERVAL);
        }

        self.for_each_running(|pid, child| {
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill child process {pid}: {e}");
            }
            let _ = child.wait();
        });
    }

    /// Calls `f` for every child that has not exited yet.
    fn for_each_running(&self, mut f: impl FnMut(u32, &mut Child)) {
        let mut children = self.lock();
        for (pid, child) in children.iter_mut() {
            if let Ok(None) = child.try_wait() {
                f(*pid, child);
            }
        }
    }

    fn any_running(&self) -> bool {
        self.lock()
            .values_mut()
            .any(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Installs SIGINT/SIGTERM handlers that kill every tracked child and
    /// then exit with 130 or 143.
    #[cfg(unix)]
    pub fn install_signal_handlers(&self) -> Result<(), ReleaseError> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let registry = self.clone();
        thread::Builder::new()
            .name("signal-watcher".into())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    registry.kill_all();
                    std::process::exit(exit_code_for(signal));
                }
            })?;
        Ok(())
    }

    /// Console interrupts reach the whole process group on this platform, so
    /// the children receive them directly.
    #[cfg(not(unix))]
    pub fn install_signal_handlers(&self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

/// Runs external commands relative to a project root.
#[derive(Debug)]
pub struct CommandRunner {
    root: PathBuf,
    registry: ProcessRegistry,
}

impl CommandRunner {
    /// Creates a runner whose commands default to `root` as working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: ProcessRegistry::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The registry tracking this runner's children.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Spawns `program` with `args` and waits for it to exit.
    ///
    /// Succeeds only on exit code 0. Any other exit code, a terminating
    /// signal, or a failure to start yields [`ReleaseError::CommandFailed`]
    /// naming the command line.
    pub fn run<S: AsRef<str>>(
        &self,
        program: &str,
        args: &[S],
        options: &CommandOptions,
    ) -> Result<(), ReleaseError> {
        let command_line = command_line(program, args);
        let cwd = options.cwd.as_deref().unwrap_or(&self.root);

        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(AsRef::as_ref))
            .current_dir(cwd)
            .envs(&options.env);

        log::debug!("$ {command_line} (cwd: {})", cwd.display());
        if !options.env.is_empty() {
            log::debug!("  env: {:?}", options.env);
        }

        let child = cmd.spawn().map_err(|e| ReleaseError::CommandFailed {
            command: command_line.clone(),
            failure: CommandFailure::Spawn(e.to_string()),
        })?;
        let pid = self.registry.insert(child);

        let status = loop {
            match self.registry.try_wait(pid) {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(ReleaseError::CommandFailed {
                        command: command_line,
                        failure: CommandFailure::Spawn(e.to_string()),
                    });
                }
            }
        };

        if status.success() {
            return Ok(());
        }
        Err(ReleaseError::CommandFailed {
            command: command_line,
            failure: failure_from_status(status),
        })
    }
}

impl Drop for CommandRunner {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            self.registry.kill_all();
        }
    }
}

/// Exit code used after the process receives `signal`: 130 for SIGINT, 143
/// for SIGTERM, `128 + signal` otherwise.
#[cfg(unix)]
pub fn exit_code_for(signal: i32) -> i32 {
    match signal {
        signal_hook::consts::SIGINT => EXIT_INTERRUPTED,
        signal_hook::consts::SIGTERM => EXIT_TERMINATED,
        other => 128 + other,
    }
}

/// Asks `child` to exit.
#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(child.id()).map_err(std::io::Error::other)?;
    // SAFETY: `pid` is a child that has not been reaped, so it cannot have
    // been reused by another process.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg.as_ref());
    }
    line
}

#[cfg(unix)]
fn failure_from_status(status: ExitStatus) -> CommandFailure {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => CommandFailure::ExitCode(code),
        (None, Some(signal)) => CommandFailure::Signal(signal),
        (None, None) => CommandFailure::ExitCode(-1),
    }
}

#[cfg(not(unix))]
fn failure_from_status(status: ExitStatus) -> CommandFailure {
    CommandFailure::ExitCode(status.code().unwrap_or(-1))
}

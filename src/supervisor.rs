use anyhow::{Context, Result};
use log::{error, info, warn};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

const REAP_INTERVAL: Duration = Duration::from_millis(5);

/// How long the graceful phase of [ProcessSupervisor::shutdown] may take:
/// `retries` polls, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            retries: 10,
            interval: Duration::from_millis(50),
        }
    }
}

/// Parent-side endpoints of a freshly spawned child.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: u32,
    pub stdout: UnixStream,
    pub stderr: UnixStream,
}

#[derive(Debug)]
struct Tracked {
    child: Child,
    command: String,
    /// Held open so the child doesn't see end of input until shutdown.
    stdin: Option<UnixStream>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Polls made during the graceful phase.
    pub attempts: u32,
    /// Children that exited after the graceful signal.
    pub exited: Vec<u32>,
    /// Children that had to be killed.
    pub killed: Vec<u32>,
}

/// Spawns shell commands with socket-pair stdio and tears them down at exit: SIGTERM
/// first, SIGKILL for whatever is still running once the retry budget runs out.
#[derive(Debug)]
pub struct ProcessSupervisor {
    shell: PathBuf,
    policy: ShutdownPolicy,
    children: Vec<Tracked>,
}

impl ProcessSupervisor {
    pub fn new(shell: impl Into<PathBuf>, policy: ShutdownPolicy) -> Self {
        Self {
            shell: shell.into(),
            policy,
            children: Vec::new(),
        }
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children
            .iter()
            .map(|tracked| tracked.child.id())
            .collect()
    }

    /// Runs `command` through the shell with stdin, stdout and stderr each connected to
    /// a socket pair. The child gets its own process group so signals reach everything
    /// the shell starts.
    pub fn spawn(&mut self, command: &str) -> Result<SpawnedProcess> {
        let (stdin, child_stdin) =
            UnixStream::pair().context("Failed to create stdin socket pair")?;
        let (stdout, child_stdout) =
            UnixStream::pair().context("Failed to create stdout socket pair")?;
        let (stderr, child_stderr) =
            UnixStream::pair().context("Failed to create stderr socket pair")?;

        // The Command owns the child ends; dropping it closes them in this process.
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::from(OwnedFd::from(child_stdin)))
            .stdout(Stdio::from(OwnedFd::from(child_stdout)))
            .stderr(Stdio::from(OwnedFd::from(child_stderr)))
            .process_group(0)
            .spawn()
            .with_context(|| format!("Failed to spawn `{command}`"))?;

        let pid = child.id();
        info!("spawned `{command}` as pid {pid}");
        self.children.push(Tracked {
            child,
            command: command.to_owned(),
            stdin: Some(stdin),
        });
        Ok(SpawnedProcess {
            pid,
            stdout,
            stderr,
        })
    }

    /// Asks every child to quit, polls them for the policy's retry budget, then kills the
    /// ones still running. Every child is untracked afterwards.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.children.is_empty() {
            return report;
        }

        for tracked in &mut self.children {
            tracked.stdin = None;
            if let Err(e) = signal_group(tracked.child.id(), libc::SIGTERM) {
                warn!("could not send SIGTERM to `{}`: {e}", tracked.command);
            }
        }

        for attempt in 1..=self.policy.retries {
            tokio::time::sleep(self.policy.interval).await;
            report.attempts = attempt;
            self.reap(&mut report.exited);
            if self.children.is_empty() {
                return report;
            }
        }

        // With no retries the loop above never polled.
        self.reap(&mut report.exited);
        for mut tracked in std::mem::take(&mut self.children) {
            let pid = tracked.child.id();
            warn!(
                "`{}` (pid {pid}) still running after {} polls, killing it",
                tracked.command, self.policy.retries
            );
            force_kill(&mut tracked.child);
            while !reaped(&mut tracked.child) {
                tokio::time::sleep(REAP_INTERVAL).await;
            }
            report.killed.push(pid);
        }
        report
    }

    /// Drops every child that a non-blocking wait confirms has exited.
    fn reap(&mut self, exited: &mut Vec<u32>) {
        self.children.retain_mut(|tracked| match tracked.child.try_wait() {
            Ok(Some(status)) => {
                info!("`{}` exited: {status}", tracked.command);
                exited.push(tracked.child.id());
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("could not poll `{}`: {e}", tracked.command);
                true
            }
        });
    }
}

impl Drop for ProcessSupervisor {
    // Setup can fail after some children are already running; don't leave them behind.
    fn drop(&mut self) {
        for mut tracked in self.children.drain(..) {
            warn!("killing `{}` during teardown", tracked.command);
            kill(&mut tracked.child);
        }
    }
}

fn kill(child: &mut Child) {
    force_kill(child);
    if let Err(e) = child.wait() {
        error!("could not reap pid {}: {e}", child.id());
    }
}

fn force_kill(child: &mut Child) {
    if let Err(e) = signal_group(child.id(), libc::SIGKILL) {
        warn!("could not kill process group {}: {e}", child.id());
        let _ = child.kill();
    }
}

/// Whether `child` is gone: exited and reaped, or no longer pollable at all.
fn reaped(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(status) => status.is_some(),
        Err(e) => {
            error!("could not reap pid {}: {e}", child.id());
            true
        }
    }
}

/// Signals the whole process group led by `pid`. A group that is already gone is fine.
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = pid as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(-pgid, signal) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::types::{Exit, OutputLine, ProcessEvent, StreamKind};
use crate::{Result, RunnerError};

/// How long buffered output is still drained after the child has exited.
/// Grandchildren that inherited the pipes can keep them open indefinitely.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

const LINE_BUFFER: usize = 256;

// ─── ProcessRunner ────────────────────────────────────────────────────────

/// Spawns one external command per call.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `command_line` in `working_directory` with `env` layered over the
    /// inherited environment.
    ///
    /// The child gets its own process group so that [`ProcessHandle::terminate`]
    /// can reclaim anything it forks (dev servers started by a package manager,
    /// watchers, ...). stdin is closed.
    pub fn spawn(
        command_line: &[String],
        working_directory: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<ProcessHandle> {
        let (program, args) = command_line
            .split_first()
            .ok_or(RunnerError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(working_directory)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(?pid, program = %program, cwd = %working_directory.display(), "spawned");

        let (line_tx, lines) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, StreamKind::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, StreamKind::Stderr, line_tx.clone()));
        }
        drop(line_tx);

        let (exit_tx, exit) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(child, pid, kill_rx, exit_tx));

        Ok(ProcessHandle {
            pid,
            lines,
            lines_open: true,
            exit,
            kill: Some(kill_tx),
            supervisor: Some(supervisor),
        })
    }
}

// ─── ProcessHandle ────────────────────────────────────────────────────────

/// A running child process.
///
/// Output from both pipes is merged into one ordered sequence of tagged
/// lines. The exit status is published exactly once by a background
/// supervisor task that owns the [`Child`]. Dropping the handle closes the
/// kill channel, so a still-running group is killed the same way.
pub struct ProcessHandle {
    pid: Option<u32>,
    lines: mpsc::Receiver<OutputLine>,
    lines_open: bool,
    exit: watch::Receiver<Option<Exit>>,
    kill: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` until the supervisor has reaped the child.
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Exit status if the child has already been reaped.
    pub fn try_exit(&self) -> Option<Exit> {
        *self.exit.borrow()
    }

    /// Next output line or, once both pipes are drained, the exit status.
    ///
    /// Lines always come before the exit event: a line written just before
    /// the process ended is never lost behind its exit. After the exit event
    /// has been returned, every further call returns it again.
    ///
    /// Cancel-safe; suitable for use inside `tokio::select!`.
    pub async fn next_event(&mut self) -> ProcessEvent {
        loop {
            if !self.lines_open {
                return ProcessEvent::Exited(self.wait_exit().await);
            }

            if let Some(exit) = self.try_exit() {
                match tokio::time::timeout(EXIT_DRAIN_GRACE, self.lines.recv()).await {
                    Ok(Some(line)) => return ProcessEvent::Output(line),
                    Ok(None) | Err(_) => {
                        self.lines_open = false;
                        return ProcessEvent::Exited(exit);
                    }
                }
            }

            tokio::select! {
                biased;
                line = self.lines.recv() => match line {
                    Some(line) => return ProcessEvent::Output(line),
                    None => self.lines_open = false,
                },
                changed = self.exit.changed() => {
                    if changed.is_err() && self.exit.borrow().is_none() {
                        // Supervisor vanished without publishing a status.
                        self.lines_open = false;
                        return ProcessEvent::Exited(Exit::UNKNOWN);
                    }
                }
            }
        }
    }

    /// Pop a line that has already been delivered, without waiting.
    pub fn try_next_line(&mut self) -> Option<OutputLine> {
        self.lines.try_recv().ok()
    }

    /// Wait for the child to be reaped.
    pub async fn wait_exit(&mut self) -> Exit {
        loop {
            if let Some(exit) = *self.exit.borrow_and_update() {
                return exit;
            }
            if self.exit.changed().await.is_err() {
                return (*self.exit.borrow()).unwrap_or(Exit::UNKNOWN);
            }
        }
    }

    /// Kill the child and its process group, then wait until it is reaped.
    ///
    /// The group is only signalled while the leader is still unreaped, so a
    /// recycled pid is never hit. After a natural exit this just waits.
    /// Idempotent.
    pub async fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            // Err means the supervisor already finished on its own.
            let _ = kill.send(());
        }
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await {
                warn!(pid = ?self.pid, error = %e, "process supervisor failed");
            }
        }
    }
}

// ─── Background tasks ─────────────────────────────────────────────────────

async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<Exit>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Fires on an explicit kill and when the handle is dropped. The
        // leader is not reaped yet, so its pid still names our group.
        _ = kill_rx => {
            kill_group(pid);
            if let Err(e) = child.start_kill() {
                debug!(?pid, error = %e, "start_kill failed");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => Exit::from_status(status),
        Err(e) => {
            warn!(?pid, error = %e, "wait failed");
            Exit::UNKNOWN
        }
    };
    debug!(?pid, code = ?exit.code, signal = ?exit.signal, "exited");
    let _ = exit_tx.send(Some(exit));
}

async fn forward_lines<R>(reader: R, stream: StreamKind, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(OutputLine { stream, text }).await.is_err() {
                    break; // Receiver dropped
                }
            }
            Err(e) => {
                debug!(stream = stream.as_str(), error = %e, "read failed");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    #[allow(clippy::cast_possible_wrap)]
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "failed to signal process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

// ─── Tests ────────────────────────────────────────────────────────────────

//! Runs one validated action against the container runtime.
//!
//! Runtime calls are `Command::new(program).args(argv)`: no shell, no string
//! splitting. Every call is bounded by the timeout for its idempotency class.

use crate::catalog::DEFAULT_APP_MESSAGE;
use crate::config::Config;
use crate::error::{DispatchError, Result};
use crate::scaffold::{self, FlaskTemplate, ScaffoldTemplate};
use crate::types::{ExecOutcome, ExecutionResult, IdempotencyClass, ParamValue};
use crate::validator::{Plan, ValidatedAction};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Captured output is capped to this many bytes, keeping the tail.
pub const MAX_OUTPUT: usize = 10 * 1024;

/// Runs exactly one validated action per call.
pub trait Executor: Send + Sync {
    fn execute(&self, action: &ValidatedAction) -> ExecutionResult;
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub mutating: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            mutating: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    pub fn for_class(&self, class: IdempotencyClass) -> Duration {
        if class.is_mutating() {
            self.mutating
        } else {
            self.read
        }
    }
}

// ---------------------------------------------------------------------------
// RuntimeExecutor
// ---------------------------------------------------------------------------

pub struct RuntimeExecutor {
    program: String,
    workdir: PathBuf,
    scaffold_dir: PathBuf,
    timeouts: Timeouts,
    template: Box<dyn ScaffoldTemplate>,
}

impl RuntimeExecutor {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            program: program.into(),
            scaffold_dir: workdir.clone(),
            workdir,
            timeouts: Timeouts::default(),
            template: Box::new(FlaskTemplate),
        }
    }

    pub fn from_config(config: &Config, root: &Path) -> Self {
        Self::new(config.runtime.program.clone(), config.workdir(root))
            .with_timeouts(Timeouts {
                read: config.timeouts.read(),
                mutating: config.timeouts.mutating(),
            })
            .with_scaffold(config.scaffold_dir(root), Box::new(FlaskTemplate))
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_scaffold(mut self, dir: PathBuf, template: Box<dyn ScaffoldTemplate>) -> Self {
        self.scaffold_dir = dir;
        self.template = template;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn write_scaffold(&self, action: &ValidatedAction) -> ExecutionResult {
        let start = Instant::now();
        let message = action
            .value("message")
            .and_then(ParamValue::as_str)
            .unwrap_or(DEFAULT_APP_MESSAGE);
        let port = action
            .value("port")
            .and_then(ParamValue::as_int)
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or(5000);

        let files = self.template.render(message, port);
        let (outcome, stdout, stderr) = match scaffold::write_files(&self.scaffold_dir, &files) {
            Ok(written) => {
                let names: Vec<_> = files.iter().map(|f| f.path.display().to_string()).collect();
                debug!(count = written.len(), template = self.template.name(), "scaffold written");
                (
                    ExecOutcome::Exited { code: 0 },
                    format!(
                        "created {} in {}",
                        names.join(", "),
                        self.scaffold_dir.display()
                    ),
                    String::new(),
                )
            }
            Err(e) => (ExecOutcome::Exited { code: 1 }, String::new(), e.to_string()),
        };

        ExecutionResult {
            outcome,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
            attempts: 1,
        }
    }
}

impl Executor for RuntimeExecutor {
    fn execute(&self, action: &ValidatedAction) -> ExecutionResult {
        let argv = match action.plan() {
            Plan::Scaffold => return self.write_scaffold(action),
            Plan::Runtime { argv } => argv,
        };

        // one budget per call: a retry only gets what the first attempt left
        let limit = self.timeouts.for_class(action.class());
        let start = Instant::now();
        let first = run_argv(&self.program, argv, &self.workdir, limit);
        if !action.class().auto_retry() || !is_transient(&first) {
            return first;
        }
        let remaining = limit.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return first;
        }

        warn!(
            action = action.name(),
            outcome = ?first.outcome,
            remaining_ms = remaining.as_millis() as u64,
            "transient failure on safe-retry action, retrying once"
        );
        let mut second = run_argv(&self.program, argv, &self.workdir, remaining);
        second.attempts = first.attempts + 1;
        second.duration_ms += first.duration_ms;
        second
    }
}

/// A non-zero exit is worth one more try. A timeout already spent the
/// whole budget, and a missing runtime will still be missing.
fn is_transient(result: &ExecutionResult) -> bool {
    matches!(result.outcome, ExecOutcome::Exited { code } if code != 0)
}

/// Resolve the runtime binary on PATH.
pub fn detect_runtime(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|e| DispatchError::RuntimeUnavailable(format!("{program}: {e}")))
}

// ---------------------------------------------------------------------------
// Subprocess
// ---------------------------------------------------------------------------

/// Run `program argv...` in `cwd`, killing it once `limit` elapses.
///
/// Stdout and stderr are drained on dedicated threads so a chatty child
/// cannot fill a pipe and stall; a waiter thread plus `recv_timeout`
/// bounds the wait without polling. Output read before a timeout is kept.
pub fn run_argv(program: &str, argv: &[String], cwd: &Path, limit: Duration) -> ExecutionResult {
    let start = Instant::now();
    debug!(program, ?argv, "spawning runtime");

    let spawned = Command::new(program)
        .args(argv)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(c) => c,
        Err(e) => {
            return ExecutionResult {
                outcome: ExecOutcome::RuntimeUnavailable {
                    reason: format!("failed to spawn '{program}': {e}"),
                },
                stdout: String::new(),
                stderr: e.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
                attempts: 1,
            };
        }
    };

    let child_pid = child.id();
    let stdout = Drain::spawn(child.stdout.take());
    let stderr = Drain::spawn(child.stderr.take());

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait());
    });

    let wait_result = match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(_) => {
            kill_process(child_pid);
            let limit_ms = limit.as_millis() as u64;
            warn!(program, pid = child_pid, limit_ms, "runtime call timed out");

            // A grandchild may still hold the pipes open; take what has
            // arrived once the grace period is up.
            let deadline = Instant::now() + OUTPUT_GRACE;
            let stdout = stdout.collect(deadline);
            let mut stderr = stderr.collect(deadline);
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("timed out after {limit_ms}ms"));
            return ExecutionResult {
                outcome: ExecOutcome::Timeout { limit_ms },
                stdout: cap_tail(&stdout),
                stderr: cap_tail(&stderr),
                duration_ms: start.elapsed().as_millis() as u64,
                attempts: 1,
            };
        }
    };

    let deadline = Instant::now() + OUTPUT_GRACE;
    let stdout = stdout.collect(deadline);
    let stderr = stderr.collect(deadline);
    let duration_ms = start.elapsed().as_millis() as u64;

    match wait_result {
        Ok(status) => ExecutionResult {
            // killed by a signal: no exit code
            outcome: ExecOutcome::Exited {
                code: status.code().unwrap_or(-1),
            },
            stdout: cap_tail(&stdout),
            stderr: cap_tail(&stderr),
            duration_ms,
            attempts: 1,
        },
        Err(e) => ExecutionResult {
            outcome: ExecOutcome::Exited { code: -1 },
            stdout: cap_tail(&stdout),
            stderr: format!("wait failed: {e}"),
            duration_ms,
            attempts: 1,
        },
    }
}

/// How long readers get to reach EOF once the child has exited or been killed.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// One pipe being read on its own thread into a shared buffer.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        std::thread::spawn(move || {
            if let Some(mut r) = pipe {
                let mut chunk = [0u8; 4096];
                loop {
                    match r.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                            buf.extend_from_slice(&chunk[..n]);
                            // only the tail is ever reported
                            if buf.len() > 2 * MAX_OUTPUT {
                                let excess = buf.len() - MAX_OUTPUT;
                                buf.drain(..excess);
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Wait for EOF until `deadline`, then take whatever has been read.
    fn collect(self, deadline: Instant) -> String {
        let _ = self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()));
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Keep the last `MAX_OUTPUT` bytes, cut on a char boundary.
fn cap_tail(s: &str) -> String {
    if s.len() <= MAX_OUTPUT {
        return s.to_string();
    }
    let mut cut = s.len() - MAX_OUTPUT;
    while !s.is_char_boundary(cut) {
        cut += 1;
    }
    s[cut..].to_string()
}

/// Terminate a process by PID. Best-effort; errors are silently ignored.
#[cfg(unix)]
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(windows)]
fn kill_process(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use crate::error::ExecutionError;
use crate::types::ExecutionResult;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// How long to wait for the output pipes to close once the process is gone.
/// A descendant that escaped the process group can hold them open forever.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Runs a command string to completion or timeout.
pub trait CommandRunner {
    fn run(&self, command: &str, timeout: Duration) -> ExecutionResult;
}

/// Runs commands through the host shell (`sh -c` / `cmd /C`).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    flag: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }

    fn spawn(&self, command: &str) -> io::Result<Child> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so a timeout can take down everything the shell started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd.spawn()
    }

    fn map_spawn_error(&self, err: io::Error) -> ExecutionError {
        match err.kind() {
            io::ErrorKind::NotFound => ExecutionError::SpawnFailed {
                program: self.shell.clone(),
                detail: err.to_string(),
            },
            io::ErrorKind::PermissionDenied => ExecutionError::PermissionDenied(err.to_string()),
            _ => ExecutionError::Other(err.to_string()),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, timeout: Duration) -> ExecutionResult {
        if command.trim().is_empty() {
            return ExecutionResult::failed(command, ExecutionError::EmptyCommand);
        }

        let started = Instant::now();
        let mut child = match self.spawn(command) {
            Ok(child) => child,
            Err(err) => {
                warn!(command, error = %err, "failed to spawn shell");
                return ExecutionResult::failed(command, self.map_spawn_error(err));
            }
        };
        debug!(command, pid = child.id(), "spawned");

        let stdout = child.stdout.take().map(OutputReader::spawn);
        let stderr = child.stderr.take().map(OutputReader::spawn);

        let waited = match child.wait_timeout(timeout) {
            Ok(status) => status,
            Err(err) => {
                terminate(&mut child);
                return ExecutionResult::failed(command, ExecutionError::Other(err.to_string()));
            }
        };

        match waited {
            Some(status) => {
                // Anything the shell left running in the background would keep
                // the pipes open.
                kill_group(child.id());
                let deadline = Instant::now() + OUTPUT_GRACE;
                let stdout = collect(stdout, deadline);
                let stderr = collect(stderr, deadline);
                let exit_code = status.code().unwrap_or(-1);
                info!(
                    command,
                    exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "command finished"
                );
                if status.code().is_none() {
                    // Killed by a signal before producing an exit code.
                    let mut result = ExecutionResult::failed(
                        command,
                        ExecutionError::Other(format!("terminated abnormally ({status})")),
                    );
                    result.stdout = stdout.trim().to_string();
                    result.stderr = stderr.trim().to_string();
                    return result;
                }
                ExecutionResult::exited(command, exit_code, &stdout, &stderr)
            }
            None => {
                warn!(command, timeout_secs = timeout.as_secs(), "command timed out, killing");
                terminate(&mut child);
                let deadline = Instant::now() + OUTPUT_GRACE;
                let mut result =
                    ExecutionResult::failed(command, ExecutionError::TimedOut(timeout.as_secs()));
                result.stdout = collect(stdout, deadline).trim().to_string();
                result.stderr = collect(stderr, deadline).trim().to_string();
                result
            }
        }
    }
}

/// Drains a pipe on its own thread into a shared buffer, so whatever was
/// read so far is available even if the pipe never reaches EOF.
struct OutputReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl OutputReader {
    fn spawn<R: Read + Send + 'static>(mut reader: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = done_tx.send(());
        });
        Self { buf, done }
    }

    /// Wait for EOF until `deadline`, then take what has been read. A reader
    /// still blocked after the deadline is abandoned.
    fn finish(self, deadline: Instant) -> String {
        let wait = deadline.saturating_duration_since(Instant::now());
        if self.done.recv_timeout(wait).is_err() {
            debug!("output pipe still held open, abandoning its reader");
        }
        let bytes = self.buf.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn collect(reader: Option<OutputReader>, deadline: Instant) -> String {
    reader.map(|r| r.finish(deadline)).unwrap_or_default()
}

/// Kill the child and everything in its process group, then reap it.
fn terminate(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    if let Ok(pgid) = libc::pid_t::try_from(pid) {
        // SAFETY: plain syscall on the process group created in `spawn`.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

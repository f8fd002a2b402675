//! Shell command execution with timeout and cancellation.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use stack_schema::Cancellation;
use tracing::debug;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run a shell command and return its trimmed stdout.
///
/// The command runs under the platform shell. A non-zero exit status is a
/// fatal error carrying the captured stderr. The timeout and the
/// cancellation token are both checked while the child runs; either one
/// kills the process. Stdout and stderr are drained on background threads
/// so a child producing more than the pipe buffer cannot stall.
pub fn run_shell(
    command: &str,
    timeout: Duration,
    cancel: &Cancellation,
) -> Result<String> {
    debug!(command, ?timeout, "executing shell command");

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::CommandTimeout(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = collect(stdout_reader);
    let stderr = collect(stderr_reader);

    if !status.success() {
        return Err(Error::CommandFailed {
            code: status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&stdout).trim().to_string())
}

/// Consume a child pipe to completion on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

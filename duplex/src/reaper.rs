//! Reaping the one child the parent forked.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use serde::Serialize;

use crate::error::{DuplexError, Result};

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChildStatus {
    Exited { code: i32 },
    Signaled { signal: i32 },
}

impl ChildStatus {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

/// A reaped child: the pid `waitpid` reported and its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub pid: Pid,
    pub status: ChildStatus,
}

/// Block until `child` terminates. Only that pid is waited for.
pub fn wait_for(child: Pid) -> Result<ChildExit> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(pid, code)) => {
                return Ok(ChildExit {
                    pid,
                    status: ChildStatus::Exited { code },
                });
            }
            Ok(WaitStatus::Signaled(pid, signal, _core_dumped)) => {
                return Ok(ChildExit {
                    pid,
                    status: ChildStatus::Signaled {
                        signal: signal as i32,
                    },
                });
            }
            // Stop/continue notifications are not terminations.
            Ok(other) => tracing::trace!(?other, "Ignoring non-terminal wait status"),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(DuplexError::Wait(e)),
        }
    }
}

/// Wait for `child` on the blocking pool, killing it if `deadline` passes.
///
/// A killed child is still reaped before the error is returned, so no zombie
/// is left behind either way.
pub async fn reap(child: Pid, deadline: Option<Duration>) -> Result<ChildExit> {
    let mut wait = tokio::task::spawn_blocking(move || wait_for(child));

    let exit = match deadline {
        None => wait.await??,
        Some(limit) => match tokio::time::timeout(limit, &mut wait).await {
            Ok(joined) => joined??,
            Err(_) => {
                tracing::warn!(
                    child_pid = child.as_raw(),
                    after = ?limit,
                    "Child did not exit, killing"
                );
                match kill(child, Signal::SIGKILL) {
                    // Already gone between the timeout and the kill.
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => return Err(DuplexError::Wait(e)),
                }
                let exit = wait.await??;
                tracing::debug!(
                    child_pid = exit.pid.as_raw(),
                    status = ?exit.status,
                    "Reaped killed child"
                );
                return Err(DuplexError::ChildUnresponsive {
                    pid: child,
                    after: limit,
                });
            }
        },
    };

    tracing::info!(
        child_pid = exit.pid.as_raw(),
        status = ?exit.status,
        "Reaped child"
    );
    Ok(exit)
}

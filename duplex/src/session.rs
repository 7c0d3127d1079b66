//! One duplex session, from pipe creation to reaping the child.
//!
//! Flow:
//! 1. Open both pipes (no process split yet)
//! 2. Fork; each process learns its role
//! 3. Each role keeps its endpoint and binds it onto stdin/stdout
//! 4. Each role starts its own current-thread runtime and runs the handshake
//! 5. The parent reaps the child
//!
//! The runtime is only built after the fork: forking a process that already
//! runs runtime threads would leave the child with a runtime missing its
//! workers.

use std::io;

use nix::unistd::Pid;
use tracing::Instrument;

use crate::bridge::handshake::{Handshake, HandshakeReport};
use crate::channel::DuplexChannel;
use crate::config::DuplexConfig;
use crate::error::{DuplexError, Result};
use crate::fd_redirect::{BoundStdio, redirect_stdio};
use crate::reaper::{ChildExit, reap};
use crate::split::{Role, Split, split};

/// What one process got out of the session.
#[derive(Debug)]
pub struct Outcome {
    pub report: HandshakeReport,
    /// Set in the parent only.
    pub child: Option<ChildExit>,
}

impl Outcome {
    pub fn role(&self) -> Role {
        self.report.role
    }
}

/// Run a full session. Returns in both the parent and the child.
///
/// # Safety
///
/// The process must be single-threaded when this is called (see
/// [`split`](crate::split::split)). Tracing may be initialized beforehand;
/// async runtimes may not.
pub unsafe fn run(config: DuplexConfig) -> Result<Outcome> {
    config.validate()?;

    let channel = DuplexChannel::open()?;

    // Safety: upheld by the caller.
    let split = unsafe { split() }?;
    let role = split.role();

    let endpoint = channel.into_endpoint(role);
    let stdio = redirect_stdio(endpoint)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DuplexError::Runtime)?;

    let span = tracing::info_span!("duplex", %role, pid = std::process::id());
    runtime.block_on(run_role(split, stdio, &config).instrument(span))
}

async fn run_role(split: Split, stdio: BoundStdio, config: &DuplexConfig) -> Result<Outcome> {
    let role = split.role();
    let handshake = Handshake::new(role, config);

    // The channel ends are closed when the exchange returns, so a child still
    // blocked on a read sees end-of-stream before the parent starts waiting.
    let result = exchange(&handshake, stdio).await;

    if let Ok(report) = &result
        && let Err(e) = report.write_diagnostic(&mut io::stderr())
    {
        tracing::warn!(error = %e, "Failed to write diagnostic line");
    }

    let child = match split {
        Split::Parent { child } => {
            if let Err(e) = &result {
                tracing::debug!(
                    child_pid = child.as_raw(),
                    error = %e,
                    "Handshake failed, still reaping child"
                );
            }
            Some(reap_child(child, config).await)
        }
        Split::Child => None,
    };

    // A handshake failure is the more useful error to report.
    let report = result?;
    Ok(Outcome {
        report,
        child: child.transpose()?,
    })
}

async fn exchange(handshake: &Handshake, stdio: BoundStdio) -> Result<HandshakeReport> {
    let role = handshake.role();
    let (input, output) = stdio
        .into_async()
        .map_err(|e| DuplexError::handshake(role, e.into()))?;
    handshake
        .exchange(input, output)
        .await
        .map_err(|e| DuplexError::handshake(role, e))
}

async fn reap_child(child: Pid, config: &DuplexConfig) -> Result<ChildExit> {
    let exit = reap(child, config.timeout).await?;
    if !exit.status.success() {
        tracing::warn!(
            child_pid = exit.pid.as_raw(),
            status = ?exit.status,
            "Child exited unsuccessfully"
        );
    }
    Ok(exit)
}

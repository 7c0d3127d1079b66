//! Error types for a duplex session.

use std::io;
use std::time::Duration;

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use crate::bridge::handshake::HandshakeError;
use crate::config::ConfigError;
use crate::fd_redirect::StdSlot;
use crate::split::Role;

/// Everything that can end a duplex session early.
///
/// Pipe, fork and remap failures happen before any byte crosses the channel
/// and leave no partial channel behind.
#[derive(Debug, Error)]
pub enum DuplexError {
    #[error("pipe: {0}")]
    Pipe(#[source] Errno),

    #[error("fork: {0}")]
    Fork(#[source] Errno),

    /// Rebinding a channel end onto a standard slot failed. Later I/O would
    /// target the wrong descriptor, so the process must stop.
    #[error("dup2 onto {slot}: {source}")]
    Remap {
        slot: StdSlot,
        #[source]
        source: Errno,
    },

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("{role} handshake failed: {source}")]
    Handshake {
        role: Role,
        #[source]
        source: HandshakeError,
    },

    #[error("wait: {0}")]
    Wait(#[source] Errno),

    #[error("reaper task failed: {0}")]
    Reaper(#[from] tokio::task::JoinError),

    #[error("child {pid} did not exit within {after:?}, killed")]
    ChildUnresponsive { pid: Pid, after: Duration },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DuplexError {
    pub fn handshake(role: Role, source: HandshakeError) -> Self {
        Self::Handshake { role, source }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, DuplexError>;

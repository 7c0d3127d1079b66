//! Process splitting: one process becomes a parent and a child.

use std::fmt;

use nix::unistd::{ForkResult, Pid, fork};
use serde::Serialize;

use crate::error::{DuplexError, Result};

/// Which side of the channel this process is. Fixed once the split happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Child => "child",
        }
    }

    /// Capitalized name used at the start of diagnostic lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Parent => "Parent",
            Self::Child => "Child",
        }
    }

    pub fn peer(&self) -> Role {
        match self {
            Self::Parent => Self::Child,
            Self::Child => Self::Parent,
        }
    }

    /// Default greeting line this role sends.
    pub fn greeting(&self) -> String {
        format!("Hello from {}", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`split`] as seen by one of the two processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Parent { child: Pid },
    Child,
}

impl Split {
    pub fn role(&self) -> Role {
        match self {
            Self::Parent { .. } => Role::Parent,
            Self::Child => Role::Child,
        }
    }

    pub fn child_pid(&self) -> Option<Pid> {
        match self {
            Self::Parent { child } => Some(*child),
            Self::Child => None,
        }
    }
}

/// Duplicate the calling process.
///
/// The caller continues as [`Split::Parent`], the copy as [`Split::Child`].
/// Both inherit every open descriptor, so the channel must already exist.
///
/// # Safety
///
/// The process must be single-threaded when this is called: the child only
/// inherits the calling thread, and any lock held by another thread stays
/// locked forever in the child. Start async runtimes after the split.
pub unsafe fn split() -> Result<Split> {
    // Safety: upheld by the caller.
    match unsafe { fork() }.map_err(DuplexError::Fork)? {
        ForkResult::Parent { child } => {
            tracing::info!(child_pid = child.as_raw(), "Forked child");
            Ok(Split::Parent { child })
        }
        ForkResult::Child => {
            tracing::debug!(pid = std::process::id(), "Running as child");
            Ok(Split::Child)
        }
    }
}

//! Standard stream redirection onto the channel.
//!
//! After the split each process owns an [`Endpoint`]. Its input end is
//! rebound onto the process's standard input slot (fd 0) and its output end
//! onto standard output (fd 1), then the original descriptors are released.
//! From then on anything the process reads from stdin comes from the peer and
//! anything it writes to stdout goes to the peer.
//!
//! ## Safety contracts
//!
//! All `unsafe` blocks in this module rely on these guarantees:
//! 1. Called right after the split, before the async runtime or any other
//!    thread exists, so nothing else is touching the slot descriptors
//! 2. The slot descriptors are open when rebound (the OS opens 0/1/2 at
//!    startup; tests pass high slots they opened themselves)
//! 3. Ownership of a slot moves into [`BoundStdio`] exactly once, so each slot
//!    is closed at most once
//!
//! Cannot use Miri: this code makes actual syscalls (dup/dup2).

use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::unistd::{dup, dup2};
use tokio::net::unix::pipe;

use crate::channel::Endpoint;
use crate::error::{DuplexError, Result};
use crate::split::Role;

pub const STDIN_FD: RawFd = 0;
pub const STDOUT_FD: RawFd = 1;

/// Which standard slot a rebind targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdSlot {
    Input,
    Output,
}

impl fmt::Display for StdSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("stdin"),
            Self::Output => f.write_str("stdout"),
        }
    }
}

/// Descriptor numbers the channel ends get bound onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioSlots {
    pub input: RawFd,
    pub output: RawFd,
}

impl Default for StdioSlots {
    fn default() -> Self {
        Self::standard()
    }
}

impl StdioSlots {
    /// The process's real stdin and stdout.
    pub const fn standard() -> Self {
        Self {
            input: STDIN_FD,
            output: STDOUT_FD,
        }
    }

    fn contains(&self, fd: RawFd) -> bool {
        fd == self.input || fd == self.output
    }
}

/// A role's channel ends after they were bound onto the stdio slots.
///
/// Owns the two slot descriptors and nothing else.
#[derive(Debug)]
pub struct BoundStdio {
    role: Role,
    input: OwnedFd,
    output: OwnedFd,
}

impl BoundStdio {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn input(&self) -> BorrowedFd<'_> {
        self.input.as_fd()
    }

    pub fn output(&self) -> BorrowedFd<'_> {
        self.output.as_fd()
    }

    /// Returns `(input, output)`.
    pub fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.input, self.output)
    }

    /// Register both slots with the tokio reactor.
    ///
    /// Switches the descriptors to non-blocking mode. Must be called from
    /// within a runtime.
    pub fn into_async(self) -> io::Result<(pipe::Receiver, pipe::Sender)> {
        let rx = pipe::Receiver::from_file(File::from(self.input))?;
        let tx = pipe::Sender::from_file(File::from(self.output))?;
        Ok((rx, tx))
    }
}

/// Bind `endpoint` onto the process's standard input and output.
pub fn redirect_stdio(endpoint: Endpoint) -> Result<BoundStdio> {
    bind_slots(endpoint, StdioSlots::standard())
}

/// Bind `endpoint` onto `slots`, then release the original descriptors.
///
/// On error the process must not continue talking over the channel: some
/// slot may still refer to whatever it referred to before.
pub fn bind_slots(endpoint: Endpoint, slots: StdioSlots) -> Result<BoundStdio> {
    let (role, input, output) = endpoint.into_parts();

    tracing::trace!(
        %role,
        input = input.as_raw_fd(),
        output = output.as_raw_fd(),
        ?slots,
        "Binding channel ends onto stdio slots"
    );

    // An end sitting on a slot number would be clobbered by the other rebind,
    // or closed when the originals are released.
    let input = move_off_slots(input, &slots, StdSlot::Input)?;
    let output = move_off_slots(output, &slots, StdSlot::Output)?;

    let bound_input = rebind(&input, slots.input, StdSlot::Input)?;
    let bound_output = rebind(&output, slots.output, StdSlot::Output)?;

    // Both ends now live on the slots, the originals are surplus.
    drop(input);
    drop(output);

    tracing::debug!(
        %role,
        stdin = slots.input,
        stdout = slots.output,
        "Stdio redirected onto channel"
    );

    Ok(BoundStdio {
        role,
        input: bound_input,
        output: bound_output,
    })
}

fn move_off_slots(fd: OwnedFd, slots: &StdioSlots, which: StdSlot) -> Result<OwnedFd> {
    let mut fd = fd;
    // dup returns the lowest free number, which may be the other slot, so
    // keep the copies alive until one lands elsewhere.
    let mut parked = Vec::new();
    while slots.contains(fd.as_raw_fd()) {
        let moved = dup(&fd).map_err(|source| DuplexError::Remap {
            slot: which,
            source,
        })?;
        tracing::trace!(
            from = fd.as_raw_fd(),
            to = moved.as_raw_fd(),
            "Moved end off slot"
        );
        parked.push(std::mem::replace(&mut fd, moved));
    }
    Ok(fd)
}

fn rebind(end: &OwnedFd, slot: RawFd, which: StdSlot) -> Result<OwnedFd> {
    // Safety: the slot is open (contract 2) and nothing else owns it (contract 1).
    let mut target = unsafe { OwnedFd::from_raw_fd(slot) };
    if let Err(source) = dup2(end, &mut target) {
        // The slot still holds its previous descriptor, which we never owned.
        std::mem::forget(target);
        return Err(DuplexError::Remap {
            slot: which,
            source,
        });
    }
    Ok(target)
}

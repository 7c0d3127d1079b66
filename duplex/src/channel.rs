//! Duplex channel construction.
//!
//! Two unidirectional pipes make up one bidirectional channel:
//!
//! - **pipe A** (parent → child): the parent writes, the child reads
//! - **pipe B** (child → parent): the child writes, the parent reads
//!
//! Both pipes must exist before the process splits so that each side inherits
//! all four ends. Right after the split each side calls
//! [`DuplexChannel::into_endpoint`], which keeps the two ends addressed to its
//! role and closes the other two. A writer's copy left open in the wrong
//! process would keep the reader from ever seeing end-of-stream.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::unistd::pipe;

use crate::error::{DuplexError, Result};
use crate::split::Role;

/// Which way bytes flow through a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ParentToChild,
    ChildToParent,
}

/// One unidirectional kernel pipe.
#[derive(Debug)]
pub struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    pub fn open(direction: Direction) -> Result<Self> {
        let (read, write) = pipe().map_err(DuplexError::Pipe)?;
        tracing::trace!(
            ?direction,
            read = read.as_raw_fd(),
            write = write.as_raw_fd(),
            "Created pipe"
        );
        Ok(Self { read, write })
    }
}

/// Raw descriptor numbers of the four channel ends, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDescriptors {
    pub child_read: RawFd,
    pub child_write: RawFd,
    pub parent_write: RawFd,
    pub parent_read: RawFd,
}

/// Both pipes of the channel, before any end has been handed to a role.
#[derive(Debug)]
pub struct DuplexChannel {
    to_child: Pipe,
    to_parent: Pipe,
}

impl DuplexChannel {
    /// Create pipe A then pipe B. If the second pipe fails the first one is
    /// closed again, so a failure never leaves a half-built channel behind.
    pub fn open() -> Result<Self> {
        let to_child = Pipe::open(Direction::ParentToChild)?;
        let to_parent = Pipe::open(Direction::ChildToParent)?;
        let channel = Self {
            to_child,
            to_parent,
        };
        tracing::debug!(descriptors = ?channel.descriptors(), "Duplex channel ready");
        Ok(channel)
    }

    pub fn descriptors(&self) -> ChannelDescriptors {
        ChannelDescriptors {
            child_read: self.to_child.read.as_raw_fd(),
            child_write: self.to_parent.write.as_raw_fd(),
            parent_write: self.to_child.write.as_raw_fd(),
            parent_read: self.to_parent.read.as_raw_fd(),
        }
    }

    /// Keep the ends addressed to `role` and close the other role's ends.
    pub fn into_endpoint(self, role: Role) -> Endpoint {
        let (parent, child) = self.into_endpoints();
        let (kept, unused) = match role {
            Role::Parent => (parent, child),
            Role::Child => (child, parent),
        };
        tracing::trace!(
            %role,
            other = %role.peer(),
            closed_input = unused.input.as_raw_fd(),
            closed_output = unused.output.as_raw_fd(),
            "Closing ends of the other role"
        );
        drop(unused);
        kept
    }

    /// Split into `(parent, child)` endpoints within the same process.
    pub fn into_endpoints(self) -> (Endpoint, Endpoint) {
        let parent = Endpoint {
            role: Role::Parent,
            input: self.to_parent.read,
            output: self.to_child.write,
        };
        let child = Endpoint {
            role: Role::Child,
            input: self.to_child.read,
            output: self.to_parent.write,
        };
        (parent, child)
    }
}

/// The two channel ends one role owns: what it reads and what it writes.
#[derive(Debug)]
pub struct Endpoint {
    role: Role,
    input: OwnedFd,
    output: OwnedFd,
}

impl Endpoint {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn input(&self) -> BorrowedFd<'_> {
        self.input.as_fd()
    }

    pub fn output(&self) -> BorrowedFd<'_> {
        self.output.as_fd()
    }

    /// Returns `(role, input, output)`.
    pub fn into_parts(self) -> (Role, OwnedFd, OwnedFd) {
        (self.role, self.input, self.output)
    }
}

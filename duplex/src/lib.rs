//! duplex: full-duplex pipe channel between a parent and a forked child.
//!
//! Two pipes are created, the process forks, and each side rebinds its
//! standard input/output onto its ends of the channel before exchanging one
//! greeting line in each direction.

#[cfg(not(unix))]
compile_error!("duplex needs pipe(2), fork(2) and dup2(2); only Unix targets are supported");

pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod fd_redirect;
pub mod logging;
pub mod reaper;
pub mod session;
pub mod split;

pub use bridge::handshake::{Handshake, HandshakeError, HandshakeReport, Received};
pub use channel::{DuplexChannel, Endpoint};
pub use config::{ConfigError, DuplexConfig};
pub use error::DuplexError;
pub use fd_redirect::{BoundStdio, StdioSlots, bind_slots, redirect_stdio};
pub use reaper::{ChildExit, ChildStatus};
pub use session::{Outcome, run};
pub use split::{Role, Split};

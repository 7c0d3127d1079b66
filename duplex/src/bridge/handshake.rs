//! Greet-then-read exchange proving both channel directions work.
//!
//! Each role writes its greeting line to its output, flushes it, then reads
//! one line from its input. The parent's greeting travels over pipe A and the
//! child's over pipe B, so a successful exchange on both sides shows that
//! each direction delivers to the right peer.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::{LineCodec, LineCodecError};
use crate::config::DuplexConfig;
use crate::split::Role;

/// Handshake failures.
///
/// End-of-stream is not one of them: it is reported as [`Received::Closed`].
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The peer sent a line that does not fit the line buffer.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The peer neither wrote a line nor closed the channel in time.
    #[error("peer unresponsive after {0:?}")]
    PeerUnresponsive(Duration),

    #[error("channel i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl HandshakeError {
    fn from_codec(err: LineCodecError) -> Self {
        match err {
            LineCodecError::TooLong(limit) => Self::LineTooLong { limit },
            LineCodecError::Io(e) => Self::Io(e),
        }
    }
}

/// What the read step produced.
///
/// A line holds the payload bytes exactly as read, newline removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "line", rename_all = "snake_case")]
pub enum Received {
    Line(#[serde(serialize_with = "lossy")] Vec<u8>),
    /// The peer's writer closed before a line arrived.
    Closed,
}

impl Received {
    pub fn line(&self) -> Option<&[u8]> {
        match self {
            Self::Line(line) => Some(line),
            Self::Closed => None,
        }
    }
}

fn lossy<S: Serializer>(line: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(line))
}

/// Outcome of one role's handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeReport {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<String>,
    pub received: Received,
}

impl HandshakeReport {
    /// The diagnostic line for this report, without a trailing newline.
    ///
    /// The payload is copied byte for byte.
    pub fn diagnostic(&self) -> Vec<u8> {
        match &self.received {
            Received::Line(line) => {
                let mut out = format!("{} received: ", self.role.label()).into_bytes();
                out.extend_from_slice(line);
                out
            }
            Received::Closed => format!("{}: channel closed by peer", self.role.label()).into_bytes(),
        }
    }

    /// Write the diagnostic line with a single write call.
    ///
    /// Parent and child share the diagnostic stream, so a line split across
    /// several writes could interleave with the peer's.
    pub fn write_diagnostic<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut line = self.diagnostic();
        line.push(b'\n');
        out.write_all(&line)?;
        out.flush()
    }
}

/// One role's side of the exchange.
#[derive(Debug, Clone)]
pub struct Handshake {
    role: Role,
    greeting: Option<String>,
    max_line_length: usize,
    deadline: Option<Duration>,
}

impl Handshake {
    pub fn new(role: Role, config: &DuplexConfig) -> Self {
        Self {
            role,
            greeting: config.greeting(role).map(str::to_owned),
            max_line_length: config.max_line_length(),
            deadline: config.timeout,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Send the greeting on `output`, then read one line from `input`.
    ///
    /// Both streams are dropped on return, which closes them.
    pub async fn exchange<R, W>(
        &self,
        input: R,
        output: W,
    ) -> Result<HandshakeReport, HandshakeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let limit = self.max_line_length;
        let mut writer = FramedWrite::new(output, LineCodec::new(limit));
        let mut reader = FramedRead::new(input, LineCodec::new(limit));

        if let Some(greeting) = &self.greeting {
            tracing::debug!(role = %self.role, %greeting, "Sending greeting");
            // send() flushes, the peer may already be blocked on this line.
            within(self.deadline, writer.send(greeting.as_str()))
                .await?
                .map_err(HandshakeError::from_codec)?;
        } else {
            tracing::debug!(role = %self.role, "No greeting configured, sending nothing");
        }

        tracing::trace!(role = %self.role, "Waiting for peer line");
        let received = match within(self.deadline, reader.next()).await? {
            Some(Ok(line)) => Received::Line(line.to_vec()),
            Some(Err(e)) => return Err(HandshakeError::from_codec(e)),
            None => {
                tracing::info!(role = %self.role, "Channel closed before a line arrived");
                Received::Closed
            }
        };

        let report = HandshakeReport {
            role: self.role,
            sent: self.greeting.clone(),
            received,
        };
        let shown = report.received.line().map(String::from_utf8_lossy);
        tracing::info!(role = %self.role, received = shown.as_deref(), "Handshake complete");
        Ok(report)
    }
}

async fn within<F: Future>(
    deadline: Option<Duration>,
    fut: F,
) -> Result<F::Output, HandshakeError> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HandshakeError::PeerUnresponsive(limit)),
        None => Ok(fut.await),
    }
}

//! Traffic over the duplex channel once stdio is bound to it.
//!
//! # Architecture
//!
//! - **codec**: bounded line framing for AsyncRead/AsyncWrite
//! - **handshake**: greet-then-read exchange run by each role

pub mod codec;
pub mod handshake;

//! Relays: one bidirectional forwarding unit bound to a pair of pipes.
//!
//! - [`plain`]: byte-for-byte pass-through.
//! - [`secure`]: TLS on the socket side.
//!
//! Both expose the same [`Relay`] contract so the adapter can swap them
//! behind a single handle.

pub mod plain;
pub mod secure;

use std::fmt;

use async_trait::async_trait;
use stls_core::io::Exit;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;
use crate::worker::{Receiver, Sender};

pub use plain::PlainRelay;
pub use secure::SecureRelay;

/// Whether bytes on the socket side are encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Plain,
    Tls,
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Security::Plain => f.write_str("plain"),
            Security::Tls => f.write_str("tls"),
        }
    }
}

/// Capability set shared by every relay.
///
/// Lifecycle: constructed → started → stopped. A stopped relay is never
/// restarted; build a new one instead.
#[async_trait]
pub trait Relay: Send + Sync {
    fn security(&self) -> Security;

    /// Outbound worker (application → socket).
    fn sender(&self) -> Sender;

    /// Inbound worker (socket → application), pausable.
    fn receiver(&self) -> Receiver;

    /// Spawn both workers. Returns as soon as they are running.
    fn start(&self) -> Result<(), TransportError> {
        let sender = self.sender().start();
        let receiver = self.receiver().start();
        sender.and(receiver)
    }

    /// Stop both workers and release the pipes. Returns once both workers
    /// have exited; tolerates workers that already ended on their own.
    async fn stop(&self, cancel: &CancellationToken) -> Result<(), TransportError>;
}

/// Log how both directions of a stopped relay ended.
fn log_exits(security: Security, sender: &Exit, receiver: &Exit) {
    debug!(%security, sender = %sender, receiver = %receiver, "relay stopped");
}

//! Plaintext relay (no transformation).

use std::sync::Arc;

use async_trait::async_trait;
use stls_config::RelayConfig;
use stls_core::io::{PauseGate, Pump};
use tokio_util::sync::CancellationToken;
use tracing::info_span;

use super::{Relay, Security, log_exits};
use crate::error::TransportError;
use crate::pipe::{DuplexPipe, LeasedReader, LeasedWriter};
use crate::worker::{Receiver, Sender, Worker};

/// Copies bytes unchanged in both directions.
pub struct PlainRelay {
    sender: Arc<Worker<LeasedReader, LeasedWriter>>,
    receiver: Arc<Worker<LeasedReader, LeasedWriter>>,
    gate: PauseGate,
}

impl PlainRelay {
    /// Lease all four pipe halves and prepare (not start) both workers.
    pub fn new(
        socket: &DuplexPipe,
        app: &DuplexPipe,
        config: &RelayConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let outbound = Pump::new(app.lease_reader()?, socket.lease_writer()?, config.buffer_size);
        let inbound = Pump::new(socket.lease_reader()?, app.lease_writer()?, config.buffer_size);
        let gate = PauseGate::new();

        Ok(Self {
            sender: Arc::new(Worker::new(
                "send",
                outbound,
                cancel,
                None,
                info_span!("relay", security = "plain", direction = "send"),
            )),
            receiver: Arc::new(Worker::new(
                "receive",
                inbound,
                cancel,
                Some(gate.clone()),
                info_span!("relay", security = "plain", direction = "receive"),
            )),
            gate,
        })
    }
}

#[async_trait]
impl Relay for PlainRelay {
    fn security(&self) -> Security {
        Security::Plain
    }

    fn sender(&self) -> Sender {
        Sender::new(self.sender.clone())
    }

    fn receiver(&self) -> Receiver {
        Receiver::new(self.receiver.clone(), self.gate.clone())
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let (sender, receiver) = tokio::join!(self.sender.halt(cancel), self.receiver.halt(cancel));
        // The reclaimed pumps drop here, handing the halves back to the pipes.
        let (sender, _) = sender?;
        let (receiver, _) = receiver?;
        log_exits(Security::Plain, &sender, &receiver);
        Ok(())
    }
}

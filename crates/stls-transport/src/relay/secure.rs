//! TLS relay: the socket side is wrapped in a TLS session.

use std::sync::Arc;

use async_trait::async_trait;
use stls_config::Config;
use stls_core::io::{Exit, PauseGate, Pump, RelayMetrics};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn};

use super::{Relay, Security, log_exits};
use crate::cert::Certificate;
use crate::error::TransportError;
use crate::pipe::{DuplexPipe, LeasedReader, LeasedWriter};
use crate::tls::{StreamWrapper, TlsIo};
use crate::worker::{Receiver, Sender, Worker};

type TlsReader = ReadHalf<Box<dyn TlsIo>>;
type TlsWriter = WriteHalf<Box<dyn TlsIo>>;

/// Encrypt-then-send outbound, receive-then-decrypt inbound.
pub struct SecureRelay {
    sender: Arc<Worker<LeasedReader, TlsWriter>>,
    receiver: Arc<Worker<TlsReader, LeasedWriter>>,
    gate: PauseGate,
    close_notify: bool,
}

impl SecureRelay {
    /// Lease the pipes and run the TLS handshake through `wrapper`.
    ///
    /// The workers are tied to `connection`; the handshake is abandoned when
    /// either `connection` or `cancel` fires. On failure no worker exists and
    /// every lease is released. Bytes the attempt read from the socket cannot
    /// be given back; their count is reported in [`TransportError::Handshake`].
    pub async fn establish(
        socket: &DuplexPipe,
        app: &DuplexPipe,
        wrapper: &dyn StreamWrapper,
        certificate: &Certificate,
        config: &Config,
        connection: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let app_reader = app.lease_reader()?;
        let app_writer = app.lease_writer()?;
        let io = socket.lease()?;
        let consumed = io.read_counter();

        let wrapped = tokio::select! {
            biased;
            _ = connection.cancelled() => Err(TransportError::Cancelled),
            res = wrapper.wrap(io, certificate, cancel) => res,
        };
        let stream = match wrapped {
            Ok(stream) => stream,
            Err(source) => {
                warn!(error = %source, consumed = consumed.get(), "tls handshake failed");
                return Err(TransportError::Handshake {
                    consumed: consumed.get(),
                    source: Box::new(source),
                });
            }
        };
        debug!(
            alpn = ?stream.alpn_protocol().map(String::from_utf8_lossy),
            handshake_bytes = consumed.get(),
            "tls session established"
        );

        let (tls_reader, tls_writer) = tokio::io::split(stream);
        let buffer_size = config.relay.buffer_size;
        let gate = PauseGate::new();

        Ok(Self {
            sender: Arc::new(Worker::new(
                "send",
                Pump::new(app_reader, tls_writer, buffer_size),
                connection,
                None,
                info_span!("relay", security = "tls", direction = "send"),
            )),
            receiver: Arc::new(Worker::new(
                "receive",
                Pump::new(tls_reader, app_writer, buffer_size),
                connection,
                Some(gate.clone()),
                info_span!("relay", security = "tls", direction = "receive"),
            )),
            gate,
            close_notify: config.tls.close_notify,
        })
    }

    /// Hand plaintext still held by the session to the application.
    async fn deliver_buffered(
        &self,
        stream: &mut Box<dyn TlsIo>,
        app: &mut LeasedWriter,
        cancel: &CancellationToken,
    ) {
        let mut pending = Vec::new();
        if let Err(e) = stream.drain_plaintext(&mut pending) {
            debug!(error = %e, "tls session not fully drained");
        }
        if pending.is_empty() {
            return;
        }

        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = async {
                app.write_all(&pending).await?;
                app.flush().await
            } => res.map_err(TransportError::from),
        };
        match delivered {
            Ok(()) => {
                self.receiver.counter().record_transfer(pending.len() as u64);
                debug!(bytes = pending.len(), "delivered buffered tls plaintext");
            }
            Err(e) => warn!(error = %e, bytes = pending.len(), "buffered tls plaintext dropped"),
        }
    }
}

#[async_trait]
impl Relay for SecureRelay {
    fn security(&self) -> Security {
        Security::Tls
    }

    fn sender(&self) -> Sender {
        Sender::new(self.sender.clone())
    }

    fn receiver(&self) -> Receiver {
        Receiver::new(self.receiver.clone(), self.gate.clone())
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let (sender, receiver) = tokio::join!(self.sender.halt(cancel), self.receiver.halt(cancel));
        let (sender_exit, outbound) = sender?;
        let (receiver_exit, inbound) = receiver?;
        log_exits(Security::Tls, &sender_exit, &receiver_exit);

        let (Some((outbound, outbound_released)), Some((inbound, inbound_released))) =
            (outbound, inbound)
        else {
            return Ok(());
        };
        let (app_reader, tls_writer) = outbound.into_parts();
        let (tls_reader, mut app_writer) = inbound.into_parts();
        let mut stream = tls_reader.unsplit(tls_writer);

        // A graceful stop can leave decrypted bytes inside the session.
        if receiver_exit == Exit::Stopped {
            self.deliver_buffered(&mut stream, &mut app_writer, cancel).await;
        }
        if self.close_notify {
            stream.send_close_notify();
            let flushed = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                res = stream.flush() => res.map_err(TransportError::from),
            };
            if let Err(e) = flushed {
                debug!(error = %e, "close_notify not delivered");
            }
        }

        // The TLS session drops here; the pipes go back to their owners.
        drop((stream, app_reader, app_writer));
        drop((outbound_released, inbound_released));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::RustlsWrapper;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_failed_handshake_releases_pipes() {
        let (mut net, socket_local) = duplex(1024);
        let (_app, app_local) = duplex(1024);
        let socket = DuplexPipe::from_stream(socket_local);
        let app_pipe = DuplexPipe::from_stream(app_local);
        let cert = Certificate::self_signed(&["localhost"]).unwrap();
        let cancel = CancellationToken::new();

        net.write_all(b"PBSZ 0\r\n").await.unwrap();
        let res = SecureRelay::establish(
            &socket,
            &app_pipe,
            &RustlsWrapper::default(),
            &cert,
            &Config::default(),
            &cancel,
            &CancellationToken::new(),
        )
        .await;

        match res {
            Err(TransportError::Handshake { consumed, .. }) => assert!(consumed > 0),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("handshake should fail"),
        }
        assert!(!socket.is_leased());
        assert!(!app_pipe.is_leased());
    }
}

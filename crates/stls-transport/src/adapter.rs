//! Secure transport adapter.
//!
//! Owns exactly one active [`Relay`] and swaps it when the protocol layer
//! changes the security of the connection. Every swap follows the same
//! order: stop the active relay, build the next one, publish it, start it.
//! A relay is only published once it exists, and the previous relay has
//! released both pipes before the next one leases them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use stls_config::{Config, validate_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cert::Certificate;
use crate::error::TransportError;
use crate::pipe::DuplexPipe;
use crate::relay::{PlainRelay, Relay, SecureRelay, Security};
use crate::tls::{RustlsWrapper, StreamWrapper};
use crate::worker::{Receiver, Sender};

/// Transport for one control connection that can go secure and back.
///
/// `start`, `stop`, `reset` and `enable_secure` are mutually exclusive: a
/// call that overlaps another fails with [`TransportError::Busy`] and
/// changes nothing. While a transition runs, [`sender`](Self::sender) and
/// [`receiver`](Self::receiver) still hand out the relay being replaced.
///
/// Stream faults end only the affected direction. The adapter does not
/// stop the sibling; the caller inspects the worker state and calls
/// [`stop`](Self::stop) when it decides the connection is dead.
pub struct SecureTransport {
    socket: DuplexPipe,
    app: DuplexPipe,
    wrapper: Arc<dyn StreamWrapper>,
    config: Config,
    connection: CancellationToken,
    active: RwLock<Arc<dyn Relay>>,
    transition: AtomicBool,
}

impl SecureTransport {
    /// Validate `config` and bind to both pipes with an idle plaintext relay.
    ///
    /// `connection` is the connection-scoped cancellation signal: firing it
    /// aborts every worker of every relay this adapter creates.
    pub fn new(
        socket: DuplexPipe,
        app: DuplexPipe,
        wrapper: Arc<dyn StreamWrapper>,
        config: Config,
        connection: CancellationToken,
    ) -> Result<Self, TransportError> {
        validate_config(&config).map_err(|e| TransportError::Config(e.to_string()))?;
        let initial = PlainRelay::new(&socket, &app, &config.relay, &connection)?;
        Ok(Self {
            socket,
            app,
            wrapper,
            config,
            connection,
            active: RwLock::new(Arc::new(initial)),
            transition: AtomicBool::new(false),
        })
    }

    /// Same as [`new`](Self::new) with the rustls wrapper built from `config.tls`.
    pub fn with_rustls(
        socket: DuplexPipe,
        app: DuplexPipe,
        config: Config,
        connection: CancellationToken,
    ) -> Result<Self, TransportError> {
        let wrapper = Arc::new(RustlsWrapper::new(&config.tls));
        Self::new(socket, app, wrapper, config, connection)
    }

    /// Outbound worker of the relay active right now.
    pub fn sender(&self) -> Sender {
        self.active.read().sender()
    }

    /// Inbound worker of the relay active right now.
    pub fn receiver(&self) -> Receiver {
        self.active.read().receiver()
    }

    /// Whether the active relay runs the socket side through TLS.
    pub fn security(&self) -> Security {
        self.active.read().security()
    }

    /// Start the active relay.
    ///
    /// Returns once both workers are spawned; it does not wait for traffic.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let _transition = self.begin()?;
        if cancel.is_cancelled() || self.connection.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let relay = self.current();
        relay.start()?;
        info!(security = %relay.security(), "transport started");
        Ok(())
    }

    /// Stop the active relay. Returns after both workers have exited.
    pub async fn stop(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let _transition = self.begin()?;
        let relay = self.current();
        relay.stop(cancel).await?;
        info!(security = %relay.security(), "transport stopped");
        Ok(())
    }

    /// Go back to plaintext, whatever the current state.
    pub async fn reset(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let _transition = self.begin()?;
        let stopped = self.stop_active(cancel).await;
        let next = PlainRelay::new(&self.socket, &self.app, &self.config.relay, &self.connection)?;
        self.finish(Arc::new(next), stopped.err())
    }

    /// Switch to TLS using `certificate`.
    ///
    /// If the secure relay cannot be built, a fresh plaintext relay is
    /// published and started instead and the original error is returned:
    /// the connection stays usable and the caller decides whether the
    /// failure is fatal.
    pub async fn enable_secure(
        &self,
        certificate: &Certificate,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let _transition = self.begin()?;
        let stopped = self.stop_active(cancel).await;

        let established = SecureRelay::establish(
            &self.socket,
            &self.app,
            self.wrapper.as_ref(),
            certificate,
            &self.config,
            &self.connection,
            cancel,
        )
        .await;

        let (next, failure) = match established {
            Ok(relay) => (Arc::new(relay) as Arc<dyn Relay>, stopped.err()),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "secure relay unavailable, staying in plaintext");
                match PlainRelay::new(&self.socket, &self.app, &self.config.relay, &self.connection)
                {
                    Ok(fallback) => (Arc::new(fallback) as Arc<dyn Relay>, Some(e)),
                    Err(fallback_err) => {
                        warn!(error = %fallback_err, "plaintext fallback unavailable");
                        return Err(e);
                    }
                }
            }
        };
        self.finish(next, failure)
    }

    /// Fire the connection-scoped cancellation signal.
    ///
    /// Every worker exits promptly; the adapter is unusable afterwards.
    pub fn shutdown(&self) {
        debug!("transport shutdown requested");
        self.connection.cancel();
    }

    fn current(&self) -> Arc<dyn Relay> {
        self.active.read().clone()
    }

    async fn stop_active(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let stopped = self.current().stop(cancel).await;
        if let Err(e) = &stopped {
            warn!(error = %e, "previous relay did not stop cleanly");
        }
        stopped
    }

    /// Publish and start the next relay; the one place a transition ends.
    fn finish(
        &self,
        next: Arc<dyn Relay>,
        failure: Option<TransportError>,
    ) -> Result<(), TransportError> {
        *self.active.write() = next.clone();
        next.start()?;
        info!(security = %next.security(), "relay switched");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn begin(&self) -> Result<TransitionGuard<'_>, TransportError> {
        self.transition
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TransportError::Busy)?;
        Ok(TransitionGuard(&self.transition))
    }
}

/// Clears the transition flag when the operation ends, however it ends.
struct TransitionGuard<'a>(&'a AtomicBool);

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

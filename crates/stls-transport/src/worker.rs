//! Directional workers and the handles callers use to drive them.
//!
//! A worker owns one [`Pump`] and runs it as its own tokio task, so the two
//! directions of a relay never block each other. [`Sender`] and
//! [`Receiver`] are type-erased, cloneable handles onto a worker; they stay
//! valid after the relay is replaced and then simply report `Exited`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stls_core::io::{ByteCounter, Exit, PauseGate, Pump, Signals};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};

use crate::error::TransportError;

/// Lifecycle of a directional worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not started.
    Ready,
    /// Task spawned and copying.
    Running,
    /// Task finished; never restarted.
    Exited(Exit),
}

enum Phase<R, W> {
    Ready(Pump<R, W>),
    Running(JoinHandle<(Exit, Pump<R, W>)>),
    Stopping,
    Exited,
}

pub(crate) struct Worker<R, W> {
    direction: &'static str,
    phase: Mutex<Phase<R, W>>,
    signals: Signals,
    counter: ByteCounter,
    exit: Arc<watch::Sender<Option<Exit>>>,
    /// Set once the reclaimed pump, and with it every pipe lease, is gone.
    released: Arc<watch::Sender<bool>>,
    span: Span,
}

impl<R, W> Worker<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        direction: &'static str,
        pump: Pump<R, W>,
        parent: &CancellationToken,
        pause: Option<PauseGate>,
        span: Span,
    ) -> Self {
        let mut signals = Signals::new(parent);
        if let Some(gate) = pause {
            signals = signals.with_pause(gate);
        }
        let (exit, _) = watch::channel(None);
        let (released, _) = watch::channel(false);
        Self {
            direction,
            phase: Mutex::new(Phase::Ready(pump)),
            signals,
            counter: ByteCounter::new(),
            exit: Arc::new(exit),
            released: Arc::new(released),
            span,
        }
    }

    /// Spawn the pump task. Idempotent while running.
    pub(crate) fn start(&self) -> Result<(), TransportError> {
        let mut phase = self.phase.lock();
        match std::mem::replace(&mut *phase, Phase::Stopping) {
            Phase::Ready(mut pump) => {
                let signals = self.signals.clone();
                let counter = self.counter.clone();
                let exit_slot = self.exit.clone();
                let direction = self.direction;
                let task = tokio::spawn(
                    async move {
                        let exit = pump.run(&signals, &counter).await;
                        match &exit {
                            Exit::Fault { .. } => {
                                warn!(direction, exit = %exit, bytes = counter.get(), "worker failed")
                            }
                            _ => debug!(direction, exit = %exit, bytes = counter.get(), "worker exited"),
                        }
                        exit_slot.send_replace(Some(exit.clone()));
                        (exit, pump)
                    }
                    .instrument(self.span.clone()),
                );
                *phase = Phase::Running(task);
                Ok(())
            }
            running @ Phase::Running(_) => {
                *phase = running;
                Ok(())
            }
            other => {
                *phase = other;
                Err(TransportError::WorkerExited)
            }
        }
    }

    /// Stop the worker and hand back its pump, if this call was the one to
    /// reclaim it.
    ///
    /// A pending read is abandoned; a chunk already read is delivered first.
    /// If `cancel` fires while waiting, the worker is aborted and the wait
    /// continues until the task has actually exited. Concurrent callers that
    /// did not get the pump wait until the one that did drops its
    /// [`Released`] guard.
    pub(crate) async fn halt(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Exit, Option<Reclaimed<R, W>>), TransportError> {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Stopping);
        let outcome = match previous {
            Phase::Ready(pump) => Ok((Exit::Stopped, Some(self.reclaimed(pump)))),
            Phase::Running(mut task) => {
                self.signals.stop.cancel();
                let joined = tokio::select! {
                    biased;
                    res = &mut task => Some(res),
                    _ = cancel.cancelled() => None,
                };
                let joined = match joined {
                    Some(res) => res,
                    None => {
                        self.signals.abort.cancel();
                        task.await
                    }
                };
                match joined {
                    Ok((exit, pump)) => Ok((exit, Some(self.reclaimed(pump)))),
                    Err(e) => {
                        // The pump went down with the task.
                        self.released.send_replace(true);
                        Err(TransportError::from(e))
                    }
                }
            }
            Phase::Stopping | Phase::Exited => {
                self.wait_released(cancel).await;
                Ok((self.exit_or_stopped(), None))
            }
        };

        let exit = match &outcome {
            Ok((exit, _)) => exit.clone(),
            Err(e) => Exit::Fault {
                kind: std::io::ErrorKind::Other,
                message: e.to_string(),
            },
        };
        self.exit.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(exit);
                true
            } else {
                false
            }
        });
        *self.phase.lock() = Phase::Exited;
        outcome
    }

    fn reclaimed(&self, pump: Pump<R, W>) -> Reclaimed<R, W> {
        (pump, Released(self.released.clone()))
    }

    pub(crate) fn counter(&self) -> &ByteCounter {
        &self.counter
    }

    /// Wait for another caller to release the pump. A fired `cancel` aborts
    /// the task so the holder finishes promptly, then the wait goes on.
    async fn wait_released(&self, cancel: &CancellationToken) {
        let mut released = self.released.subscribe();
        let done = tokio::select! {
            biased;
            res = released.wait_for(|r| *r) => res.is_ok(),
            _ = cancel.cancelled() => false,
        };
        if !done {
            self.signals.abort.cancel();
            let _ = released.wait_for(|r| *r).await;
        }
    }

    fn exit_or_stopped(&self) -> Exit {
        self.exit.borrow().clone().unwrap_or(Exit::Stopped)
    }

    fn state(&self) -> WorkerState {
        if let Some(exit) = self.exit.borrow().clone() {
            return WorkerState::Exited(exit);
        }
        match &*self.phase.lock() {
            Phase::Ready(_) => WorkerState::Ready,
            Phase::Running(_) | Phase::Stopping => WorkerState::Running,
            Phase::Exited => WorkerState::Exited(Exit::Stopped),
        }
    }
}

/// A pump handed back by [`Worker::halt`] with its release guard. Tuple
/// fields drop in order, so the leases are gone before the guard fires.
pub(crate) type Reclaimed<R, W> = (Pump<R, W>, Released);

/// Tells callers waiting in [`Worker::halt`] that the pipe leases are free.
/// Drop it only after everything taken out of the pump is gone.
pub(crate) struct Released(Arc<watch::Sender<bool>>);

impl Drop for Released {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

impl<R, W> Drop for Worker<R, W> {
    fn drop(&mut self) {
        // A detached task must not keep the pipe leases alive.
        self.signals.abort.cancel();
    }
}

/// Object-safe view of a worker for the public handles.
#[async_trait]
trait Control: Send + Sync {
    fn start(&self) -> Result<(), TransportError>;
    async fn stop(&self, cancel: &CancellationToken) -> Result<Exit, TransportError>;
    fn state(&self) -> WorkerState;
    fn bytes_transferred(&self) -> u64;
}

#[async_trait]
impl<R, W> Control for Worker<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn start(&self) -> Result<(), TransportError> {
        Worker::start(self)
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<Exit, TransportError> {
        // Dropping the reclaimed pump releases its pipe leases.
        self.halt(cancel).await.map(|(exit, _)| exit)
    }

    fn state(&self) -> WorkerState {
        Worker::state(self)
    }

    fn bytes_transferred(&self) -> u64 {
        self.counter.get()
    }
}

/// Handle onto the worker moving application bytes to the socket.
#[derive(Clone)]
pub struct Sender {
    worker: Arc<dyn Control>,
}

impl Sender {
    pub(crate) fn new<R, W>(worker: Arc<Worker<R, W>>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self { worker }
    }

    pub fn start(&self) -> Result<(), TransportError> {
        self.worker.start()
    }

    /// Stop this direction only; the receiver keeps running.
    pub async fn stop(&self, cancel: &CancellationToken) -> Result<Exit, TransportError> {
        self.worker.stop(cancel).await
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Bytes written and flushed to the socket side.
    pub fn bytes_transferred(&self) -> u64 {
        self.worker.bytes_transferred()
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("state", &self.state())
            .finish()
    }
}

/// Handle onto the worker moving socket bytes to the application, with pause.
#[derive(Clone)]
pub struct Receiver {
    worker: Arc<dyn Control>,
    gate: PauseGate,
}

impl Receiver {
    pub(crate) fn new<R, W>(worker: Arc<Worker<R, W>>, gate: PauseGate) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self { worker, gate }
    }

    pub fn start(&self) -> Result<(), TransportError> {
        self.worker.start()
    }

    /// Stop this direction only; the sender keeps running.
    pub async fn stop(&self, cancel: &CancellationToken) -> Result<Exit, TransportError> {
        self.worker.stop(cancel).await
    }

    /// Halt inbound delivery without tearing the relay down. No-op if
    /// already paused.
    pub fn pause(&self) {
        if self.gate.pause() {
            debug!("receiver paused");
        }
    }

    /// Resume inbound delivery. No-op if not paused.
    pub fn resume(&self) {
        if self.gate.resume() {
            debug!("receiver resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Bytes written and flushed to the application side.
    pub fn bytes_transferred(&self) -> u64 {
        self.worker.bytes_transferred()
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("state", &self.state())
            .field("paused", &self.is_paused())
            .finish()
    }
}

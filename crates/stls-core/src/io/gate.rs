//! Pause gate for inbound delivery.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared pause switch observed by a receiving pump.
///
/// Pausing and resuming are idempotent: repeating either call is a no-op.
/// The pump parks between chunks while paused and abandons a pending read
/// when a pause arrives, so no bytes are pulled from the source until
/// [`PauseGate::resume`] is called.
#[derive(Debug, Clone)]
pub struct PauseGate {
    state: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    /// Create a gate in the running (not paused) state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Halt delivery. Returns `true` if the gate was running before.
    pub fn pause(&self) -> bool {
        !self.state.send_replace(true)
    }

    /// Resume delivery. Returns `true` if the gate was paused before.
    pub fn resume(&self) -> bool {
        self.state.send_replace(false)
    }

    /// Whether delivery is currently halted.
    pub fn is_paused(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the gate is paused.
    pub async fn paused(&self) {
        self.wait_for(true).await;
    }

    /// Wait until the gate is running.
    pub async fn resumed(&self) {
        self.wait_for(false).await;
    }

    async fn wait_for(&self, wanted: bool) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this never observes a close.
        let _ = rx.wait_for(|paused| *paused == wanted).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pause_resume_idempotent() {
        let gate = PauseGate::new();
        assert!(!gate.is_paused());
        assert!(!gate.resume());

        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(gate.is_paused());

        assert!(gate.resume());
        assert!(!gate.resume());
        assert!(!gate.is_paused());
    }

    #[tokio::test]
    async fn test_resumed_wakes_waiter() {
        let gate = PauseGate::new();
        gate.pause();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.resumed().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}

//! I/O primitives driven by relay workers.
//!
//! This module provides the one-directional copy pump shared by the plain
//! and the TLS relays, the pause gate used by receivers, and the metrics
//! hook that counts forwarded bytes.

mod gate;
mod pump;

pub use gate::PauseGate;
pub use pump::{ByteCounter, Exit, NoOpMetrics, Pump, RelayMetrics, Signals};

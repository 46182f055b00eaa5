//! Simulated OBD-II Diagnostic Session Engine
//!
//! Drives a virtual ELM327-style adapter through a timed handshake
//! (LINKING, PROTOCOL_INIT, ECU_SYNC, READY), samples telemetry while READY,
//! keeps a bounded traffic log and records the result of a trouble-code scan.

mod config;
mod engine;
mod error;
mod lifecycle;
mod random;
mod sampler;
mod session;
mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::EngineConfig;
pub use engine::DiagnosticEngine;
pub use error::{ConfigError, SessionError};
pub use lifecycle::{handshake_plan, HandshakeStep};
pub use random::{RandomSource, StdRandom};
pub use sampler::{DecodedSample, SampleTick, TelemetrySampler};
pub use session::{EngineEvent, SessionInfo, VehicleContext};
pub use state::SessionState;
pub use obd_protocol::{Adapter, ObdError, SimulatedAdapter};

//! Session Error Types

use crate::state::SessionState;
use obd_protocol::ObdError;
use thiserror::Error;

/// Operations rejected by the diagnostic engine.
///
/// A rejected operation never changes the session state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// `start_session` while a session is in flight
    #[error("A diagnostic session is already active (state {0})")]
    AlreadyActive(SessionState),

    /// Operation needs a READY session
    #[error("Session is not ready (state {0})")]
    NotReady(SessionState),

    /// Transition outside the handshake chain
    #[error("Invalid session transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// Adapter failed an exchange
    #[error("Adapter error: {0}")]
    Adapter(#[from] ObdError),

    /// Vehicle annotation failed validation
    #[error("Invalid vehicle: {0}")]
    InvalidVehicle(String),

    /// Called outside a Tokio runtime
    #[error("No async runtime available to drive the session")]
    NoRuntime,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File, environment or deserialization failure
    #[error("Configuration error: {0}")]
    Source(#[from] config::ConfigError),

    /// Loaded values are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

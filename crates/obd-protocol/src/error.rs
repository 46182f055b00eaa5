//! Adapter Error Types

use thiserror::Error;

/// Errors an adapter can report while exchanging commands
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObdError {
    /// No adapter answered the pairing probe
    #[error("No OBD adapter found: {0}")]
    AdapterNotFound(String),

    /// No answer within the given time
    #[error("No response from adapter after {0}ms")]
    Timeout(u64),

    /// Answer could not be parsed
    #[error("Invalid response to {command}: {response}")]
    InvalidResponse { command: String, response: String },

    /// Adapter could not agree on a bus protocol with the vehicle
    #[error("Protocol negotiation failed: {0}")]
    ProtocolMismatch(String),

    /// Adapter does not know the command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Adapter is up but no ECU answers
    #[error("Vehicle ignition is off or not connected")]
    VehicleNotConnected,
}

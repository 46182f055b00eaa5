//! Diagnostic adapter seam
//!
//! The session handshake talks to an [`Adapter`] one command at a time. The
//! [`SimulatedAdapter`] answers with canned ELM327 responses and never fails;
//! a hardware-backed adapter reports failures through [`ObdError`].

use crate::error::ObdError;
use crate::protocol::{handshake, ObdProtocol};
use tracing::debug;

/// A diagnostic adapter that answers text commands with text responses
pub trait Adapter: Send + Sync {
    /// Send one command and return the raw response text
    fn exchange(&self, command: &str) -> Result<String, ObdError>;

    /// Adapter name used in logs
    fn name(&self) -> &str;
}

/// Firmware banner reported after a reset
const ELM_BANNER: &str = "ELM327 v1.5";

/// Supported PIDs 01-20 bitmap reported by the simulated ECU
const SUPPORTED_PIDS_RESPONSE: &str = "41 00 BE 3F A8 13";

/// Stored trouble codes reported by the simulated ECU (P0301)
const STORED_DTC_RESPONSE: &str = "43 01 03 01";

/// In-process adapter with canned responses (no hardware required)
#[derive(Debug, Clone)]
pub struct SimulatedAdapter {
    /// Advertised device name
    device: String,
    /// Mode 03 answer
    dtc_response: String,
    /// Resting battery voltage reported by ATRV
    voltage_response: String,
}

impl SimulatedAdapter {
    /// Create a simulated adapter that reports a single P0301 fault
    pub fn new() -> Self {
        Self {
            device: "OBDII".to_string(),
            dtc_response: STORED_DTC_RESPONSE.to_string(),
            voltage_response: "12.4V".to_string(),
        }
    }

    /// Override the Mode 03 answer (e.g. `"43 00"` for a clean vehicle)
    pub fn with_dtc_response(mut self, response: impl Into<String>) -> Self {
        self.dtc_response = response.into();
        self
    }

    fn respond(&self, command: &str) -> Option<String> {
        let command = command.trim().to_ascii_uppercase();
        let response = match command.as_str() {
            handshake::PAIRING_PROBE => format!("DEVICE FOUND: {} ({})", self.device, ELM_BANNER),
            handshake::RESET => ELM_BANNER.to_string(),
            handshake::ECHO_OFF => "OK".to_string(),
            handshake::ECU_IDENTIFY => SUPPORTED_PIDS_RESPONSE.to_string(),
            handshake::READ_DTC => self.dtc_response.clone(),
            handshake::READ_VOLTAGE => self.voltage_response.clone(),
            cmd => {
                let protocol = ObdProtocol::from_elm_command(cmd)?;
                debug!("{} selecting {}", self.device, protocol.label());
                "OK".to_string()
            }
        };
        Some(response)
    }
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for SimulatedAdapter {
    fn exchange(&self, command: &str) -> Result<String, ObdError> {
        let response = self
            .respond(command)
            .ok_or_else(|| ObdError::UnknownCommand(command.to_string()))?;
        debug!("{} <- {} -> {}", self.device, command, response);
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtc::parse_dtc_response;

    #[test]
    fn test_handshake_responses() {
        let adapter = SimulatedAdapter::new();
        assert_eq!(adapter.exchange("ATZ").unwrap(), "ELM327 v1.5");
        assert_eq!(adapter.exchange("ate0").unwrap(), "OK");
        assert_eq!(adapter.exchange("ATSP0").unwrap(), "OK");
        assert_eq!(adapter.exchange("ATSP6").unwrap(), "OK");
        assert!(adapter.exchange("BT SCAN").unwrap().starts_with("DEVICE FOUND"));
    }

    #[test]
    fn test_stored_codes() {
        let adapter = SimulatedAdapter::new();
        let codes = parse_dtc_response(&adapter.exchange("03").unwrap()).unwrap();
        assert_eq!(codes, vec!["P0301"]);

        let clean = SimulatedAdapter::new().with_dtc_response("43 00");
        assert!(parse_dtc_response(&clean.exchange("03").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let adapter = SimulatedAdapter::new();
        assert_eq!(
            adapter.exchange("ATXYZ"),
            Err(ObdError::UnknownCommand("ATXYZ".to_string()))
        );
    }
}

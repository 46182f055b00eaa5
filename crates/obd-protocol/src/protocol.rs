//! OBD-II Protocol Definitions and ELM327 Command Vocabulary

use serde::{Deserialize, Serialize};

/// Bus protocols an ELM327 can be told to use (`ATSP<n>`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObdProtocol {
    #[default]
    Auto,
    J1850Pwm,
    J1850Vpw,
    Iso9141_2,
    Iso14230_4Kwp,
    Iso14230_4KwpFast,
    Iso15765_4Can11bit500,
    Iso15765_4Can29bit500,
    Iso15765_4Can11bit250,
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Every protocol, indexed by its ELM327 protocol number
    pub const ALL: [ObdProtocol; 10] = [
        ObdProtocol::Auto,
        ObdProtocol::J1850Pwm,
        ObdProtocol::J1850Vpw,
        ObdProtocol::Iso9141_2,
        ObdProtocol::Iso14230_4Kwp,
        ObdProtocol::Iso14230_4KwpFast,
        ObdProtocol::Iso15765_4Can11bit500,
        ObdProtocol::Iso15765_4Can29bit500,
        ObdProtocol::Iso15765_4Can11bit250,
        ObdProtocol::Iso15765_4Can29bit250,
    ];

    const SELECT_COMMANDS: [&'static str; 10] = [
        "ATSP0", "ATSP1", "ATSP2", "ATSP3", "ATSP4", "ATSP5", "ATSP6", "ATSP7", "ATSP8", "ATSP9",
    ];

    /// ELM327 protocol number (0 = automatic)
    pub fn number(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    /// Protocol select command, e.g. `"ATSP0"`
    pub fn to_elm_command(self) -> &'static str {
        Self::SELECT_COMMANDS[self.number()]
    }

    /// Parse a protocol select command (case-insensitive)
    pub fn from_elm_command(command: &str) -> Option<Self> {
        let command = command.trim().to_ascii_uppercase();
        Self::SELECT_COMMANDS
            .iter()
            .position(|c| *c == command)
            .map(|i| Self::ALL[i])
    }

    /// Human-readable bus name
    pub fn label(self) -> &'static str {
        match self {
            ObdProtocol::Auto => "Automatic",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 KWP (5 baud init)",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 KWP (fast init)",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 CAN 11/500",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 CAN 29/500",
            ObdProtocol::Iso15765_4Can11bit250 => "ISO 15765-4 CAN 11/250",
            ObdProtocol::Iso15765_4Can29bit250 => "ISO 15765-4 CAN 29/250",
        }
    }
}

/// Commands and canned texts used by the session handshake
pub mod handshake {
    use super::ObdProtocol;

    /// Bluetooth discovery probe
    pub const PAIRING_PROBE: &str = "BT SCAN";
    /// Full adapter reset
    pub const RESET: &str = "ATZ";
    /// Disable command echo
    pub const ECHO_OFF: &str = "ATE0";
    /// Supported PIDs 01-20, doubles as ECU identification
    pub const ECU_IDENTIFY: &str = "0100";
    /// Read stored trouble codes
    pub const READ_DTC: &str = "03";
    /// Read battery voltage at the adapter pin
    pub const READ_VOLTAGE: &str = "ATRV";
    /// Adapter status while it searches for a responding ECU
    pub const SEARCHING: &str = "SEARCHING...";

    /// Adapter initialisation sequence: reset, echo off, automatic protocol
    pub fn init_sequence() -> [&'static str; 3] {
        [RESET, ECHO_OFF, ObdProtocol::Auto.to_elm_command()]
    }
}

//! OBD-II PID Definitions and Response Decoding
//!
//! Decodes ELM327 text responses (`"41 0C 1A F8"`) into physical values using
//! the SAE J1979 Mode 01 formulas. Every function here is pure: the value of a
//! frame depends only on the frame text and the requested PID.

use serde::{Deserialize, Serialize};

/// Mode 01 PIDs the scanner knows how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
}

impl Pid {
    /// All decodable PIDs, in PID order
    pub const ALL: [Pid; 4] = [Pid::CoolantTemp, Pid::Rpm, Pid::Speed, Pid::ThrottlePosition];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Mode 01 request string, e.g. `"010C"`
    pub fn command(&self) -> String {
        format!("{:02X}{:02X}", crate::mode::CURRENT_DATA, self.as_hex())
    }

    /// Look up a PID from its Mode 01 request string (case-insensitive)
    pub fn from_command(command: &str) -> Option<Pid> {
        let command = command.trim();
        Pid::ALL
            .into_iter()
            .find(|pid| pid.command().eq_ignore_ascii_case(command))
    }

    /// Number of payload bytes the adapter returns for this PID
    pub fn payload_len(&self) -> usize {
        match self {
            Pid::Rpm => 2,
            _ => 1,
        }
    }

    /// Engineering unit of the decoded value
    pub fn unit(&self) -> &'static str {
        match self {
            Pid::CoolantTemp => "°C",
            Pid::Rpm => "rpm",
            Pid::Speed => "km/h",
            Pid::ThrottlePosition => "%",
        }
    }

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            Pid::CoolantTemp => "Coolant temperature",
            Pid::Rpm => "Engine RPM",
            Pid::Speed => "Vehicle speed",
            Pid::ThrottlePosition => "Throttle position",
        }
    }

    /// Apply the J1979 formula to payload bytes `A` and `B`
    pub fn apply_formula(&self, a: u8, b: u8) -> f64 {
        let a = a as u32;
        let b = b as u32;
        match self {
            // floor(((A*256)+B)/4)
            Pid::Rpm => ((a * 256 + b) / 4) as f64,
            // A - 40
            Pid::CoolantTemp => a as f64 - 40.0,
            // A
            Pid::Speed => a as f64,
            // round(A*100/255)
            Pid::ThrottlePosition => (a as f64 * 100.0 / 255.0).round(),
        }
    }

    /// Build the canonical positive response for this PID, e.g. `"41 0C 1A F8"`
    pub fn encode_frame(&self, payload: &[u8]) -> String {
        let mut frame = format!("41 {:02X}", self.as_hex());
        for byte in payload.iter().take(self.payload_len()) {
            frame.push_str(&format!(" {:02X}", byte));
        }
        frame
    }
}

/// Result of decoding a raw frame, keeping unsupported and malformed apart
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeOutcome {
    /// The frame carried a value for a supported PID
    Decoded(f64),
    /// The PID has no known formula
    Unsupported,
    /// The frame is too short or contains tokens that are not bytes
    Malformed,
}

impl DecodeOutcome {
    /// Collapse to the plain numeric value, degrading to `0`
    pub fn value_or_zero(self) -> f64 {
        match self {
            DecodeOutcome::Decoded(value) => value,
            DecodeOutcome::Unsupported | DecodeOutcome::Malformed => 0.0,
        }
    }

    /// Whether a value was decoded
    pub fn is_decoded(&self) -> bool {
        matches!(self, DecodeOutcome::Decoded(_))
    }
}

/// Split an adapter response into bytes.
///
/// Characters other than hex digits and whitespace are dropped first, then the
/// remainder is split on whitespace. Returns `None` if any token is not a
/// single unsigned byte.
pub fn parse_frame_bytes(raw: &str) -> Option<Vec<u8>> {
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_hexdigit() || c.is_whitespace())
        .collect();

    sanitized
        .split_whitespace()
        .map(|token| u8::from_str_radix(token, 16).ok())
        .collect()
}

/// Decode a raw frame, reporting why no value could be produced
pub fn decode_frame(pid: &str, raw: &str) -> DecodeOutcome {
    let Some(pid) = Pid::from_command(pid) else {
        return DecodeOutcome::Unsupported;
    };

    let bytes = match parse_frame_bytes(raw) {
        Some(bytes) if bytes.len() >= 3 => bytes,
        _ => return DecodeOutcome::Malformed,
    };

    // bytes[0] is the mode echo (0x41) and bytes[1] the PID echo
    let a = bytes[2];
    let b = bytes.get(3).copied().unwrap_or(0);

    DecodeOutcome::Decoded(pid.apply_formula(a, b))
}

/// Decode a raw frame into a physical value.
///
/// Unsupported PIDs and malformed frames both yield `0`.
pub fn decode(pid: &str, raw: &str) -> f64 {
    decode_frame(pid, raw).value_or_zero()
}

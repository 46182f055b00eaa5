//! OBD-II Protocol Implementation
//!
//! This crate decodes SAE J1979 Mode 01 responses and Mode 03 trouble codes
//! from ELM327 text frames, and defines the adapter seam the diagnostic
//! session talks through.

mod adapter;
mod dtc;
mod error;
mod pid;
mod protocol;

pub use adapter::{Adapter, SimulatedAdapter};
pub use dtc::{decode_dtc_bytes, parse_dtc_response};
pub use error::ObdError;
pub use pid::{decode, decode_frame, parse_frame_bytes, DecodeOutcome, Pid};
pub use protocol::{handshake, ObdProtocol};

/// OBD-II service (mode) numbers
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Stored trouble codes
    pub const READ_DTC: u8 = 0x03;
}

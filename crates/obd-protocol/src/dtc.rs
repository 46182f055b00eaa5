//! Mode 03 trouble code decoding

use crate::error::ObdError;
use crate::pid::parse_frame_bytes;

/// Positive response service id for Mode 03
const READ_DTC_RESPONSE: u8 = 0x40 | crate::mode::READ_DTC;

/// Decode two raw bytes into a standard DTC code string (e.g. `"P0301"`).
///
/// `00 00` is padding and yields `None`.
pub fn decode_dtc_bytes(b1: u8, b2: u8) -> Option<String> {
    if b1 == 0x00 && b2 == 0x00 {
        return None;
    }

    let category = match (b1 >> 6) & 0x03 {
        0 => 'P',
        1 => 'C',
        2 => 'B',
        _ => 'U',
    };

    let digit1 = (b1 >> 4) & 0x03;
    let digit2 = b1 & 0x0F;
    let digit3 = (b2 >> 4) & 0x0F;
    let digit4 = b2 & 0x0F;

    Some(format!("{category}{digit1}{digit2:X}{digit3:X}{digit4:X}"))
}

/// Parse a CAN-style Mode 03 response `"43 <count> b1 b2 ..."` into codes
pub fn parse_dtc_response(raw: &str) -> Result<Vec<String>, ObdError> {
    let invalid = || ObdError::InvalidResponse {
        command: "03".to_string(),
        response: raw.to_string(),
    };

    let bytes = parse_frame_bytes(raw).ok_or_else(invalid)?;
    match bytes.as_slice() {
        [READ_DTC_RESPONSE, count, rest @ ..] => {
            let count = *count as usize;
            if rest.len() < count * 2 {
                return Err(invalid());
            }
            Ok(rest
                .chunks_exact(2)
                .take(count)
                .filter_map(|pair| decode_dtc_bytes(pair[0], pair[1]))
                .collect())
        }
        [READ_DTC_RESPONSE] => Ok(Vec::new()),
        _ => Err(invalid()),
    }
}

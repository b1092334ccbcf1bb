//! # SLCAN Line Protocol
//!
//! ASCII commands understood by Lawicel-compatible USB-CAN adapters
//! (CANable, CANtact, USBtin, ...). Every command ends with a carriage return.
//!
//! ```text
//! C\r                  close the CAN channel
//! S6\r                 select bitrate (S0..S8)
//! O\r                  open the CAN channel
//! t1AB8000102...\r     transmit standard frame: id(3 hex) dlc(1) data(2 hex/byte)
//! ```
//!
//! The adapter answers every command with `\r` (`z\r` after a transmit) or
//! with BEL on error. Once the channel is open, frames received from the bus
//! are interleaved with those replies as `t`/`T`/`r`/`R` lines.

use std::fmt::Write;

use crate::error::{EmulatorError, Result};

/// Command terminator
pub const SLCAN_CR: u8 = b'\r';

/// Error reply
pub const SLCAN_BELL: u8 = 0x07;

/// Close channel command
pub const SLCAN_CLOSE: &[u8] = b"C\r";

/// Open channel command
pub const SLCAN_OPEN: &[u8] = b"O\r";

/// Largest 11-bit identifier
pub const SLCAN_MAX_STANDARD_ID: u16 = 0x7FF;

/// Largest classic CAN payload
pub const SLCAN_MAX_DLC: usize = 8;

/// Supported bitrates and their `S<n>` codes
pub const SLCAN_BITRATES: &[(u32, u8)] = &[
    (10_000, 0),
    (20_000, 1),
    (50_000, 2),
    (100_000, 3),
    (125_000, 4),
    (250_000, 5),
    (500_000, 6),
    (800_000, 7),
    (1_000_000, 8),
];

/// Build the `S<n>` bitrate command
///
/// # Errors
///
/// Returns error if the bitrate has no SLCAN code
pub fn bitrate_command(bitrate: u32) -> Result<Vec<u8>> {
    let code = SLCAN_BITRATES
        .iter()
        .find(|&&(rate, _)| rate == bitrate)
        .map(|&(_, code)| code)
        .ok_or_else(|| EmulatorError::Slcan(format!("Unsupported CAN bitrate {}", bitrate)))?;

    Ok(vec![b'S', b'0' + code, SLCAN_CR])
}

/// Encode a standard data frame as an SLCAN transmit command
///
/// # Arguments
///
/// * `id` - 11-bit CAN identifier
/// * `data` - Payload (0-8 bytes)
///
/// # Returns
///
/// * `Result<Vec<u8>>` - ASCII command including the trailing `\r`
///
/// # Examples
///
/// ```
/// use esp33_emulator::serial::slcan::encode_transmit;
///
/// let line = encode_transmit(0x1AB, &[0x01, 0x01, 0, 0, 0, 0, 0, 0]).unwrap();
/// assert_eq!(line, b"t1AB80101000000000000\r");
/// ```
pub fn encode_transmit(id: u16, data: &[u8]) -> Result<Vec<u8>> {
    if id > SLCAN_MAX_STANDARD_ID {
        return Err(EmulatorError::Slcan(format!(
            "Identifier 0x{:X} exceeds 11 bits",
            id
        )));
    }

    if data.len() > SLCAN_MAX_DLC {
        return Err(EmulatorError::Slcan(format!(
            "Payload of {} bytes exceeds classic CAN maximum",
            data.len()
        )));
    }

    // t + id(3) + dlc(1) + data(2 per byte) + \r
    let mut line = String::with_capacity(1 + 3 + 1 + data.len() * 2 + 1);
    // Writing into a String cannot fail
    let _ = write!(line, "t{:03X}{}", id, data.len());
    for byte in data {
        let _ = write!(line, "{:02X}", byte);
    }
    line.push(SLCAN_CR as char);

    Ok(line.into_bytes())
}

/// One unit of adapter output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command accepted
    Ack,
    /// Command rejected (BEL)
    Nack,
    /// Frame received from the bus
    Received,
    /// Any other line (version, status flags, serial number)
    Other(Vec<u8>),
}

/// Split the next complete reply off the front of `buf`
///
/// Returns `None` until a `\r` or BEL has arrived. Line feeds sent by some
/// adapters are ignored.
///
/// # Examples
///
/// ```
/// use esp33_emulator::serial::slcan::{take_reply, Reply};
///
/// let mut buf = b"t12320102\rz\r\x07".to_vec();
/// assert_eq!(take_reply(&mut buf), Some(Reply::Received));
/// assert_eq!(take_reply(&mut buf), Some(Reply::Ack));
/// assert_eq!(take_reply(&mut buf), Some(Reply::Nack));
/// assert_eq!(take_reply(&mut buf), None);
/// ```
pub fn take_reply(buf: &mut Vec<u8>) -> Option<Reply> {
    let end = buf.iter().position(|&b| b == SLCAN_CR || b == SLCAN_BELL)?;
    let terminator = buf[end];
    let mut line: Vec<u8> = buf.drain(..=end).take(end).collect();

    if terminator == SLCAN_BELL {
        return Some(Reply::Nack);
    }

    line.retain(|&b| b != b'\n');
    Some(match line.as_slice() {
        [] | [b'z'] | [b'Z'] => Reply::Ack,
        [b't' | b'T' | b'r' | b'R', ..] => Reply::Received,
        _ => Reply::Other(line),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_transmit_esp33() {
        let payload = [0x0B, 0x0A, 0x50, 0x00, 0xC1, 0x04, 0x00, 0x01];
        let line = encode_transmit(0x1AB, &payload).unwrap();
        assert_eq!(line, b"t1AB80B0A5000C1040001\r".to_vec());
        assert_eq!(line.len(), 1 + 3 + 1 + 16 + 1);
    }

    #[test]
    fn test_encode_transmit_pads_identifier() {
        let line = encode_transmit(0x00A, &[]).unwrap();
        assert_eq!(line, b"t00A0\r".to_vec());
    }

    #[test]
    fn test_encode_transmit_rejects_extended_id() {
        assert!(encode_transmit(0x800, &[0u8; 8]).is_err());
        assert!(encode_transmit(0x7FF, &[0u8; 8]).is_ok());
    }

    #[test]
    fn test_encode_transmit_rejects_long_payload() {
        let result = encode_transmit(0x1AB, &[0u8; 9]);
        match result {
            Err(EmulatorError::Slcan(msg)) => assert!(msg.contains("9 bytes")),
            other => panic!("Expected Slcan error, got: {:?}", other),
        }
    }

    #[test]
    fn test_bitrate_commands() {
        assert_eq!(bitrate_command(10_000).unwrap(), b"S0\r".to_vec());
        assert_eq!(bitrate_command(500_000).unwrap(), b"S6\r".to_vec());
        assert_eq!(bitrate_command(1_000_000).unwrap(), b"S8\r".to_vec());
    }

    #[test]
    fn test_unsupported_bitrate() {
        assert!(bitrate_command(83_333).is_err());
    }

    #[test]
    fn test_take_reply_waits_for_terminator() {
        let mut buf = b"t1AB8".to_vec();
        assert_eq!(take_reply(&mut buf), None);
        assert_eq!(buf, b"t1AB8".to_vec(), "Partial line must stay buffered");

        buf.extend_from_slice(b"0000000000000000\r");
        assert_eq!(take_reply(&mut buf), Some(Reply::Received));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_reply_acks() {
        let mut buf = b"\rz\rZ\r\n\r".to_vec();
        for _ in 0..4 {
            assert_eq!(take_reply(&mut buf), Some(Reply::Ack));
        }
        assert_eq!(take_reply(&mut buf), None);
    }

    #[test]
    fn test_take_reply_bell_drops_partial_line() {
        let mut buf = b"xy\x07\r".to_vec();
        assert_eq!(take_reply(&mut buf), Some(Reply::Nack));
        assert_eq!(take_reply(&mut buf), Some(Reply::Ack));
    }

    #[test]
    fn test_take_reply_classifies_other_lines() {
        let mut buf = b"V1013\rR12345678100\r".to_vec();
        assert_eq!(take_reply(&mut buf), Some(Reply::Other(b"V1013".to_vec())));
        assert_eq!(take_reply(&mut buf), Some(Reply::Received));
    }
}

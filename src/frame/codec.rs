//! # ESP_33 Frame Codec
//!
//! Makes the payload well-formed before each transmission attempt:
//! advances the rolling counter, then stores the XOR checksum in byte 0.

use super::model::Esp33Frame;
use super::protocol::{FrameBytes, ESP_33_CHECKSUM_BYTE, ESP_33_COUNTER_MODULUS};

/// Calculate the ESP_33 checksum
///
/// XOR of every payload byte except the checksum byte itself.
///
/// # Examples
///
/// ```
/// use esp33_emulator::frame::codec::xor_checksum;
///
/// let payload = [0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x04];
/// assert_eq!(xor_checksum(&payload), 0x07);
/// ```
pub fn xor_checksum(payload: &FrameBytes) -> u8 {
    payload
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != ESP_33_CHECKSUM_BYTE)
        .fold(0u8, |acc, (_, &byte)| acc ^ byte)
}

/// Next value of the rolling counter, wrapping 15 -> 0
pub fn next_counter(counter: u8) -> u8 {
    (counter + 1) % ESP_33_COUNTER_MODULUS
}

/// Encode the frame for transmission
///
/// Steps, in order:
/// 1. advance `ESP_33_BZ` by one (mod 16)
/// 2. recompute `ESP_33_CHK` over the updated payload
///
/// No other signal is modified. The returned bytes are exactly what goes on
/// the bus.
///
/// # Examples
///
/// ```
/// use esp33_emulator::frame::Esp33Frame;
/// use esp33_emulator::frame::codec::encode;
///
/// let mut frame = Esp33Frame::new();
/// let payload = encode(&mut frame);
/// assert_eq!(payload, [0x01, 0x01, 0, 0, 0, 0, 0, 0]);
/// ```
pub fn encode(frame: &mut Esp33Frame) -> FrameBytes {
    frame.store_counter(next_counter(frame.rolling_counter()));

    let checksum = xor_checksum(frame.as_bytes());
    frame.store_checksum(checksum);
    *frame.as_bytes()
}

//! # ESP_33 Frame Model
//!
//! Owns the 8-byte payload and exposes a getter and range-checked setter for
//! every signal. Each accessor only touches the bits of its own mask, so
//! writes to one signal never disturb another signal or the reserved bits.

use super::protocol::{Field, FrameBytes, ESP_33_CHECKSUM_BYTE, ESP_33_DLC};
use crate::error::FieldError;

/// The emulated ESP_33 message.
///
/// Created zeroed at start-up and mutated in place for the life of the
/// process. The checksum byte is only written by [`crate::frame::codec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Esp33Frame {
    bytes: FrameBytes,
}

impl Esp33Frame {
    /// Creates an all-zero frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: [0u8; ESP_33_DLC],
        }
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn as_bytes(&self) -> &FrameBytes {
        &self.bytes
    }

    /// Returns the checksum byte currently stored in the payload.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        self.bytes[ESP_33_CHECKSUM_BYTE]
    }

    pub(crate) fn store_checksum(&mut self, checksum: u8) {
        self.bytes[ESP_33_CHECKSUM_BYTE] = checksum;
    }

    /// Masked write of the rolling counter; bits above the mask are dropped.
    pub(crate) fn store_counter(&mut self, counter: u8) {
        let spec = Field::RollingCounter.spec();
        let byte = &mut self.bytes[spec.byte];
        *byte = (*byte & !spec.mask) | ((counter << spec.shift) & spec.mask);
    }

    /// Reads the raw value of a field.
    ///
    /// # Examples
    ///
    /// ```
    /// use esp33_emulator::frame::{Esp33Frame, Field};
    ///
    /// let frame = Esp33Frame::new();
    /// assert_eq!(frame.get(Field::WarnPulseLevel), 0);
    /// ```
    #[must_use]
    pub fn get(&self, field: Field) -> u8 {
        let spec = field.spec();
        (self.bytes[spec.byte] & spec.mask) >> spec.shift
    }

    /// Writes a field after checking it against the field's domain.
    ///
    /// # Arguments
    ///
    /// * `field` - Signal to write
    /// * `value` - Raw value (0 to the field's maximum)
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::OutOfRange`] if `value` exceeds the field's
    /// maximum. The payload is left untouched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use esp33_emulator::frame::{Esp33Frame, Field};
    ///
    /// let mut frame = Esp33Frame::new();
    /// assert!(frame.set(Field::WarnPulseLevel, 9).is_ok());
    /// assert!(frame.set(Field::WarnPulseLevel, 10).is_err());
    /// assert_eq!(frame.get(Field::WarnPulseLevel), 9);
    /// ```
    pub fn set(&mut self, field: Field, value: u8) -> Result<(), FieldError> {
        let spec = field.spec();
        if value > spec.max {
            return Err(FieldError::OutOfRange {
                signal: spec.signal,
                value: u32::from(value),
                max: spec.max,
            });
        }

        let byte = &mut self.bytes[spec.byte];
        *byte = (*byte & !spec.mask) | ((value << spec.shift) & spec.mask);
        Ok(())
    }

    fn set_flag(&mut self, field: Field, value: bool) {
        let spec = field.spec();
        if value {
            self.bytes[spec.byte] |= spec.mask;
        } else {
            self.bytes[spec.byte] &= !spec.mask;
        }
    }

    /// `ESP_33_BZ` (0-15)
    #[must_use]
    pub fn rolling_counter(&self) -> u8 {
        self.get(Field::RollingCounter)
    }

    pub fn set_rolling_counter(&mut self, value: u8) -> Result<(), FieldError> {
        self.set(Field::RollingCounter, value)
    }

    /// `ESC_Warnruck_aktiv` (0-9)
    #[must_use]
    pub fn warn_pulse_level(&self) -> u8 {
        self.get(Field::WarnPulseLevel)
    }

    pub fn set_warn_pulse_level(&mut self, value: u8) -> Result<(), FieldError> {
        self.set(Field::WarnPulseLevel, value)
    }

    /// `ESC_Prefill_aktiv`
    #[must_use]
    pub fn prefill_active(&self) -> bool {
        self.get(Field::PrefillActive) != 0
    }

    pub fn set_prefill_active(&mut self, value: bool) {
        self.set_flag(Field::PrefillActive, value);
    }

    /// `ESC_Verz_Reg_aktiv` (0-15)
    #[must_use]
    pub fn decel_regulation_level(&self) -> u8 {
        self.get(Field::DecelRegulationLevel)
    }

    pub fn set_decel_regulation_level(&mut self, value: u8) -> Result<(), FieldError> {
        self.set(Field::DecelRegulationLevel, value)
    }

    /// `ESC_Verz_Reg_nicht_verfuegbar`
    #[must_use]
    pub fn decel_regulation_unavailable(&self) -> bool {
        self.get(Field::DecelRegulationUnavailable) != 0
    }

    pub fn set_decel_regulation_unavailable(&mut self, value: bool) {
        self.set_flag(Field::DecelRegulationUnavailable, value);
    }

    /// `ESC_Fahrer_Bremsdruck_bestimmend`
    #[must_use]
    pub fn driver_brake_pressure(&self) -> bool {
        self.get(Field::DriverBrakePressure) != 0
    }

    pub fn set_driver_brake_pressure(&mut self, value: bool) {
        self.set_flag(Field::DriverBrakePressure, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol::RESERVED_MASK;

    /// Frame with every field at a distinctive non-zero value
    fn populated_frame() -> Esp33Frame {
        let mut frame = Esp33Frame::new();
        frame.set_rolling_counter(0x0A).unwrap();
        frame.set_warn_pulse_level(5).unwrap();
        frame.set_prefill_active(true);
        frame.set_decel_regulation_level(0x0C).unwrap();
        frame.set_decel_regulation_unavailable(true);
        frame.set_driver_brake_pressure(true);
        frame
    }

    #[test]
    fn test_new_frame_is_zeroed() {
        let frame = Esp33Frame::new();
        assert_eq!(frame.as_bytes(), &[0u8; 8]);
        for field in Field::ALL {
            assert_eq!(frame.get(field), 0, "{:?}", field);
        }
    }

    #[test]
    fn test_exact_bit_positions() {
        let frame = populated_frame();
        assert_eq!(
            frame.as_bytes(),
            &[0x00, 0x0A, 0x50, 0x00, 0xC1, 0x04, 0x00, 0x01]
        );
    }

    #[test]
    fn test_set_get_round_trip_preserves_other_fields() {
        for field in Field::ALL {
            for value in 0..=field.spec().max {
                let mut frame = populated_frame();
                let before = frame;

                frame.set(field, value).unwrap();
                assert_eq!(frame.get(field), value, "{:?}={}", field, value);

                for other in Field::ALL.into_iter().filter(|&f| f != field) {
                    assert_eq!(frame.get(other), before.get(other), "{:?} disturbed {:?}", field, other);
                }

                let current = frame.get(field);
                frame.set(field, current).unwrap();
                assert_eq!(frame.get(field), current);
            }
        }
    }

    #[test]
    fn test_max_accepted_and_max_plus_one_rejected() {
        for field in Field::ALL {
            let max = field.spec().max;
            let mut frame = Esp33Frame::new();

            assert!(frame.set(field, max).is_ok(), "{:?} should accept {}", field, max);
            assert_eq!(frame.get(field), max);

            let before = *frame.as_bytes();
            let err = frame.set(field, max + 1).unwrap_err();
            assert_eq!(
                err,
                FieldError::OutOfRange {
                    signal: field.signal(),
                    value: u32::from(max) + 1,
                    max,
                }
            );
            assert_eq!(frame.as_bytes(), &before, "{:?} rejected write mutated payload", field);
        }
    }

    #[test]
    fn test_warn_pulse_rejects_ten() {
        let mut frame = Esp33Frame::new();
        frame.set_warn_pulse_level(3).unwrap();
        assert!(frame.set_warn_pulse_level(10).is_err());
        assert_eq!(frame.warn_pulse_level(), 3);
    }

    #[test]
    fn test_reserved_bits_stay_zero() {
        let mut frame = Esp33Frame::new();
        for field in Field::ALL {
            frame.set(field, field.spec().max).unwrap();
        }

        for (byte, reserved) in frame.as_bytes().iter().zip(RESERVED_MASK.iter()) {
            assert_eq!(byte & reserved, 0);
        }
    }

    #[test]
    fn test_flag_setters_clear_only_their_bit() {
        let mut frame = populated_frame();
        frame.set_prefill_active(false);
        assert!(!frame.prefill_active());
        assert_eq!(frame.decel_regulation_level(), 0x0C);

        frame.set_decel_regulation_unavailable(false);
        frame.set_driver_brake_pressure(false);
        assert_eq!(frame.as_bytes(), &[0x00, 0x0A, 0x50, 0x00, 0xC0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_checksum_byte_untouched_by_setters() {
        let mut frame = Esp33Frame::new();
        frame.store_checksum(0xA5);
        for field in Field::ALL {
            frame.set(field, field.spec().max).unwrap();
        }
        assert_eq!(frame.checksum(), 0xA5);
    }

    #[test]
    fn test_store_counter_keeps_neighbouring_bits() {
        let mut frame = Esp33Frame::new();
        frame.bytes[1] = 0xF0;

        frame.store_counter(0x0A);
        assert_eq!(frame.as_bytes()[1], 0xFA);
        assert_eq!(frame.rolling_counter(), 10);

        frame.store_counter(0x13);
        assert_eq!(frame.as_bytes()[1], 0xF3);
    }
}

//! # Error Types
//!
//! Custom error types for the ESP_33 emulator using `thiserror`.

use thiserror::Error;

/// Main error type for the ESP_33 emulator
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// SLCAN adapter protocol errors
    #[error("SLCAN error: {0}")]
    Slcan(String),

    /// Serial port I/O errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No CAN adapter found (tried: {0})")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected write to a frame field.
///
/// Field errors never leave the console layer: the frame keeps its previous
/// value and the error is only reported back to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Value outside the field's declared domain
    #[error("{signal}: value {value} out of range (0-{max})")]
    OutOfRange {
        signal: &'static str,
        value: u32,
        max: u8,
    },
}

/// Result type alias for the ESP_33 emulator
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_message() {
        let err = FieldError::OutOfRange {
            signal: "ESC_Warnruck_aktiv",
            value: 10,
            max: 9,
        };
        assert_eq!(err.to_string(), "ESC_Warnruck_aktiv: value 10 out of range (0-9)");
    }

    #[test]
    fn test_serial_port_not_found_message() {
        let err = EmulatorError::SerialPortNotFound("/dev/ttyACM0, /dev/ttyUSB0".to_string());
        assert!(err.to_string().contains("/dev/ttyACM0"));
    }
}

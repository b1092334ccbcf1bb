//! # Console Commands
//!
//! Parsing of console lines into commands, plus the help and status text.
//!
//! ```text
//! H | Help         field list and valid ranges
//! S                current value of every field and the checksum
//! <n>              flag: toggle, level: list values and wait for one
//! <n> <value>      set field <n> to <value>
//! ```
//!
//! Keywords are matched case-insensitively and must be followed by a space or
//! the end of the line. A field value must be exactly one decimal number.

use thiserror::Error;
use winnow::ascii::{dec_uint, digit1, space0, space1, Caseless};
use winnow::combinator::{alt, delimited, eof, opt, peek, preceded, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::rest;

use crate::error::FieldError;
use crate::frame::codec::xor_checksum;
use crate::frame::protocol::Field;
use crate::frame::Esp33Frame;

/// Command numbers of the settable fields
pub const FIELD_COMMANDS: [(&str, Field); 6] = [
    ("1", Field::RollingCounter),
    ("3", Field::WarnPulseLevel),
    ("5", Field::PrefillActive),
    ("9", Field::DecelRegulationLevel),
    ("10", Field::DecelRegulationUnavailable),
    ("16", Field::DriverBrakePressure),
];

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Status,
    /// Field number without a value
    Select(Field),
    /// Field number followed by a raw value
    Assign(Field, &'a str),
}

/// Console-level errors, reported back to the operator and never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("Unknown command '{0}'. Type H for help.")]
    UnknownCommand(String),

    #[error("{signal}: '{input}' is not a number")]
    Malformed { signal: &'static str, input: String },

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// First word of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Help,
    Status,
    Field(Field),
}

fn field_for_command(number: &str) -> Option<Field> {
    FIELD_COMMANDS
        .iter()
        .find(|(candidate, _)| *candidate == number)
        .map(|&(_, field)| field)
}

fn keyword(input: &mut &str) -> Result<Keyword, ContextError> {
    alt((
        alt((Caseless("help"), Caseless("h"))).value(Keyword::Help),
        Caseless("s").value(Keyword::Status),
        // Whole digit run, so "10" and "16" are never taken for "1"
        digit1.verify_map(field_for_command).map(Keyword::Field),
    ))
    .parse_next(input)
}

fn end_of_word(input: &mut &str) -> Result<(), ContextError> {
    peek(alt((space1, eof))).void().parse_next(input)
}

/// `<keyword> [<argument>]`, the argument being everything after the first gap
fn command_line<'a>(input: &mut &'a str) -> Result<(Keyword, Option<&'a str>), ContextError> {
    (terminated(keyword, end_of_word), opt(preceded(space1, rest))).parse_next(input)
}

fn decimal(input: &mut &str) -> Result<u32, ContextError> {
    delimited(space0, dec_uint, space0).parse_next(input)
}

/// Parse one console line
///
/// # Errors
///
/// Returns [`ConsoleError::UnknownCommand`] for anything not in the command
/// table, including `H` or `S` followed by an argument
pub fn parse_command(line: &str) -> Result<Command<'_>, ConsoleError> {
    let line = line.trim();
    let unknown = || ConsoleError::UnknownCommand(line.to_string());

    let (keyword, argument) = command_line.parse(line).map_err(|_| unknown())?;
    match (keyword, argument) {
        (Keyword::Help, None) => Ok(Command::Help),
        (Keyword::Status, None) => Ok(Command::Status),
        (Keyword::Field(field), None) => Ok(Command::Select(field)),
        (Keyword::Field(field), Some(raw)) => Ok(Command::Assign(field, raw)),
        (Keyword::Help | Keyword::Status, Some(_)) => Err(unknown()),
    }
}

/// Parse a raw value for `field`, checking it against the field's domain
///
/// The whole input must be a single decimal number.
///
/// # Errors
///
/// - [`ConsoleError::Malformed`] if `input` is not exactly one decimal number
/// - [`ConsoleError::Field`] if the number is outside the field's domain
pub fn parse_value(field: Field, input: &str) -> Result<u8, ConsoleError> {
    let spec = field.spec();
    let raw = decimal.parse(input).map_err(|_| ConsoleError::Malformed {
        signal: spec.signal,
        input: input.trim().to_string(),
    })?;

    u8::try_from(raw)
        .ok()
        .filter(|&v| v <= spec.max)
        .ok_or(ConsoleError::Field(FieldError::OutOfRange {
            signal: spec.signal,
            value: raw,
            max: spec.max,
        }))
}

/// Command number of a field
pub fn command_number(field: Field) -> &'static str {
    FIELD_COMMANDS
        .iter()
        .find(|&&(_, f)| f == field)
        .map(|&(number, _)| number)
        .unwrap_or("?")
}

/// Help text: commands, fields and their ranges
pub fn help_lines() -> Vec<String> {
    let mut lines = vec![
        "===== ESP_33 Emulator =====".to_string(),
        "H. Help".to_string(),
        "S. Status".to_string(),
    ];

    for (number, field) in FIELD_COMMANDS {
        let spec = field.spec();
        let verb = if field.is_flag() { "Toggle" } else { "Set" };
        lines.push(format!("{}. {} {} (0-{})", number, verb, spec.signal, spec.max));
    }

    lines.push("Use '<n> <value>' to set a field directly.".to_string());
    lines
}

/// Status text: every field plus the checksum
///
/// The checksum is recomputed from the current fields. When it differs from
/// the byte last stored by the encoder, that byte is shown too.
pub fn status_lines(frame: &Esp33Frame) -> Vec<String> {
    let current = xor_checksum(frame.as_bytes());
    let stored = frame.checksum();
    let checksum = if current == stored {
        format!("ESP_33_CHK: 0x{:02X}", current)
    } else {
        format!("ESP_33_CHK: 0x{:02X} (last sent 0x{:02X})", current, stored)
    };
    let mut lines = vec![checksum];

    for field in Field::ALL {
        let value = frame.get(field);
        match field.value_labels().get(usize::from(value)) {
            Some(label) => lines.push(format!("{}: {} ({})", field.signal(), value, label)),
            None => lines.push(format!("{}: {}", field.signal(), value)),
        }
    }

    lines
}

/// Value table printed when a level field is selected without a value
pub fn value_prompt(field: Field) -> Vec<String> {
    let spec = field.spec();
    let mut lines = vec![format!("Write value 0-{} for {}:", spec.max, spec.signal)];
    lines.extend(
        field
            .value_labels()
            .iter()
            .enumerate()
            .map(|(value, label)| format!("{}: {}", value, label)),
    );
    lines
}

//! # Development Console
//!
//! Line-oriented operator interface for manual field overrides.
//!
//! Input is read by a background task and handed to the control loop through
//! a channel, so the loop only ever polls for a line and never waits for one.
//! A level field selected without a value is kept pending and the next line
//! is taken as its value.

pub mod commands;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame::protocol::Field;
use crate::frame::Esp33Frame;
use commands::{help_lines, parse_command, parse_value, status_lines, value_prompt, Command, ConsoleError};

/// Lines buffered between the stdin reader and the control loop
pub const CONSOLE_CHANNEL_CAPACITY: usize = 16;

/// Console session state.
#[derive(Debug, Default)]
pub struct Console {
    /// Level field waiting for its value on the next line
    pending: Option<Field>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field waiting for a value, if any.
    pub fn pending(&self) -> Option<Field> {
        self.pending
    }

    /// Handle one input line and return the response lines
    ///
    /// Never fails: every problem is turned into a diagnostic line and the
    /// frame is left unchanged.
    pub fn handle_line(&mut self, line: &str, frame: &mut Esp33Frame) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let result = match self.pending.take() {
            Some(field) => apply_value(field, line, frame),
            None => self.dispatch(line, frame),
        };

        result.unwrap_or_else(|e| {
            warn!("Console: {}", e);
            vec![format!("Error: {}", e)]
        })
    }

    fn dispatch(&mut self, line: &str, frame: &mut Esp33Frame) -> Result<Vec<String>, ConsoleError> {
        match parse_command(line)? {
            Command::Help => Ok(help_lines()),
            Command::Status => Ok(status_lines(frame)),
            Command::Assign(field, raw) => apply_value(field, raw, frame),
            Command::Select(field) if field.is_flag() => {
                let toggled = frame.get(field) ^ 1;
                apply(field, toggled, frame)
            }
            Command::Select(field) => {
                self.pending = Some(field);
                Ok(value_prompt(field))
            }
        }
    }
}

fn apply_value(field: Field, raw: &str, frame: &mut Esp33Frame) -> Result<Vec<String>, ConsoleError> {
    let value = parse_value(field, raw)?;
    apply(field, value, frame)
}

fn apply(field: Field, value: u8, frame: &mut Esp33Frame) -> Result<Vec<String>, ConsoleError> {
    frame.set(field, value)?;
    info!("Console set {} = {}", field.signal(), value);
    Ok(vec![format!("{} set to: {}", field.signal(), value)])
}

/// Spawn a task forwarding stdin lines to the returned channel
///
/// The task ends when stdin closes or the receiver is dropped.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(CONSOLE_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Console input closed");
                    break;
                }
                Err(e) => {
                    warn!("Console read error: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

//! # ESP_33 Frame Module
//!
//! In-memory model and encoding rules of the emulated `ESP_33` CAN message.
//!
//! This module handles:
//! - Wire layout of every signal (byte, mask, shift, domain)
//! - Range-checked field accessors over the 8-byte buffer
//! - Rolling counter (`ESP_33_BZ`) advancement
//! - XOR checksum (`ESP_33_CHK`) calculation

pub mod protocol;
pub mod model;
pub mod codec;

pub use model::Esp33Frame;
pub use protocol::{Field, FrameBytes};

//! # ESP_33 Emulator Library
//!
//! Keeps a brake-assist module fault-free by continuously broadcasting the
//! `ESP_33` status message its stability-control unit would normally send.
//!
//! This library provides the frame model and codec, the broadcast scheduler
//! with its retry policy, the watchdog supervisor and the SLCAN transport
//! used to put the frame on the CAN bus.

pub mod config;
pub mod console;
pub mod error;
pub mod frame;
pub mod host;
pub mod runtime;
pub mod scheduler;
pub mod serial;
pub mod supervisor;
pub mod transport;

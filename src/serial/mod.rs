//! # Serial Communication Module
//!
//! Handles the USB-CAN adapter that carries ESP_33 onto the vehicle bus.
//!
//! This module handles:
//! - Opening the adapter's serial port (8N1, no flow control)
//! - SLCAN channel bring-up (close, select bitrate, open)
//! - Transmitting ESP_33 frames and checking the adapter's reply
//! - Discarding bus traffic the adapter forwards while the channel is open

pub mod port_trait;
pub mod slcan;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{EmulatorError, Result};
use crate::frame::FrameBytes;
use crate::transport::CanTransport;
use port_trait::{SerialPortIO, TokioSerialPort};
use slcan::Reply;

/// Port value that makes the transport try each of [`DEFAULT_DEVICE_PATHS`]
pub const AUTO_DETECT_PORT: &str = "auto";

/// Default adapter device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC adapters (CANable, CANtact)
    "/dev/ttyUSB0", // FTDI based adapters (USBtin, Lawicel CANUSB)
];

/// Bytes requested per serial read
const READ_CHUNK: usize = 256;

/// Unterminated input beyond this is garbage and gets dropped
const RX_BUFFER_LIMIT: usize = 4096;

/// CAN transport over an SLCAN adapter
///
/// Generic over the serial port so the bring-up sequence, reply handling and
/// frame encoding can be tested without hardware.
pub struct SlcanTransport<P: SerialPortIO = TokioSerialPort> {
    port: P,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
    /// Zero disables reply checking
    reply_timeout: Duration,
    /// Adapter output not yet split into replies
    rx_buffer: Vec<u8>,
    /// Bus frames forwarded by the adapter and discarded
    frames_received: u64,
}

impl<P: SerialPortIO> std::fmt::Debug for SlcanTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlcanTransport")
            .field("device_path", &self.device_path)
            .field("reply_timeout", &self.reply_timeout)
            .field("frames_received", &self.frames_received)
            .finish_non_exhaustive()
    }
}

impl SlcanTransport<TokioSerialPort> {
    /// Open the adapter described by the transport configuration
    ///
    /// With `port = "auto"` the default device paths are tried in order.
    ///
    /// # Errors
    ///
    /// Returns error if no device can be opened or the SLCAN bring-up fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use esp33_emulator::config::TransportConfig;
    /// use esp33_emulator::serial::SlcanTransport;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let transport = SlcanTransport::open(&TransportConfig::default()).await?;
    ///     println!("Connected to: {}", transport.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: &TransportConfig) -> Result<Self> {
        let configured = [config.port.as_str()];
        let paths: &[&str] = if config.port == AUTO_DETECT_PORT {
            DEFAULT_DEVICE_PATHS
        } else {
            &configured
        };

        let (stream, device_path) = Self::open_with_paths(paths, config.baud_rate)?;
        SlcanTransport::with_port(TokioSerialPort::new(stream), device_path, config).await
    }

    /// Try each path in turn and return the first port that opens
    fn open_with_paths(
        paths: &[&str],
        baud_rate: u32,
    ) -> Result<(tokio_serial::SerialStream, String)> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened CAN adapter at {}", path);
                    return Ok((port, path.to_string()));
                }
                Err(e) => warn!("Failed to open {}: {}", path, e),
            }
        }

        Err(EmulatorError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| EmulatorError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}

impl<P: SerialPortIO> SlcanTransport<P> {
    /// Bring up the SLCAN channel on an already opened port
    ///
    /// Sends close, bitrate and open commands. The close comes first so a
    /// channel left open by a previous run is reset before reconfiguring; an
    /// adapter whose channel is already closed rejects it, which is ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the bitrate is unsupported, a write fails, or the
    /// adapter rejects or does not answer the bitrate or open command
    pub async fn with_port(port: P, device_path: String, config: &TransportConfig) -> Result<Self> {
        let bitrate = slcan::bitrate_command(config.can_bitrate)?;

        let mut transport = Self {
            port,
            device_path,
            reply_timeout: config.reply_timeout(),
            rx_buffer: Vec::new(),
            frames_received: 0,
        };

        match transport.command(slcan::SLCAN_CLOSE).await {
            Err(EmulatorError::Slcan(reason)) => debug!("Close before bring-up: {}", reason),
            other => other?,
        }
        transport.command(&bitrate).await?;
        transport.command(slcan::SLCAN_OPEN).await?;

        info!(
            "SLCAN channel open on {} at {} bit/s",
            transport.device_path, config.can_bitrate
        );
        Ok(transport)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Bus frames forwarded by the adapter since bring-up.
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Write one command and wait for the adapter's verdict
    async fn command(&mut self, line: &[u8]) -> Result<()> {
        self.port
            .write_all(line)
            .await
            .map_err(|e| EmulatorError::Serial(format!("Failed to write command: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| EmulatorError::Serial(format!("Failed to flush serial port: {}", e)))?;

        if self.reply_timeout.is_zero() {
            self.drain_input().await
        } else {
            self.await_reply().await
        }
    }

    /// Read until an ack or BEL arrives, skipping forwarded bus frames
    async fn await_reply(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.reply_timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(reply) = slcan::take_reply(&mut self.rx_buffer) {
                match reply {
                    Reply::Ack => return Ok(()),
                    Reply::Nack => {
                        return Err(EmulatorError::Slcan("Adapter rejected command".to_string()))
                    }
                    Reply::Received => self.frames_received += 1,
                    Reply::Other(line) => {
                        debug!("Ignoring adapter output {:?}", String::from_utf8_lossy(&line))
                    }
                }
            }

            let read = timeout_at(deadline, self.port.read(&mut chunk)).await;
            match read {
                Ok(Ok(0)) => return Err(EmulatorError::Serial("Serial port closed".to_string())),
                Ok(Ok(n)) => self.buffer_input(&chunk[..n]),
                Ok(Err(e)) => {
                    return Err(EmulatorError::Serial(format!("Failed to read reply: {}", e)))
                }
                Err(_) => {
                    return Err(EmulatorError::Slcan(format!(
                        "No reply within {} ms",
                        self.reply_timeout.as_millis()
                    )))
                }
            }
        }
    }

    /// Discard whatever input is already waiting, without blocking
    async fn drain_input(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];

        // A zero timeout still polls the read once
        while let Ok(read) = timeout(Duration::ZERO, self.port.read(&mut chunk)).await {
            let n = read.map_err(|e| EmulatorError::Serial(format!("Failed to read: {}", e)))?;
            if n == 0 {
                break;
            }
            self.buffer_input(&chunk[..n]);
        }

        while let Some(reply) = slcan::take_reply(&mut self.rx_buffer) {
            if matches!(reply, Reply::Received) {
                self.frames_received += 1;
            }
        }
        Ok(())
    }

    fn buffer_input(&mut self, bytes: &[u8]) {
        self.rx_buffer.extend_from_slice(bytes);
        if self.rx_buffer.len() > RX_BUFFER_LIMIT {
            warn!("Dropping {} bytes of unterminated adapter output", self.rx_buffer.len());
            self.rx_buffer.clear();
        }
    }
}

#[async_trait]
impl<P: SerialPortIO> CanTransport for SlcanTransport<P> {
    async fn send_frame(&mut self, id: u16, payload: &FrameBytes) -> Result<()> {
        let line = slcan::encode_transmit(id, payload)?;
        self.command(&line).await?;
        debug!("Sent CAN frame 0x{:03X} ({} bytes)", id, payload.len());
        Ok(())
    }
}

//! Byte-level access to the adapter's serial line, behind a trait so the
//! SLCAN layer can run against a scripted port in tests.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialStream;

/// Duplex byte stream to an SLCAN adapter
#[async_trait]
pub trait SerialPortIO: Send {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    /// Read whatever the adapter has sent so far into `buf`.
    ///
    /// Waits until at least one byte is available. `Ok(0)` means the port
    /// was closed.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Serial device opened through `tokio-serial`
pub struct TokioSerialPort {
    stream: SerialStream,
}

impl TokioSerialPort {
    pub fn new(stream: SerialStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.stream, data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.stream).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(&mut self.stream, buf).await
    }
}

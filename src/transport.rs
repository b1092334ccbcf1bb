//! # CAN Transport
//!
//! Seam between the broadcast loop and whatever physically puts a frame on
//! the bus. The loop only ever sees success or failure.

use async_trait::async_trait;

use crate::error::Result;
use crate::frame::FrameBytes;

/// Sends classic 8-byte CAN data frames.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CanTransport: Send {
    /// Transmit one standard-identifier frame.
    ///
    /// # Errors
    ///
    /// Any error means the frame may not have reached the bus; the caller
    /// counts it as a failed attempt.
    async fn send_frame(&mut self, id: u16, payload: &FrameBytes) -> Result<()>;
}

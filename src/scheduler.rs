//! # Broadcast Scheduler
//!
//! Decides once per control-loop tick whether ESP_33 is due, encodes and
//! sends it, and counts consecutive transmission failures.
//!
//! ```text
//!            elapsed < period
//!          +-----------------+
//!          v                 |
//!  start -> Idle --due--> encode + send --ok--> Idle (failures = 0)
//!                                 |
//!                                 +--err--> failures += 1
//!                                             |
//!                           failures >= max --+--> Faulted (terminal)
//! ```
//!
//! Faulted never recovers on its own: the caller must restart the process.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::BroadcastConfig;
use crate::frame::codec::encode;
use crate::frame::Esp33Frame;
use crate::transport::CanTransport;

/// Result of one scheduler poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not due yet; nothing sent
    Idle,
    /// Frame sent with the given rolling counter
    Sent { counter: u8 },
    /// Send failed, still below the retry threshold
    Failed { failures: u8 },
    /// Send failed and the retry threshold was reached on this poll
    Faulted { failures: u8 },
    /// Already faulted earlier; nothing sent
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Faulted,
}

/// Rate-limited ESP_33 sender with a bounded-retry failure policy.
#[derive(Debug)]
pub struct BroadcastScheduler {
    can_id: u16,
    period: Duration,
    max_retry_count: u8,
    last_attempt: Instant,
    consecutive_failures: u8,
    state: State,
}

impl BroadcastScheduler {
    /// Creates an idle scheduler whose first send falls due one period after `start`.
    pub fn new(config: &BroadcastConfig, start: Instant) -> Self {
        Self {
            can_id: config.can_id,
            period: config.period(),
            max_retry_count: config.max_retry_count.max(1),
            last_attempt: start,
            consecutive_failures: 0,
            state: State::Idle,
        }
    }

    /// Consecutive failed sends since the last success.
    pub fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    /// True once the retry threshold has been reached.
    pub fn is_faulted(&self) -> bool {
        self.state == State::Faulted
    }

    /// Time of the last transmission attempt, successful or not.
    pub fn last_attempt(&self) -> Instant {
        self.last_attempt
    }

    /// True when at least one period has elapsed since the last attempt.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_attempt) >= self.period
    }

    /// Run one scheduling step
    ///
    /// When due, the frame is encoded (counter + checksum) and handed to the
    /// transport. The attempt time is recorded whatever the outcome.
    ///
    /// # Arguments
    ///
    /// * `now` - Current time of the control loop
    /// * `frame` - The emulated message, mutated by the encode step
    /// * `transport` - Where the encoded bytes go
    ///
    /// # Returns
    ///
    /// * `TickOutcome` - What happened; `Faulted` is reported exactly once
    pub async fn poll<T>(&mut self, now: Instant, frame: &mut Esp33Frame, transport: &mut T) -> TickOutcome
    where
        T: CanTransport + ?Sized,
    {
        if self.state == State::Faulted {
            return TickOutcome::Halted;
        }

        if !self.is_due(now) {
            return TickOutcome::Idle;
        }

        let payload = encode(frame);
        let result = transport.send_frame(self.can_id, &payload).await;
        self.last_attempt = now;

        match result {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    debug!(
                        "ESP_33 send recovered after {} failed attempt(s)",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                TickOutcome::Sent {
                    counter: frame.rolling_counter(),
                }
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    "ESP_33 send failed ({}/{}): {}",
                    self.consecutive_failures, self.max_retry_count, e
                );

                if self.consecutive_failures >= self.max_retry_count {
                    self.state = State::Faulted;
                    error!(
                        "ESP_33 failed {} times in a row, restart required",
                        self.consecutive_failures
                    );
                    TickOutcome::Faulted {
                        failures: self.consecutive_failures,
                    }
                } else {
                    TickOutcome::Failed {
                        failures: self.consecutive_failures,
                    }
                }
            }
        }
    }
}

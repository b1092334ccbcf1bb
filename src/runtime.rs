//! # Control Loop
//!
//! Owns all emulator state and runs the tick-driven loop:
//!
//! 1. poll the broadcast scheduler (encode + send when due)
//! 2. on a broadcast fault, stop at once and ask for a restart (no heartbeat)
//! 3. service at most one pending console line, without waiting for input
//! 4. feed the watchdog

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;
use crate::console::Console;
use crate::frame::Esp33Frame;
use crate::scheduler::{BroadcastScheduler, TickOutcome};
use crate::supervisor::{RecoverySupervisor, RestartRequest, Watchdog};
use crate::transport::CanTransport;

/// Number of sent frames between status log messages
const LOG_INTERVAL_FRAMES: u64 = 1000;

/// Result of a single control-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Restart,
}

/// Why the control loop ended.
#[derive(Debug)]
pub enum LoopExit {
    /// Shutdown signal received
    Shutdown,
    /// Broadcast fault; the process must be restarted
    Restart(RestartRequest),
}

/// Development console attached to the loop.
struct ConsoleLink {
    console: Console,
    input: mpsc::Receiver<String>,
    output: Box<dyn FnMut(&str) + Send>,
}

/// ESP_33 emulator state and control loop.
pub struct Emulator<T: CanTransport, W: Watchdog> {
    frame: Esp33Frame,
    scheduler: BroadcastScheduler,
    supervisor: RecoverySupervisor<W>,
    transport: T,
    console: Option<ConsoleLink>,
    tick: Duration,
    frames_sent: u64,
}

impl<T: CanTransport, W: Watchdog + 'static> Emulator<T, W> {
    /// Build the emulator with a zeroed frame and arm the watchdog.
    pub fn new(config: &Config, transport: T, watchdog: W, start: Instant) -> Self {
        Self {
            frame: Esp33Frame::new(),
            scheduler: BroadcastScheduler::new(&config.broadcast, start),
            supervisor: RecoverySupervisor::new(watchdog, config.watchdog_timeout()),
            transport,
            console: None,
            tick: config.broadcast.tick(),
            frames_sent: 0,
        }
    }

    /// Attach a console fed by `input`; responses go to `output` line by line.
    pub fn attach_console<F>(&mut self, input: mpsc::Receiver<String>, output: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.console = Some(ConsoleLink {
            console: Console::new(),
            input,
            output: Box::new(output),
        });
    }

    pub fn frame(&self) -> &Esp33Frame {
        &self.frame
    }

    pub fn scheduler(&self) -> &BroadcastScheduler {
        &self.scheduler
    }

    pub fn supervisor(&self) -> &RecoverySupervisor<W> {
        &self.supervisor
    }

    /// Run one control-loop iteration at time `now`.
    pub async fn step(&mut self, now: Instant) -> Step {
        match self.scheduler.poll(now, &mut self.frame, &mut self.transport).await {
            TickOutcome::Faulted { .. } | TickOutcome::Halted => return Step::Restart,
            TickOutcome::Sent { counter } => {
                self.frames_sent += 1;
                if self.frames_sent % LOG_INTERVAL_FRAMES == 0 {
                    info!("Sent {} ESP_33 frames (counter {})", self.frames_sent, counter);
                }
            }
            TickOutcome::Failed { .. } | TickOutcome::Idle => {}
        }

        self.service_console();
        self.supervisor.heartbeat();
        Step::Continue
    }

    fn service_console(&mut self) {
        let Some(link) = self.console.as_mut() else {
            return;
        };

        if let Ok(line) = link.input.try_recv() {
            debug!("Console input: {:?}", line);
            for response in link.console.handle_line(&line, &mut self.frame) {
                (link.output)(&response);
            }
        }
    }

    /// Run the loop until a fault or until `shutdown` completes
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn demo(emulator: esp33_emulator::runtime::Emulator<
    /// #     esp33_emulator::serial::SlcanTransport,
    /// #     esp33_emulator::supervisor::ThreadWatchdog,
    /// # >) {
    /// use esp33_emulator::runtime::LoopExit;
    ///
    /// match emulator.run(tokio::signal::ctrl_c()).await {
    ///     LoopExit::Shutdown => println!("bye"),
    ///     LoopExit::Restart(request) => esp33_emulator::host::restart(request),
    /// }
    /// # }
    /// ```
    pub async fn run<S: Future>(mut self, shutdown: S) -> LoopExit {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Control loop running (tick {} ms)", self.tick.as_millis());

        loop {
            let step = tokio::select! {
                _ = ticker.tick() => self.step(Instant::now()).await,
                _ = &mut shutdown => {
                    info!("Shutdown requested after {} frames", self.frames_sent);
                    return LoopExit::Shutdown;
                }
            };

            if step == Step::Restart {
                return LoopExit::Restart(self.supervisor.force_restart());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmulatorError;
    use crate::frame::codec::xor_checksum;
    use crate::supervisor::MockWatchdog;
    use crate::transport::MockCanTransport;
    use std::sync::{Arc, Mutex};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.broadcast.period_ms = 200;
        config.broadcast.tick_ms = 10;
        config.broadcast.max_retry_count = 7;
        config
    }

    fn watchdog(resets: usize) -> MockWatchdog {
        let mut watchdog = MockWatchdog::new();
        watchdog.expect_arm().times(1).return_const(());
        watchdog.expect_reset().times(resets).return_const(());
        watchdog
    }

    #[tokio::test]
    async fn test_step_feeds_watchdog_when_healthy() {
        let start = Instant::now();
        let mut transport = MockCanTransport::new();
        transport.expect_send_frame().times(1).returning(|_, _| Ok(()));

        let mut emulator = Emulator::new(&test_config(), transport, watchdog(3), start);

        assert_eq!(emulator.step(start + Duration::from_millis(10)).await, Step::Continue);
        assert_eq!(emulator.step(start + Duration::from_millis(200)).await, Step::Continue);
        assert_eq!(emulator.step(start + Duration::from_millis(210)).await, Step::Continue);

        assert_eq!(emulator.supervisor().heartbeats(), 3);
        assert_eq!(emulator.frame().rolling_counter(), 1);
    }

    #[tokio::test]
    async fn test_step_on_fault_skips_heartbeat() {
        let start = Instant::now();
        let mut config = test_config();
        config.broadcast.max_retry_count = 2;

        let mut transport = MockCanTransport::new();
        transport
            .expect_send_frame()
            .times(2)
            .returning(|_, _| Err(EmulatorError::Serial("bus off".to_string())));

        // Only the first (non-faulting) step may feed the watchdog
        let mut emulator = Emulator::new(&config, transport, watchdog(1), start);

        assert_eq!(emulator.step(start + Duration::from_millis(200)).await, Step::Continue);
        assert_eq!(emulator.step(start + Duration::from_millis(400)).await, Step::Restart);
        assert_eq!(emulator.supervisor().heartbeats(), 1);
    }

    #[tokio::test]
    async fn test_console_line_applied_between_sends() {
        let start = Instant::now();
        let mut transport = MockCanTransport::new();
        transport
            .expect_send_frame()
            .withf(|_, payload| payload[2] == 0x40 && payload[0] == xor_checksum(payload))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut emulator = Emulator::new(&test_config(), transport, watchdog(2), start);

        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        let (tx, rx) = mpsc::channel(4);
        emulator.attach_console(rx, move |line| sink.lock().unwrap().push(line.to_string()));

        tx.send("3 4".to_string()).await.unwrap();
        emulator.step(start + Duration::from_millis(10)).await;
        emulator.step(start + Duration::from_millis(200)).await;

        assert_eq!(
            *output.lock().unwrap(),
            vec!["ESC_Warnruck_aktiv set to: 4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_console_services_one_line_per_tick() {
        let start = Instant::now();
        let transport = MockCanTransport::new();
        let mut emulator = Emulator::new(&test_config(), transport, watchdog(2), start);

        let (tx, rx) = mpsc::channel(4);
        emulator.attach_console(rx, |_| {});
        tx.send("5".to_string()).await.unwrap();
        tx.send("16".to_string()).await.unwrap();

        emulator.step(start).await;
        assert!(emulator.frame().prefill_active());
        assert!(!emulator.frame().driver_brake_pressure());

        emulator.step(start).await;
        assert!(emulator.frame().driver_brake_pressure());
    }

    #[tokio::test]
    async fn test_step_without_console_input_does_not_block() {
        let start = Instant::now();
        let transport = MockCanTransport::new();
        let mut emulator = Emulator::new(&test_config(), transport, watchdog(1), start);

        let (_tx, rx) = mpsc::channel::<String>(4);
        emulator.attach_console(rx, |_| {});

        assert_eq!(emulator.step(start).await, Step::Continue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_restart_after_max_failures() {
        let mut transport = MockCanTransport::new();
        transport
            .expect_send_frame()
            .times(7)
            .returning(|_, _| Err(EmulatorError::Serial("no ack".to_string())));

        let mut watchdog = MockWatchdog::new();
        watchdog.expect_arm().times(1).return_const(());
        watchdog.expect_reset().return_const(());

        let emulator = Emulator::new(&test_config(), transport, watchdog, Instant::now());
        let exit = emulator.run(std::future::pending::<()>()).await;

        assert!(matches!(exit, LoopExit::Restart(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let mut transport = MockCanTransport::new();
        transport.expect_send_frame().returning(|_, _| Ok(()));

        let mut watchdog = MockWatchdog::new();
        watchdog.expect_arm().times(1).return_const(());
        watchdog.expect_reset().return_const(());

        let emulator = Emulator::new(&test_config(), transport, watchdog, Instant::now());
        let exit = emulator
            .run(tokio::time::sleep(Duration::from_millis(1000)))
            .await;

        assert!(matches!(exit, LoopExit::Shutdown));
    }
}

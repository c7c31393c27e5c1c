//! Ping watchdog.
//!
//! Once started, the client must send `Ping` at least every
//! `max_ping_interval`.  If the deadline passes the session is marked timed
//! out, every device is stopped, and an `ERROR_PING` error with id 0 is
//! published.  A timed-out session never recovers.
//!
//! A zero interval disables the watchdog: [`PingTimer::start`] does nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use intercom_core::{ErrorClass, Message, SessionState, SERVER_MESSAGE_ID};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::application::device::DeviceHandler;
use crate::application::lock;
use crate::application::outgoing::OutgoingChannel;

pub struct PingTimer {
    max_interval: Duration,
    last_ping: Arc<Mutex<Instant>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PingTimer {
    pub fn new(max_interval: Duration) -> Self {
        Self {
            max_interval,
            last_ping: Arc::new(Mutex::new(Instant::now())),
            task: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.max_interval.is_zero()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts the watchdog task.  A second call while running is ignored.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        session: Arc<SessionState>,
        outgoing: Arc<OutgoingChannel>,
        devices: Arc<dyn DeviceHandler>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }

        *lock(&self.last_ping) = Instant::now();
        let last_ping = Arc::clone(&self.last_ping);
        let max_interval = self.max_interval;

        *task = Some(tokio::spawn(async move {
            loop {
                let deadline = *lock(&last_ping) + max_interval;
                time::sleep_until(deadline).await;
                // A ping may have moved the deadline while we slept.
                if *lock(&last_ping) + max_interval > Instant::now() {
                    continue;
                }
                break;
            }

            if !session.mark_ping_timed_out() {
                return;
            }
            warn!(
                interval_ms = max_interval.as_millis() as u64,
                "client ping timed out, stopping all devices"
            );
            devices.stop_all_devices().await;
            outgoing.publish(Message::error(
                SERVER_MESSAGE_ID,
                ErrorClass::Ping,
                "ping timed out",
            ));
        }));
        debug!(interval_ms = max_interval.as_millis() as u64, "ping watchdog started");
    }

    /// Resets the deadline.
    pub fn ping(&self) {
        *lock(&self.last_ping) = Instant::now();
    }

    /// Cancels the watchdog task if it is running.
    pub fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

impl Drop for PingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::device::MockDeviceHandler;

    fn negotiated() -> (Arc<SessionState>, Arc<OutgoingChannel>) {
        let session = Arc::new(SessionState::new());
        session.complete_handshake("test", 3).unwrap();
        let outgoing = Arc::new(OutgoingChannel::new(Arc::clone(&session)));
        (session, outgoing)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_session_stops_devices_and_publishes_error() {
        // Arrange
        let (session, outgoing) = negotiated();
        let mut rx = outgoing.subscribe();
        let mut devices = MockDeviceHandler::new();
        devices.expect_stop_all_devices().times(1).return_const(());
        let timer = PingTimer::new(Duration::from_millis(100));

        // Act
        timer.start(Arc::clone(&session), outgoing, Arc::new(devices));
        time::sleep(Duration::from_millis(150)).await;

        // Assert
        match rx.recv().await {
            Some(Message::Error(err)) => {
                assert_eq!(err.id, SERVER_MESSAGE_ID);
                assert_eq!(err.class, ErrorClass::Ping);
            }
            other => panic!("expected ping error, got {other:?}"),
        }
        assert!(session.is_ping_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_pings_keep_session_alive() {
        let (session, outgoing) = negotiated();
        let mut devices = MockDeviceHandler::new();
        devices.expect_stop_all_devices().never();
        let timer = PingTimer::new(Duration::from_millis(100));
        timer.start(Arc::clone(&session), outgoing, Arc::new(devices));

        for _ in 0..5 {
            time::sleep(Duration::from_millis(60)).await;
            timer.ping();
        }

        assert!(!session.is_ping_timed_out());
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_starts() {
        let (session, outgoing) = negotiated();
        let timer = PingTimer::new(Duration::ZERO);
        timer.start(Arc::clone(&session), outgoing, Arc::new(MockDeviceHandler::new()));

        time::sleep(Duration::from_secs(60)).await;

        assert!(!timer.is_enabled());
        assert!(!timer.is_running());
        assert!(!session.is_ping_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_timeout() {
        let (session, outgoing) = negotiated();
        let mut devices = MockDeviceHandler::new();
        devices.expect_stop_all_devices().never();
        let timer = PingTimer::new(Duration::from_millis(100));
        timer.start(Arc::clone(&session), outgoing, Arc::new(devices));

        timer.stop();
        time::sleep(Duration::from_millis(500)).await;

        assert!(!session.is_ping_timed_out());
    }
}

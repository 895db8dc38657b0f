use std::time::Duration;

use derive_more::derive::Display;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RefreshTrigger {
    #[display("startup")]
    Startup,
    #[display("timer")]
    Timer,
    #[display("device state change")]
    DeviceStateChanged,
    #[display("api request")]
    Api,
}

/// Periodic refresh of one sensor. A zero interval disables the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub interval: Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl RefreshSchedule {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn timer(&self) -> Option<Interval> {
        if self.interval.is_zero() {
            return None;
        }

        let mut timer = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }
}

/// Sending side of a sensor's refresh channel.
///
/// The channel holds a single pending request, so requests arriving while one is pending collapse into it.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshTrigger>,
}

pub struct RefreshQueue {
    rx: mpsc::Receiver<RefreshTrigger>,
}

pub fn refresh_channel() -> (RefreshHandle, RefreshQueue) {
    let (tx, rx) = mpsc::channel(1);
    (RefreshHandle { tx }, RefreshQueue { rx })
}

impl RefreshHandle {
    pub fn request(&self, trigger: RefreshTrigger) {
        match self.tx.try_send(trigger) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Refresh already pending, dropping request from {}", trigger);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Refresh requested from {} for a sensor that is not running", trigger);
            }
        }
    }
}

impl RefreshQueue {
    pub async fn recv(&mut self) -> RefreshTrigger {
        match self.rx.recv().await {
            Some(trigger) => trigger,
            //unreachable while the runner lives, its binding holds a sender
            None => std::future::pending().await,
        }
    }

    /// Drops a pending request. Used right before a cycle starts, as that cycle serves it.
    pub fn clear(&mut self) -> Option<RefreshTrigger> {
        self.rx.try_recv().ok()
    }
}

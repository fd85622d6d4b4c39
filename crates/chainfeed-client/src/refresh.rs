/*
[INPUT]:  Refresh period; start/stop requests from the subscription registry
[OUTPUT]: Recurring refresh ticks while a subscription is live
[POS]:    Scheduling layer - demand-driven refresh timer
[UPDATE]: When changing refresh cadence or missed-tick behaviour
*/

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

// interval_at panics on a zero period
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Owns the single refresh timer.
///
/// The immediate refresh on (re)subscription is issued by the registry when it
/// calls `start`; the timer only produces the recurring ticks after that.
#[derive(Debug)]
pub struct RefreshScheduler {
    period: Duration,
    timer: Option<Interval>,
}

impl RefreshScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_REFRESH_INTERVAL),
            timer: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the timer; the first tick fires one period from now. Replaces a live timer.
    pub fn start(&mut self) {
        let mut timer = tokio::time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    /// Cancel the timer. Returns whether one was live.
    pub fn stop(&mut self) -> bool {
        self.timer.take().is_some()
    }

    pub fn is_live(&self) -> bool {
        self.timer.is_some()
    }

    /// Wait for the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

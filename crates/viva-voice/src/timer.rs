//! Countdown Timer
//!
//! Deadline-based: while running, the remaining time is `deadline - now` on the
//! monotonic clock, so pausing and resuming never accumulates tick drift.
//! Expiry is reported once per countdown.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Countdown {
    /// Frozen remaining time while paused or stopped.
    remaining: Duration,
    /// Set while running.
    deadline: Option<Instant>,
    fired: bool,
    stopped: bool,
}

impl Countdown {
    pub fn new(remaining_seconds: u64) -> Self {
        Self {
            remaining: Duration::from_secs(remaining_seconds),
            deadline: None,
            fired: false,
            stopped: false,
        }
    }

    /// Start or resume. No-op once stopped or expired.
    pub fn resume(&mut self) {
        if self.stopped || self.fired || self.deadline.is_some() {
            return;
        }
        self.deadline = Some(Instant::now() + self.remaining);
        debug!("Countdown running, {}s left", self.remaining_seconds());
    }

    /// Freeze the remaining time.
    pub fn pause(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            self.remaining = deadline.saturating_duration_since(Instant::now());
            debug!("Countdown paused, {}s left", self.remaining_seconds());
        }
    }

    /// Freeze permanently; later `resume` calls are ignored.
    pub fn stop(&mut self) {
        self.pause();
        self.stopped = true;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.remaining,
        }
    }

    /// Whole seconds left, rounded up so the display reads 0 only at expiry.
    pub fn remaining_seconds(&self) -> u64 {
        let ms = self.remaining().as_millis() as u64;
        ms.div_ceil(1000)
    }

    /// `true` exactly once, the first time it is called at or after the deadline.
    pub fn check_expired(&mut self) -> bool {
        if self.fired {
            return false;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.fired = true;
                self.deadline = None;
                self.remaining = Duration::ZERO;
                info!("Countdown expired");
                true
            }
            _ => false,
        }
    }

    pub fn has_expired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count_expiries(countdown: &mut Countdown, seconds: u64) -> usize {
        let mut fired = 0;
        for _ in 0..seconds {
            tokio::time::advance(Duration::from_secs(1)).await;
            if countdown.check_expired() {
                fired += 1;
            }
        }
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn sixty_seconds_fires_once() {
        let mut c = Countdown::new(60);
        c.resume();
        assert_eq!(count_expiries(&mut c, 60).await, 1);
        assert_eq!(c.remaining_seconds(), 0);
        assert!(!c.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn one_hundred_twenty_seconds_still_fires_once() {
        let mut c = Countdown::new(60);
        c.resume();
        assert_eq!(count_expiries(&mut c, 120).await, 1);
        assert!(c.has_expired());
        c.resume();
        assert!(!c.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_remaining() {
        let mut c = Countdown::new(30);
        c.resume();
        tokio::time::advance(Duration::from_secs(10)).await;
        c.pause();
        assert_eq!(c.remaining_seconds(), 20);

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(c.remaining_seconds(), 20);
        assert!(!c.check_expired());

        c.resume();
        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(!c.check_expired());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(c.check_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_resume_cycles_do_not_drift() {
        let mut c = Countdown::new(60);
        for _ in 0..10 {
            c.resume();
            tokio::time::advance(Duration::from_millis(2500)).await;
            c.pause();
        }
        assert_eq!(c.remaining(), Duration::from_secs(35));
    }

    #[test]
    fn stopped_countdown_cannot_restart() {
        let mut c = Countdown::new(10);
        c.stop();
        c.resume();
        assert!(!c.is_running());
        assert_eq!(c.remaining_seconds(), 10);
    }
}

use std::time::{Duration, Instant};

/// Update rate in interactive mode. Seconds are displayed, so once a second.
pub const INTERACTIVE_UPDATE_RATE: Duration = Duration::from_secs(1);

/// Time until the next whole wall-clock second. Ticking on second boundaries
/// instead of a fixed interval keeps the displayed seconds from drifting.
pub fn delay_to_next_tick(now_millis: i64) -> Duration {
    let rate = INTERACTIVE_UPDATE_RATE.as_millis() as i64;
    Duration::from_millis((rate - now_millis.rem_euclid(rate)) as u64)
}

/// Proof that a tick was scheduled by the scheduler's current epoch. Ticks
/// from a cancelled schedule carry an old epoch and get dropped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickToken {
    epoch: u64,
}

/// Single repeating redraw timer. The engine polls it for the next deadline
/// and fires the tick itself, so there's no timer thread to clean up.
#[derive(Debug, Default)]
pub struct TickScheduler {
    epoch: u64,
    next: Option<(Instant, TickToken)>,
}

impl TickScheduler {
    /// Stop any pending tick, then start over with an immediate tick if the
    /// timer should be running
    pub fn update(&mut self, should_run: bool, now: Instant) {
        self.cancel();
        if should_run {
            self.schedule_after(Duration::ZERO, now);
        }
    }

    /// Drop the pending tick, and invalidate every token handed out so far
    pub fn cancel(&mut self) {
        self.epoch += 1;
        self.next = None;
    }

    pub fn schedule_after(&mut self, delay: Duration, now: Instant) {
        let token = TickToken { epoch: self.epoch };
        self.next = Some((now + delay, token));
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next.map(|(deadline, _)| deadline)
    }

    /// Take the pending tick if its deadline has passed
    pub fn due(&mut self, now: Instant) -> Option<TickToken> {
        match self.next {
            Some((deadline, token)) if deadline <= now => {
                self.next = None;
                Some(token)
            }
            _ => None,
        }
    }

    /// Was this token issued since the last cancellation?
    pub fn accept(&self, token: TickToken) -> bool {
        token.epoch == self.epoch
    }
}

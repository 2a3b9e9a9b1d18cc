use std::time::{Duration, Instant};

/// Countdown gating the manual refresh action. Decrements once per elapsed
/// second when ticked from the frame loop; reaching zero self-cancels.
/// Remaining time is never negative. Starting while active resets to the new
/// value instead of stacking.
pub struct CooldownTimer {
    remaining_secs: u32,
    last_tick: Option<Instant>,
}

impl CooldownTimer {
    pub fn new() -> Self {
        Self {
            remaining_secs: 0,
            last_tick: None,
        }
    }

    pub fn start(&mut self, seconds: u32, now: Instant) {
        self.remaining_secs = seconds;
        self.last_tick = if seconds > 0 { Some(now) } else { None };
    }

    /// Advance the countdown. Sub-second remainders carry over to the next
    /// tick so the cadence stays one decrement per wall-clock second.
    pub fn tick(&mut self, now: Instant) {
        let Some(last) = self.last_tick else {
            return;
        };
        let elapsed = now.saturating_duration_since(last).as_secs();
        if elapsed == 0 {
            return;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(elapsed as u32);
        if self.remaining_secs == 0 {
            self.last_tick = None;
        } else {
            self.last_tick = Some(last + Duration::from_secs(elapsed));
        }
    }

    pub fn is_active(&self) -> bool {
        self.remaining_secs > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining_secs
    }

    pub fn cancel(&mut self) {
        self.remaining_secs = 0;
        self.last_tick = None;
    }
}

impl Default for CooldownTimer {
    fn default() -> Self {
        Self::new()
    }
}

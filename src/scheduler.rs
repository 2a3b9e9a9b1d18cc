use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use crate::models::DisplayItem;

/// Delay values below this are rejected at arm time and clamped at commit
/// time.
pub const MIN_DELAY_SECS: u64 = 5;

/// Rejected delay input. Blocks only the start action; shown inline next to
/// the delay field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NotANumber,
    BelowMinimum(u64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotANumber => write!(f, "delay must be a whole number of seconds"),
            ValidationError::BelowMinimum(min) => {
                write!(f, "delay must be at least {} seconds", min)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Strict validation of the raw delay input, used by the start action. No
/// clamping here: an out-of-range value is an error, not a correction.
pub fn parse_delay(raw: &str) -> Result<u64, ValidationError> {
    let secs: u64 = raw.trim().parse().map_err(|_| ValidationError::NotANumber)?;
    if secs < MIN_DELAY_SECS {
        return Err(ValidationError::BelowMinimum(MIN_DELAY_SECS));
    }
    Ok(secs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing scheduled.
    Idle,
    /// Waiting out the delay for a specific target item. This variant is the
    /// cancellation handle: dropping it is the only way a deadline dies, so
    /// a cancelled timer can never fire late.
    Armed { target_id: String, deadline: Instant },
    /// The timer fired; the open/mark-visited action is in flight and the
    /// owner must call `reevaluate` next.
    Advancing { target_id: String },
    /// No unvisited items remain.
    Exhausted,
}

/// Steps through unvisited items in list order, one per delay interval.
/// Holds at most one pending deadline at any instant.
pub struct AutoAdvanceScheduler {
    state: SchedulerState,
    delay: Duration,
}

impl AutoAdvanceScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            delay: Duration::ZERO,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, SchedulerState::Armed { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, SchedulerState::Exhausted)
    }

    /// Schedule the first unvisited item in list order. Refuses delays below
    /// the minimum; goes straight to `Exhausted` when every item is visited.
    pub fn arm(
        &mut self,
        items: &[DisplayItem],
        visited: &HashSet<String>,
        delay_secs: u64,
        now: Instant,
    ) -> Result<(), ValidationError> {
        if delay_secs < MIN_DELAY_SECS {
            return Err(ValidationError::BelowMinimum(MIN_DELAY_SECS));
        }
        self.delay = Duration::from_secs(delay_secs);
        self.state = match first_unvisited(items, visited) {
            Some(item) => SchedulerState::Armed {
                target_id: item.id.clone(),
                deadline: now + self.delay,
            },
            None => SchedulerState::Exhausted,
        };
        Ok(())
    }

    /// When armed and the deadline has passed, transition to `Advancing` and
    /// yield the target id. The caller opens the URL, marks the id visited,
    /// then calls `reevaluate`.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        if let SchedulerState::Armed { target_id, deadline } = &self.state {
            if now >= *deadline {
                let fired = target_id.clone();
                self.state = SchedulerState::Advancing {
                    target_id: fired.clone(),
                };
                return Some(fired);
            }
        }
        None
    }

    /// After an advance: re-arm with the same delay when unvisited items
    /// remain, otherwise settle in `Exhausted`.
    pub fn reevaluate(&mut self, items: &[DisplayItem], visited: &HashSet<String>, now: Instant) {
        self.state = match first_unvisited(items, visited) {
            Some(item) => SchedulerState::Armed {
                target_id: item.id.clone(),
                deadline: now + self.delay,
            },
            None => SchedulerState::Exhausted,
        };
    }

    /// Drop any pending deadline synchronously and return to `Idle` without
    /// marking anything visited. Used on mode change, disable, and teardown.
    pub fn cancel(&mut self) {
        self.state = SchedulerState::Idle;
    }
}

impl Default for AutoAdvanceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn first_unvisited<'a>(
    items: &'a [DisplayItem],
    visited: &HashSet<String>,
) -> Option<&'a DisplayItem> {
    items.iter().find(|item| !visited.contains(&item.id))
}

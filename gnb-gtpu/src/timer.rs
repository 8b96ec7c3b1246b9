//! Reordering-timer descriptor.

use std::time::{Duration, Instant};

/// A single-instance timer modelled as `{deadline, generation}`.
///
/// Starting or stopping bumps the generation, so a callback scheduled for
/// an earlier arming can be recognized as stale: it carries the generation
/// returned by [`ReorderingTimer::try_expire`], and the handler compares it
/// (and `is_running`) against the current state before acting.
#[derive(Debug, Clone, Copy)]
pub struct ReorderingTimer {
    duration: Duration,
    deadline: Option<Instant>,
    generation: u64,
}

impl ReorderingTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
            generation: 0,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Arms the timer `duration` from `now`, superseding any prior arming.
    pub fn run(&mut self, now: Instant) {
        self.generation += 1;
        self.deadline = Some(now + self.duration);
    }

    pub fn stop(&mut self) {
        if self.deadline.take().is_some() {
            self.generation += 1;
        }
    }

    /// If the deadline has been reached, disarms the timer and returns the
    /// generation the expiry belongs to; otherwise returns None.
    pub fn try_expire(&mut self, now: Instant) -> Option<u64> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(self.generation)
            }
            _ => None,
        }
    }
}

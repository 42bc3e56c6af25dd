use std::cmp::Ordering;
use std::time::Duration;

use tokio::time::Instant;

/// Where a [ReadinessTimer] stands relative to its deadline.
///
/// Ordered by readiness: any overdue value ranks above any remaining one,
/// more overdue ranks higher and less remaining ranks higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The timeout elapsed this long ago
    Overdue(Duration),
    /// The timeout elapses in this long
    Remaining(Duration),
}

impl Readiness {
    pub fn is_due(&self) -> bool {
        matches!(self, Self::Overdue(_))
    }

    pub fn overdue(&self) -> Option<Duration> {
        match self {
            Self::Overdue(d) => Some(*d),
            Self::Remaining(_) => None,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Overdue(_) => None,
            Self::Remaining(d) => Some(*d),
        }
    }
}

impl Ord for Readiness {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Overdue(a), Self::Overdue(b)) => a.cmp(b),
            (Self::Overdue(_), Self::Remaining(_)) => Ordering::Greater,
            (Self::Remaining(_), Self::Overdue(_)) => Ordering::Less,
            (Self::Remaining(a), Self::Remaining(b)) => b.cmp(a),
        }
    }
}

impl PartialOrd for Readiness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tracks whether `timeout` has elapsed since the timer was last armed.
///
/// A timer that was never armed is due, and ranks as overdue by [Duration::MAX].
#[derive(Debug, Clone)]
pub struct ReadinessTimer {
    timeout: Duration,
    last_armed: Option<Instant>,
}

impl ReadinessTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_armed: None,
        }
    }

    /// A timer armed right away
    pub fn armed(timeout: Duration) -> Self {
        let mut timer = Self::new(timeout);
        timer.arm();
        timer
    }

    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    pub fn arm_at(&mut self, now: Instant) {
        self.last_armed = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.last_armed.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Takes effect on the next readiness check, measured from the last arm.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn due(&self) -> Readiness {
        self.due_at(Instant::now())
    }

    pub fn due_at(&self, now: Instant) -> Readiness {
        let Some(last_armed) = self.last_armed else {
            return Readiness::Overdue(Duration::MAX);
        };
        let Some(deadline) = last_armed.checked_add(self.timeout) else {
            return Readiness::Remaining(Duration::MAX);
        };
        match now.checked_duration_since(deadline) {
            Some(overdue) => Readiness::Overdue(overdue),
            None => Readiness::Remaining(deadline - now),
        }
    }
}

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::time::Duration;

use chanclol_common::{ChanclolError, QuotaRuleConfig};
use tokio::time::Instant;

use crate::consts::ADMISSION_SAFETY_MARGIN;

/// Outcome of evaluating one or more quota rules against the call history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// How long until the request would be allowed. Zero when allowed.
    pub wait: Duration,
}

impl Decision {
    pub const ALLOWED: Self = Self {
        allowed: true,
        wait: Duration::ZERO,
    };

    pub fn denied(wait: Duration) -> Self {
        Self {
            allowed: false,
            wait,
        }
    }

    /// Allowed only if both are, waiting for the longer of the two.
    pub fn merge(self, other: Self) -> Self {
        Self {
            allowed: self.allowed && other.allowed,
            wait: self.wait.max(other.wait),
        }
    }
}

pub fn assert_valid_quota(max_requests: u32, window: Duration) -> Result<NonZeroU32, ChanclolError> {
    match NonZeroU32::new(max_requests) {
        Some(v) if !window.is_zero() => Ok(v),
        _ => Err(ChanclolError::InvalidQuota {
            max_requests,
            window,
        }),
    }
}

/// At most `max_requests` calls within any rolling `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRule {
    max_requests: NonZeroU32,
    window: Duration,
}

impl QuotaRule {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, ChanclolError> {
        Ok(Self {
            max_requests: assert_valid_quota(max_requests, window)?,
            window,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `history` must be sorted oldest first.
    pub fn analyse(&self, history: &VecDeque<Instant>, now: Instant) -> Decision {
        let max_requests = self.max_requests.get() as usize;
        let mut count = 0;
        let mut blocking_entry = None;

        for entry in history.iter().rev() {
            if now.saturating_duration_since(*entry) > self.window {
                break;
            }
            count += 1;
            if count == max_requests {
                // once this one leaves the window, there is room for one more
                blocking_entry = Some(*entry);
            }
        }

        match blocking_entry {
            None => Decision::ALLOWED,
            Some(entry) => {
                let exits_at = entry + self.window;
                Decision::denied(exits_at.saturating_duration_since(now) + ADMISSION_SAFETY_MARGIN)
            }
        }
    }
}

impl TryFrom<&QuotaRuleConfig> for QuotaRule {
    type Error = ChanclolError;

    fn try_from(config: &QuotaRuleConfig) -> Result<Self, Self::Error> {
        Self::new(config.max_requests, config.window)
    }
}

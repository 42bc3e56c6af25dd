use std::time::Duration;

use chanclol_common::{Puuid, SchedulerConfig};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::store::PlayerSnapshot;
use crate::timer::{Readiness, ReadinessTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Believed to be in game, checked often
    Online,
    /// Checked rarely
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub online_timeout: Duration,
    pub offline_timeout: Duration,
    pub offline_threshold: Duration,
}

impl Cadence {
    pub fn timeout(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Online => self.online_timeout,
            Mode::Offline => self.offline_timeout,
        }
    }
}

impl From<&SchedulerConfig> for Cadence {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            online_timeout: config.online_timeout,
            offline_timeout: config.offline_timeout,
            offline_threshold: config.offline_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    puuid: Puuid,
    mode: Mode,
    timer: ReadinessTimer,
    last_seen_online: Option<DateTime<Utc>>,
}

impl Player {
    /// Starts offline and due right away
    pub fn new(puuid: Puuid, cadence: &Cadence) -> Self {
        Self {
            puuid,
            mode: Mode::Offline,
            timer: ReadinessTimer::new(cadence.timeout(Mode::Offline)),
            last_seen_online: None,
        }
    }

    /// Rebuilds a persisted player, armed with the timeout of its mode
    pub fn restore(snapshot: PlayerSnapshot, cadence: &Cadence) -> Self {
        Self {
            puuid: snapshot.puuid,
            mode: snapshot.mode,
            timer: ReadinessTimer::armed(cadence.timeout(snapshot.mode)),
            last_seen_online: snapshot.last_seen_online,
        }
    }

    /// Like [Player::restore], but due right away
    pub fn resume(snapshot: PlayerSnapshot, cadence: &Cadence) -> Self {
        Self {
            puuid: snapshot.puuid,
            mode: snapshot.mode,
            timer: ReadinessTimer::new(cadence.timeout(snapshot.mode)),
            last_seen_online: snapshot.last_seen_online,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            puuid: self.puuid.clone(),
            mode: self.mode,
            last_seen_online: self.last_seen_online,
        }
    }

    pub fn puuid(&self) -> &Puuid {
        &self.puuid
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn timer(&self) -> &ReadinessTimer {
        &self.timer
    }

    #[cfg(test)]
    pub(crate) fn timer_mut(&mut self) -> &mut ReadinessTimer {
        &mut self.timer
    }

    pub fn last_seen_online(&self) -> Option<DateTime<Utc>> {
        self.last_seen_online
    }

    pub fn due_at(&self, now: Instant) -> Readiness {
        self.timer.due_at(now)
    }

    /// Rearms the timer and applies the outcome of a check.
    /// Returns whether the mode changed.
    pub fn record_check(&mut self, in_game: bool, now: DateTime<Utc>, cadence: &Cadence) -> bool {
        self.timer.arm();

        let next = match (self.mode, in_game) {
            (_, true) => {
                self.last_seen_online = Some(now);
                Mode::Online
            }
            (Mode::Online, false) if self.absent_for_at_least(cadence.offline_threshold, now) => {
                Mode::Offline
            }
            (mode, false) => mode,
        };

        if next == self.mode {
            return false;
        }
        self.mode = next;
        self.timer.set_timeout(cadence.timeout(next));
        true
    }

    fn absent_for_at_least(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        match self.last_seen_online {
            None => true,
            Some(seen) => (now - seen).to_std().is_ok_and(|absent| absent >= threshold),
        }
    }
}

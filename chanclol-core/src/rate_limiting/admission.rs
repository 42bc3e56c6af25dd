use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chanclol_common::{ChanclolError, RiotApiConfig};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::rule::{Decision, QuotaRule};
use crate::consts::MIN_ADMISSION_WAIT;
use crate::timer::ReadinessTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Must go through eventually, waits for quota
    Vital,
    /// Gives up as soon as quota is short
    NonVital,
}

#[derive(Debug)]
pub struct AdmissionState {
    rules: Vec<QuotaRule>,
    widest_window: Duration,
    history: VecDeque<Instant>,
    cooldown: ReadinessTimer,
    pending_vital: HashSet<Uuid>,
}

impl AdmissionState {
    fn new(rules: Vec<QuotaRule>, cooldown: Duration) -> Self {
        let widest_window = rules.iter().map(QuotaRule::window).max().unwrap_or_default();
        Self {
            rules,
            widest_window,
            history: VecDeque::new(),
            cooldown: ReadinessTimer::new(cooldown),
            pending_vital: HashSet::new(),
        }
    }

    fn trim(&mut self, now: Instant) {
        while let Some(oldest) = self.history.front() {
            if now.saturating_duration_since(*oldest) > self.widest_window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn evaluate(&mut self, now: Instant) -> Decision {
        self.trim(now);

        let mut decision = self
            .rules
            .iter()
            .map(|rule| rule.analyse(&self.history, now))
            .fold(Decision::ALLOWED, Decision::merge);

        if self.cooldown.is_armed() {
            if let Some(remaining) = self.cooldown.due_at(now).remaining() {
                decision = decision.merge(Decision::denied(remaining));
            }
        }
        decision
    }

    fn record(&mut self, now: Instant) {
        self.history.push_back(now);
    }

    pub fn pending_vital(&self) -> usize {
        self.pending_vital.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Keeps a vital request registered as pending until it is admitted or abandoned.
struct PendingVital {
    id: Uuid,
    state: Arc<std::sync::Mutex<AdmissionState>>,
}

impl Drop for PendingVital {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_vital.remove(&self.id);
        }
    }
}

enum Step {
    Admitted,
    Refused,
    Wait(Duration),
}

/// Arbitrates outbound requests against the configured quota rules and
/// the throttling cooldown. Clones share the same call history.
#[derive(Clone, Debug)]
pub struct AdmissionController {
    state: Arc<std::sync::Mutex<AdmissionState>>,
    shutdown: CancellationToken,
}

impl AdmissionController {
    pub fn new(rules: Vec<QuotaRule>, cooldown: Duration, shutdown: CancellationToken) -> Self {
        Self {
            state: Arc::new(std::sync::Mutex::new(AdmissionState::new(rules, cooldown))),
            shutdown,
        }
    }

    pub fn from_config(
        config: &RiotApiConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ChanclolError> {
        let rules = config
            .quota_rules
            .iter()
            .map(QuotaRule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules, config.throttle_cooldown(), shutdown))
    }

    pub fn lock(&self) -> Result<AdmissionStateGuard<'_>, ChanclolError> {
        Ok(AdmissionStateGuard::new(self.state.lock()?))
    }

    /// Returns `Ok(true)` once the request may be sent.
    ///
    /// Non-vital requests return `Ok(false)` right away when quota is short or a
    /// vital request is waiting. Vital requests wait until quota frees up and only
    /// fail if the controller's shutdown token is cancelled.
    pub async fn admit(&self, priority: Priority) -> Result<bool, ChanclolError> {
        let mut pending: Option<PendingVital> = None;

        loop {
            let now = Instant::now();
            let step = {
                let mut state = self.lock()?;
                let decision = state.evaluate(now);

                match priority {
                    Priority::Vital if decision.allowed => {
                        state.record(now);
                        if let Some(ref pending) = pending {
                            state.pending_vital.remove(&pending.id);
                        }
                        Step::Admitted
                    }
                    Priority::Vital => {
                        if pending.is_none() {
                            let id = Uuid::new_v4();
                            state.pending_vital.insert(id);
                            pending = Some(PendingVital {
                                id,
                                state: self.state.clone(),
                            });
                        }
                        Step::Wait(decision.wait)
                    }
                    Priority::NonVital if decision.allowed && state.pending_vital.is_empty() => {
                        state.record(now);
                        Step::Admitted
                    }
                    Priority::NonVital => {
                        if decision.allowed {
                            debug!(
                                pending = state.pending_vital.len(),
                                "Non-vital request yields to pending vital requests"
                            );
                        } else {
                            warn!(
                                wait_ms = decision.wait.as_millis() as u64,
                                "Non-vital request refused, quota exhausted"
                            );
                        }
                        Step::Refused
                    }
                }
            };

            match step {
                Step::Admitted => {
                    debug!(?priority, "Request admitted");
                    return Ok(true);
                }
                Step::Refused => return Ok(false),
                Step::Wait(wait) => {
                    let wait = wait.max(MIN_ADMISSION_WAIT);
                    warn!(
                        wait_ms = wait.as_millis() as u64,
                        "Vital request delayed, quota exhausted"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => (),
                        _ = self.shutdown.cancelled() => {
                            debug!("Vital request abandoned on shutdown");
                            return Err(ChanclolError::Cancelled);
                        }
                    }
                }
            }
        }
    }

    /// Holds back all traffic for the cooldown window.
    pub fn notify_throttled(&self) -> Result<(), ChanclolError> {
        let mut state = self.lock()?;
        state.cooldown.arm();
        warn!(
            cooldown_ms = state.cooldown.timeout().as_millis() as u64,
            "Remote is throttling, holding back requests"
        );
        Ok(())
    }
}

/// Prevents the admission state lock from being held across awaits
pub struct AdmissionStateGuard<'a> {
    inner: std::sync::MutexGuard<'a, AdmissionState>,
    _non_sendable: std::marker::PhantomData<*const ()>,
}

impl<'a> AdmissionStateGuard<'a> {
    fn new(inner: std::sync::MutexGuard<'a, AdmissionState>) -> Self {
        Self {
            inner,
            _non_sendable: std::marker::PhantomData,
        }
    }
}

impl Deref for AdmissionStateGuard<'_> {
    type Target = AdmissionState;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AdmissionStateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

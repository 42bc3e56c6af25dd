use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use crate::timer::ReadinessTimer;

type PeriodicAction = Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>;

/// Runs an async action at most once per `period`, driven by repeated [PeriodicTask::tick] calls.
///
/// The first tick fires immediately.
pub struct PeriodicTask {
    name: &'static str,
    timer: ReadinessTimer,
    action: PeriodicAction,
}

impl PeriodicTask {
    pub fn new<F>(name: &'static str, period: Duration, action: F) -> Self
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send + 'static,
    {
        Self {
            name,
            timer: ReadinessTimer::new(period),
            action: Box::new(action),
        }
    }

    /// Returns whether the action ran.
    pub async fn tick(&mut self) -> bool {
        if !self.timer.due().is_due() {
            return false;
        }
        self.timer.arm();
        debug!(task = self.name, "Running periodic task");
        (self.action)().await;
        true
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("timer", &self.timer)
            .finish()
    }
}

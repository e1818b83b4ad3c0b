use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::warn;

/// Future returned by a timer action
pub type TimerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Action run on every timer tick
pub type TimerAction = Arc<dyn Fn() -> TimerFuture + Send + Sync>;

/// Periodic timer capability handed to integrations.
pub trait Scheduler: Send + Sync {
    /// Run `action` every `interval` until the returned handle is cancelled or dropped.
    ///
    /// The first run happens one interval after the call, not immediately.
    fn track_time_interval(&self, interval: Duration, action: TimerAction) -> TimerHandle;
}

/// Handle to a scheduled timer. Cancels the timer when cancelled or dropped.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.cancel_inner();
    }

    fn cancel_inner(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel_inner();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Scheduler backed by the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn track_time_interval(&self, interval: Duration, action: TimerAction) -> TimerHandle {
        debug!("Scheduling timer every {:?}", interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = action().await {
                    warn!("Timer action failed: {:#}", e);
                }
            }
        });

        TimerHandle::new(move || task.abort())
    }
}

#[cfg(test)]
pub use manual::ManualScheduler;

#[cfg(test)]
mod manual {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use super::*;

    struct ManualTimer {
        interval: Duration,
        action: TimerAction,
        cancelled: Arc<AtomicBool>,
    }

    /// Deterministic scheduler: timers only fire when the test asks.
    #[derive(Default)]
    pub struct ManualScheduler {
        timers: Mutex<Vec<ManualTimer>>,
    }

    impl ManualScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of timers that have not been cancelled.
        pub fn active_timers(&self) -> usize {
            self.timers
                .lock()
                .unwrap()
                .iter()
                .filter(|t| !t.cancelled.load(Ordering::SeqCst))
                .count()
        }

        /// Intervals of every timer ever scheduled, in scheduling order.
        pub fn intervals(&self) -> Vec<Duration> {
            self.timers.lock().unwrap().iter().map(|t| t.interval).collect()
        }

        /// Run one tick of every active timer.
        pub async fn fire(&self) -> Vec<anyhow::Result<()>> {
            let actions: Vec<TimerAction> = self
                .timers
                .lock()
                .unwrap()
                .iter()
                .filter(|t| !t.cancelled.load(Ordering::SeqCst))
                .map(|t| t.action.clone())
                .collect();

            let mut results = Vec::new();
            for action in actions {
                results.push(action().await);
            }
            results
        }
    }

    impl Scheduler for ManualScheduler {
        fn track_time_interval(&self, interval: Duration, action: TimerAction) -> TimerHandle {
            let cancelled = Arc::new(AtomicBool::new(false));
            self.timers.lock().unwrap().push(ManualTimer {
                interval,
                action,
                cancelled: cancelled.clone(),
            });
            TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
        }
    }
}

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use tracing::error;

use super::client::SmileClient;
use crate::engine::Scheduler;
use crate::engine::TimerAction;
use crate::engine::scheduler::TimerFuture;
use crate::engine::TimerHandle;

/// Callback notified after every refresh. It receives no payload and is expected to re-read the
/// client.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`SmileDataUpdater::add_listener`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("{0} is not registered")]
    ListenerNotFound(ListenerId),
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
    timer: Option<TimerHandle>,
}

/// Fans one periodic gateway refresh out to every subscribed entity.
///
/// The timer runs exactly while at least one listener is subscribed: the first
/// [`add_listener`](Self::add_listener) schedules it and removing the last listener cancels it.
pub struct SmileDataUpdater {
    update_interval: Duration,
    client: Arc<dyn SmileClient>,
    scheduler: Arc<dyn Scheduler>,
    listeners: Mutex<Listeners>,
    this: Weak<SmileDataUpdater>,
}

impl SmileDataUpdater {
    pub fn new(
        client: Arc<dyn SmileClient>,
        scheduler: Arc<dyn Scheduler>,
        update_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            update_interval,
            client,
            scheduler,
            listeners: Mutex::new(Listeners::default()),
            this: this.clone(),
        })
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn listener_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the polling timer is currently scheduled
    pub fn is_polling(&self) -> bool {
        self.lock().timer.is_some()
    }

    /// Subscribe to refresh notifications. The same callback added twice is notified twice.
    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let mut listeners = self.lock();

        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, listener));

        if listeners.entries.len() == 1 {
            debug!("Starting polling every {:?}", self.update_interval);
            listeners.timer = Some(
                self.scheduler
                    .track_time_interval(self.update_interval, self.refresh_action()),
            );
        }

        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<(), UpdaterError> {
        let mut listeners = self.lock();

        let pos = listeners
            .entries
            .iter()
            .position(|(existing, _)| *existing == id)
            .ok_or(UpdaterError::ListenerNotFound(id))?;
        listeners.entries.remove(pos);

        if listeners.entries.is_empty() {
            if let Some(timer) = listeners.timer.take() {
                debug!("Last listener removed, stopping polling");
                timer.cancel();
            }
        }

        Ok(())
    }

    /// Refresh the gateway and notify every listener in subscription order.
    ///
    /// Does nothing when no listener is subscribed. Client errors are returned before any
    /// listener runs.
    pub async fn refresh_all(&self) -> smile_api::Result<()> {
        if self.lock().entries.is_empty() {
            error!("Refresh requested without any listeners, skipping");
            return Ok(());
        }

        self.client.full_update_device().await?;

        let listeners: Vec<Listener> = self
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!("Notifying {} listeners", listeners.len());
        for listener in listeners {
            listener();
        }

        Ok(())
    }

    fn refresh_action(&self) -> TimerAction {
        let this = self.this.clone();
        Arc::new(move || {
            let this = this.clone();
            Box::pin(async move {
                match this.upgrade() {
                    Some(updater) => updater.refresh_all().await.map_err(anyhow::Error::from),
                    None => Ok(()),
                }
            }) as TimerFuture
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use smile_api::SmileType;

    use super::*;
    use crate::engine::scheduler::ManualScheduler;
    use crate::integrations::plugwise::client::MockSmileClient;

    fn updater() -> (Arc<SmileDataUpdater>, Arc<MockSmileClient>, Arc<ManualScheduler>) {
        let client = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));
        let scheduler = Arc::new(ManualScheduler::new());
        let updater =
            SmileDataUpdater::new(client.clone(), scheduler.clone(), Duration::from_secs(60));
        (updater, client, scheduler)
    }

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let listener: Listener = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    fn assert_timer_invariant(updater: &SmileDataUpdater, scheduler: &ManualScheduler) {
        let active = updater.listener_count() > 0;
        assert_eq!(updater.is_polling(), active);
        assert_eq!(scheduler.active_timers(), usize::from(active));
    }

    #[test]
    fn test_timer_active_iff_listeners() {
        let (updater, _client, scheduler) = updater();
        assert_timer_invariant(&updater, &scheduler);

        let (_, a) = counter();
        let (_, b) = counter();
        let id_a = updater.add_listener(a);
        assert_timer_invariant(&updater, &scheduler);
        let id_b = updater.add_listener(b);
        assert_timer_invariant(&updater, &scheduler);

        updater.remove_listener(id_a).unwrap();
        assert_timer_invariant(&updater, &scheduler);
        assert!(updater.is_polling());

        updater.remove_listener(id_b).unwrap();
        assert_timer_invariant(&updater, &scheduler);
        assert!(!updater.is_polling());

        // Only one timer was ever started for the two listeners
        assert_eq!(scheduler.intervals(), vec![Duration::from_secs(60)]);
    }

    #[test]
    fn test_restart_after_idle() {
        let (updater, _client, scheduler) = updater();
        let (_, listener) = counter();

        let id = updater.add_listener(listener.clone());
        updater.remove_listener(id).unwrap();
        updater.add_listener(listener);

        assert_timer_invariant(&updater, &scheduler);
        assert_eq!(scheduler.intervals().len(), 2);
    }

    #[test]
    fn test_remove_unknown_listener() {
        let (updater, _client, scheduler) = updater();
        let (_, listener) = counter();
        let id = updater.add_listener(listener);
        updater.remove_listener(id).unwrap();

        let err = updater.remove_listener(id).unwrap_err();
        assert!(matches!(err, UpdaterError::ListenerNotFound(missing) if missing == id));
        assert_timer_invariant(&updater, &scheduler);
    }

    #[tokio::test]
    async fn test_refresh_without_listeners_skips_client() {
        let (updater, client, _scheduler) = updater();

        updater.refresh_all().await.unwrap();
        assert_eq!(client.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_listener_called_twice() {
        let (updater, client, _scheduler) = updater();
        let (count, listener) = counter();

        updater.add_listener(listener.clone());
        updater.add_listener(listener);
        updater.refresh_all().await.unwrap();

        assert_eq!(client.refresh_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_listeners_notified_in_order() {
        let (updater, _client, _scheduler) = updater();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["sensor", "climate", "switch"] {
            let order = order.clone();
            updater.add_listener(Arc::new(move || order.lock().unwrap().push(name)));
        }
        updater.refresh_all().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["sensor", "climate", "switch"]);
    }

    #[tokio::test]
    async fn test_refresh_error_skips_listeners() {
        let (updater, client, _scheduler) = updater();
        let (count, listener) = counter();
        updater.add_listener(listener);

        client.fail_refresh.store(true, Ordering::SeqCst);
        let err = updater.refresh_all().await.unwrap_err();

        assert!(matches!(err, smile_api::Error::ResponseError { status: 500 }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timer_tick_refreshes() {
        let (updater, client, scheduler) = updater();
        let (count, listener) = counter();
        updater.add_listener(listener);

        for result in scheduler.fire().await {
            result.unwrap();
        }

        assert_eq!(client.refresh_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

//! Refresh controller
//!
//! Keeps a `{data, loading, error}` read model in sync with an asynchronous
//! source while its parameters change and an optional timer re-polls it.
//!
//! Every fetch start increments a generation counter. A result is committed
//! only if the counter still holds the generation captured when its fetch
//! started, so a slow response to old parameters can never overwrite a
//! newer one. In-flight fetches are never aborted; superseded results are
//! dropped silently. A fetch that panics settles as a failed fetch.
//!
//! State lives in a [`tokio::sync::watch`] channel. Every mutation goes
//! through the channel's lock, which makes the generation check and the
//! commit a single step.

use crate::error::InsightError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

/// Completion handle of a spawned fetch
pub type FetchHandle = JoinHandle<()>;

/// Asynchronous fetch for one kind of parameters
#[async_trait]
pub trait Fetcher<P>: Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    type Output: Clone + Send + Sync + 'static;

    async fn fetch(&self, params: &P) -> Result<Self::Output, InsightError>;
}

#[async_trait]
impl<P, F> Fetcher<P> for Arc<F>
where
    P: Send + Sync + 'static,
    F: Fetcher<P>,
{
    type Output = F::Output;

    async fn fetch(&self, params: &P) -> Result<Self::Output, InsightError> {
        (**self).fetch(params).await
    }
}

/// Observable state of one subscription
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshState<P, T> {
    /// Parameters the next fetch will use
    pub params: P,
    /// Last committed result, kept across failed fetches
    pub data: Option<T>,
    pub loading: bool,
    /// Message of the last failed fetch, cleared by the next success
    pub error: Option<String>,
    pub generation: u64,
    pub active: bool,
}

/// What started a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Activation,
    ParamsChanged,
    Manual,
    Timer,
}

struct Shared<P, F>
where
    P: Send + Sync + 'static,
    F: Fetcher<P>,
{
    id: Uuid,
    fetcher: F,
    state: watch::Sender<RefreshState<P, F::Output>>,
}

impl<P, F> Shared<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fetcher<P>,
{
    /// Optionally replace the parameters, then start a new generation if the
    /// subscription is active.
    fn start_fetch(self: &Arc<Self>, trigger: Trigger, new_params: Option<P>) -> Option<FetchHandle> {
        let mut ticket = None;
        self.state.send_if_modified(|state| {
            let replaced = new_params.is_some();
            if let Some(params) = new_params {
                state.params = params;
            }
            if !state.active {
                return replaced;
            }
            state.generation += 1;
            state.loading = true;
            ticket = Some((state.generation, state.params.clone()));
            true
        });

        let (generation, params) = ticket?;
        debug!(subscription = %self.id, generation, ?trigger, "fetch started");

        let shared = Arc::clone(self);
        Some(tokio::spawn(async move {
            // a panicking fetcher must still settle its generation
            let fetch = {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.fetcher.fetch(&params).await })
            };
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => Err(InsightError::Source(format!("fetch did not complete: {}", e))),
            };
            shared.commit(generation, result);
        }))
    }

    fn commit(&self, generation: u64, result: Result<F::Output, InsightError>) {
        let id = self.id;
        self.state.send_if_modified(|state| {
            if !state.active || state.generation != generation {
                debug!(
                    subscription = %id,
                    generation,
                    current = state.generation,
                    "discarding superseded result"
                );
                return false;
            }

            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    debug!(subscription = %id, generation, "fetch committed");
                }
                Err(e) => {
                    warn!(subscription = %id, generation, error = %e, "fetch failed");
                    state.error = Some(e.to_string());
                }
            }
            true
        });
    }
}

#[derive(Default)]
struct AutoRefresh {
    interval: Option<Duration>,
    timer: Option<JoinHandle<()>>,
}

impl AutoRefresh {
    fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Fetch lifecycle owner for one logical query.
///
/// Starting fetches and timers spawns Tokio tasks, so the controller must be
/// driven from within a Tokio runtime. Dropping the controller deactivates it.
pub struct RefreshController<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fetcher<P>,
{
    shared: Arc<Shared<P, F>>,
    auto_refresh: Mutex<AutoRefresh>,
}

impl<P, F> RefreshController<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fetcher<P>,
{
    /// Create an inactive controller. Nothing is fetched until [`activate`].
    ///
    /// [`activate`]: RefreshController::activate
    pub fn new(fetcher: F, params: P) -> Self {
        let (state, _) = watch::channel(RefreshState {
            params,
            data: None,
            loading: false,
            error: None,
            generation: 0,
            active: false,
        });

        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                fetcher,
                state,
            }),
            auto_refresh: Mutex::new(AutoRefresh::default()),
        }
    }

    /// Identifier recorded on this controller's log events
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.borrow().active
    }

    /// Start the subscription: fetch once and arm the timer if one is set.
    /// Returns `None` when already active.
    pub fn activate(&self) -> Option<FetchHandle> {
        let activated = self.shared.state.send_if_modified(|state| {
            if state.active {
                return false;
            }
            state.active = true;
            true
        });
        if !activated {
            return None;
        }

        debug!(subscription = %self.shared.id, "subscription activated");
        let handle = self.shared.start_fetch(Trigger::Activation, None);
        self.reschedule(&mut self.auto_refresh.lock());
        handle
    }

    /// Tear the subscription down. The timer is cancelled and any fetch still
    /// in flight will find its generation superseded.
    pub fn deactivate(&self) {
        self.auto_refresh.lock().stop();

        let deactivated = self.shared.state.send_if_modified(|state| {
            if !state.active {
                return false;
            }
            state.active = false;
            state.generation += 1;
            state.loading = false;
            true
        });
        if deactivated {
            debug!(subscription = %self.shared.id, "subscription deactivated");
        }
    }

    /// Re-fetch with the current parameters
    pub fn refresh(&self) -> Option<FetchHandle> {
        self.shared.start_fetch(Trigger::Manual, None)
    }

    /// Replace the parameters and re-fetch. While inactive the parameters are
    /// stored for the next activation.
    pub fn set_params(&self, params: P) -> Option<FetchHandle> {
        self.shared.start_fetch(Trigger::ParamsChanged, Some(params))
    }

    /// Edit a copy of the current parameters and apply it with [`set_params`].
    ///
    /// [`set_params`]: RefreshController::set_params
    pub fn update_params(&self, edit: impl FnOnce(&mut P)) -> Option<FetchHandle> {
        let mut params = self.shared.state.borrow().params.clone();
        edit(&mut params);
        self.set_params(params)
    }

    /// Set or clear the auto-refresh interval. Any running timer is cancelled
    /// first; a zero interval disables auto-refresh.
    pub fn set_auto_refresh(&self, interval: Option<Duration>) {
        let mut auto = self.auto_refresh.lock();
        auto.interval = interval.filter(|period| !period.is_zero());
        self.reschedule(&mut auto);
    }

    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh.lock().interval
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> RefreshState<P, F::Output> {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<RefreshState<P, F::Output>> {
        self.shared.state.subscribe()
    }

    /// Wait until no fetch is outstanding and return that state
    pub async fn settled(&self) -> RefreshState<P, F::Output> {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.snapshot())
    }

    fn reschedule(&self, auto: &mut AutoRefresh) {
        auto.stop();
        if !self.is_active() {
            return;
        }
        if let Some(period) = auto.interval {
            debug!(subscription = %self.shared.id, ?period, "auto-refresh armed");
            auto.timer = Some(spawn_timer(Arc::downgrade(&self.shared), period));
        }
    }
}

impl<P, F> Drop for RefreshController<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fetcher<P>,
{
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Periodic trigger. Holds only a weak reference so it cannot keep a dropped
/// subscription alive, and exits once the subscription is inactive.
fn spawn_timer<P, F>(shared: Weak<Shared<P, F>>, period: Duration) -> JoinHandle<()>
where
    P: Clone + Send + Sync + 'static,
    F: Fetcher<P>,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            if shared.start_fetch(Trigger::Timer, None).is_none() {
                debug!(subscription = %shared.id, "auto-refresh stopped");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Gate = oneshot::Sender<Result<String, String>>;

    /// Fetcher echoing its parameters, optionally held back by a gate
    #[derive(Default)]
    struct GatedFetcher {
        gates: SyncMutex<HashMap<String, oneshot::Receiver<Result<String, String>>>>,
        calls: AtomicUsize,
    }

    impl GatedFetcher {
        fn gate(&self, params: &str) -> Gate {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(params.to_string(), rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher<String> for GatedFetcher {
        type Output = String;

        async fn fetch(&self, params: &String) -> Result<String, InsightError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().remove(params);
            match gate {
                Some(rx) => match rx.await {
                    Ok(result) => result.map_err(InsightError::Source),
                    Err(_) => Err(InsightError::Source("gate dropped".to_string())),
                },
                None if params == "panic" => panic!("fetcher bug"),
                None if params.starts_with("fail") => {
                    Err(InsightError::Source(format!("{} unreachable", params)))
                }
                None => Ok(format!("data:{}", params)),
            }
        }
    }

    fn controller(
        fetcher: &Arc<GatedFetcher>,
        params: &str,
    ) -> RefreshController<String, Arc<GatedFetcher>> {
        RefreshController::new(Arc::clone(fetcher), params.to_string())
    }

    #[tokio::test]
    async fn test_activation_commits_data() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");
        assert!(controller.snapshot().data.is_none());

        controller.activate().unwrap().await.unwrap();

        let state = controller.snapshot();
        assert_eq!(state.data.as_deref(), Some("data:p1"));
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert_eq!(state.generation, 1);
        assert!(controller.activate().is_none());
    }

    #[tokio::test]
    async fn test_inactive_controller_does_not_fetch() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");

        assert!(controller.refresh().is_none());
        assert!(controller.set_params("p2".to_string()).is_none());
        assert_eq!(controller.snapshot().params, "p2");
        assert_eq!(fetcher.calls(), 0);

        controller.activate().unwrap().await.unwrap();
        assert_eq!(controller.snapshot().data.as_deref(), Some("data:p2"));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_data() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "ok");
        controller.activate().unwrap().await.unwrap();

        controller.set_params("fail".to_string()).unwrap().await.unwrap();
        let state = controller.snapshot();
        assert_eq!(state.data.as_deref(), Some("data:ok"));
        assert_eq!(
            state.error.as_deref(),
            Some("Data source error: fail unreachable")
        );
        assert!(!state.loading);

        // no automatic retry
        assert_eq!(fetcher.calls(), 2);

        controller.update_params(|p| *p = "ok2".to_string()).unwrap().await.unwrap();
        let state = controller.snapshot();
        assert_eq!(state.data.as_deref(), Some("data:ok2"));
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_panicking_fetch_settles_with_error() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "ok");
        controller.activate().unwrap().await.unwrap();

        controller.set_params("panic".to_string()).unwrap().await.unwrap();
        let state = tokio::time::timeout(Duration::from_secs(2), controller.settled())
            .await
            .unwrap();

        assert!(!state.loading);
        assert_eq!(state.data.as_deref(), Some("data:ok"));
        assert!(state.error.unwrap().contains("panicked"));

        controller.set_params("ok2".to_string()).unwrap().await.unwrap();
        assert_eq!(controller.snapshot().error, None);
    }

    #[tokio::test]
    async fn test_late_stale_result_does_not_overwrite() {
        let fetcher = Arc::new(GatedFetcher::default());
        let gate_a = fetcher.gate("p1");
        let gate_b = fetcher.gate("p2");
        let controller = controller(&fetcher, "p1");

        let fetch_a = controller.activate().unwrap();
        let fetch_b = controller.set_params("p2".to_string()).unwrap();

        gate_b.send(Ok("fresh".to_string())).unwrap();
        fetch_b.await.unwrap();
        assert_eq!(controller.snapshot().data.as_deref(), Some("fresh"));

        gate_a.send(Ok("stale".to_string())).unwrap();
        fetch_a.await.unwrap();

        let state = controller.snapshot();
        assert_eq!(state.data.as_deref(), Some("fresh"));
        assert_eq!(state.generation, 2);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_stale_error_is_dropped_too() {
        let fetcher = Arc::new(GatedFetcher::default());
        let gate_a = fetcher.gate("p1");
        let gate_b = fetcher.gate("p2");
        let controller = controller(&fetcher, "p1");

        let fetch_a = controller.activate().unwrap();
        let fetch_b = controller.set_params("p2".to_string()).unwrap();

        // A resolves first while B is still outstanding
        gate_a.send(Err("timeout".to_string())).unwrap();
        fetch_a.await.unwrap();
        let state = controller.snapshot();
        assert_eq!(state.error, None);
        assert!(state.loading);

        gate_b.send(Ok("fresh".to_string())).unwrap();
        fetch_b.await.unwrap();
        assert_eq!(controller.snapshot().data.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_in_flight_fetch_after_deactivation_is_ignored() {
        let fetcher = Arc::new(GatedFetcher::default());
        let gate = fetcher.gate("p1");
        let controller = controller(&fetcher, "p1");

        let fetch = controller.activate().unwrap();
        let before = controller.snapshot();
        controller.deactivate();
        let after_teardown = controller.snapshot();
        assert!(!after_teardown.active);
        assert!(!after_teardown.loading);
        assert!(after_teardown.generation > before.generation);

        gate.send(Ok("late".to_string())).unwrap();
        fetch.await.unwrap();

        assert_eq!(controller.snapshot(), after_teardown);
        assert!(controller.refresh().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_data() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");
        let mut rx = controller.subscribe();

        let _fetch = controller.activate();
        let state = rx.wait_for(|s| s.data.is_some()).await.unwrap().clone();
        assert_eq!(state.data.as_deref(), Some("data:p1"));
    }

    #[tokio::test]
    async fn test_settled_waits_for_outstanding_fetch() {
        let fetcher = Arc::new(GatedFetcher::default());
        let gate = fetcher.gate("p1");
        let controller = controller(&fetcher, "p1");

        let _fetch = controller.activate();
        assert!(controller.snapshot().loading);

        gate.send(Ok("done".to_string())).unwrap();
        let state = controller.settled().await;
        assert!(!state.loading);
        assert_eq!(state.data.as_deref(), Some("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_ticks_like_manual_refresh() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");
        controller.set_auto_refresh(Some(Duration::from_secs(1)));

        controller.activate().unwrap().await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(fetcher.calls(), 4);
        assert_eq!(controller.snapshot().generation, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivation_stops_timer() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");
        controller.set_auto_refresh(Some(Duration::from_secs(1)));
        controller.activate().unwrap().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fetcher.calls(), 2);

        controller.deactivate();
        let frozen = controller.snapshot();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(controller.snapshot(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_replaces_timer() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");
        controller.set_auto_refresh(Some(Duration::from_secs(1)));
        controller.activate().unwrap().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fetcher.calls(), 2);

        controller.set_auto_refresh(Some(Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(fetcher.calls(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fetcher.calls(), 3);

        controller.set_auto_refresh(None);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(controller.auto_refresh_interval(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_controller_stops_timer() {
        let fetcher = Arc::new(GatedFetcher::default());
        let controller = controller(&fetcher, "p1");
        controller.set_auto_refresh(Some(Duration::from_secs(1)));
        controller.activate().unwrap().await.unwrap();

        drop(controller);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.calls(), 1);
    }
}

//! Periodic fetching with a single retry
//!
//! Side-panel data (weather, train departures) is refreshed every
//! `interval`. A failed fetch marks the state as failed and arms one retry
//! after `retry_delay`; if that retry fails too nothing more happens until
//! the next regular tick. A regular tick supersedes a retry that has not
//! fired yet, so there is never more than one extra fetch per interval.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::alarm::Clock;
use crate::content::ConfiguredSource;

/// Last known result of a poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollState<T> {
    /// Payload of the last successful fetch
    pub last_success: Option<T>,

    /// Clock time of the last successful fetch
    pub updated_at: Option<NaiveDateTime>,

    /// The most recent fetch failed
    pub failed: bool,

    /// A retry is waiting to fire
    pub retry_armed: bool,

    /// Fetches attempted so far
    pub fetches: u64,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            last_success: None,
            updated_at: None,
            failed: false,
            retry_armed: false,
            fetches: 0,
        }
    }
}

/// Thread-safe state container
pub type SharedPollState<T> = Arc<RwLock<PollState<T>>>;

pub struct RetryingPoller<T> {
    name: String,
    state: SharedPollState<T>,
    task: JoinHandle<()>,
}

impl<T> RetryingPoller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Fetch now, then every `interval`, retrying a failure once after
    /// `retry_delay`.
    pub fn schedule<F, Fut>(
        name: impl Into<String>,
        clock: Arc<dyn Clock>,
        fetch: F,
        interval: Duration,
        retry_delay: Duration,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = crate::Result<T>> + Send + 'static,
    {
        let name = name.into();
        let state: SharedPollState<T> = Arc::new(RwLock::new(PollState::default()));
        let task = tokio::spawn(run(
            name.clone(),
            clock,
            fetch,
            interval,
            retry_delay,
            state.clone(),
        ));

        Self { name, state, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> PollState<T> {
        self.state.read().await.clone()
    }
}

impl<T> Drop for RetryingPoller<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poller over a content source, used for the side-panel data
pub fn source_poller(
    name: impl Into<String>,
    clock: Arc<dyn Clock>,
    source: ConfiguredSource,
    interval: Duration,
    retry_delay: Duration,
) -> RetryingPoller<String> {
    RetryingPoller::schedule(
        name,
        clock,
        move || {
            let source = source.clone();
            async move { source.fetch().await }
        },
        interval,
        retry_delay,
    )
}

async fn run<T, F, Fut>(
    name: String,
    clock: Arc<dyn Clock>,
    mut fetch: F,
    interval: Duration,
    retry_delay: Duration,
    state: SharedPollState<T>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let retry = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(retry);
    let mut retry_armed = false;

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {
                retry_armed = false;
                if !poll_once(&name, clock.as_ref(), &mut fetch, &state).await {
                    retry.as_mut().reset(Instant::now() + retry_delay);
                    retry_armed = true;
                    debug!("{} poller: retry in {}s", name, retry_delay.as_secs());
                }
            }

            _ = &mut retry, if retry_armed => {
                retry_armed = false;
                if !poll_once(&name, clock.as_ref(), &mut fetch, &state).await {
                    debug!("{} poller: retry failed, waiting for next interval", name);
                }
            }
        }

        state.write().await.retry_armed = retry_armed;
    }
}

async fn poll_once<T, F, Fut>(
    name: &str,
    clock: &dyn Clock,
    fetch: &mut F,
    state: &SharedPollState<T>,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let result = fetch().await;

    let mut guard = state.write().await;
    guard.fetches += 1;
    match result {
        Ok(payload) => {
            guard.last_success = Some(payload);
            guard.updated_at = Some(clock.now());
            guard.failed = false;
            true
        }
        Err(e) => {
            warn!("{} poller: fetch failed: {}", name, e);
            guard.failed = true;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::ManualClock;
    use crate::AlarmError;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Fetch that succeeds or fails per `script`, then keeps succeeding
    fn scripted(script: &[bool]) -> impl FnMut() -> std::future::Ready<crate::Result<u32>> {
        let script = Arc::new(Mutex::new(script.iter().copied().collect::<VecDeque<_>>()));
        let mut calls = 0;
        move || {
            calls += 1;
            let ok = script.lock().unwrap().pop_front().unwrap_or(true);
            std::future::ready(if ok {
                Ok(calls)
            } else {
                Err(AlarmError::Other("upstream down".to_string()))
            })
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(noon()))
    }

    async fn at(start: Instant, secs: f64) {
        tokio::time::sleep_until(start + Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_every_interval() {
        let start = Instant::now();
        let poller = RetryingPoller::schedule(
            "weather",
            clock(),
            scripted(&[]),
            Duration::from_secs(12),
            Duration::from_secs(10),
        );

        at(start, 1.0).await;
        let state = poller.state().await;
        assert_eq!(state.fetches, 1);
        assert_eq!(state.last_success, Some(1));
        assert!(!state.retry_armed);

        at(start, 25.0).await;
        assert_eq!(poller.state().await.fetches, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_retry_clears_failed_flag() {
        let start = Instant::now();
        let poller = RetryingPoller::schedule(
            "weather",
            clock(),
            scripted(&[false, true]),
            Duration::from_secs(12),
            Duration::from_secs(10),
        );

        at(start, 5.0).await;
        let state = poller.state().await;
        assert!(state.failed);
        assert!(state.retry_armed);
        assert_eq!(state.last_success, None);

        at(start, 11.0).await;
        let state = poller.state().await;
        assert!(!state.failed);
        assert!(!state.retry_armed);
        assert_eq!(state.fetches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_retry_waits_for_next_tick() {
        let start = Instant::now();
        let poller = RetryingPoller::schedule(
            "trains",
            clock(),
            scripted(&[false, false, true]),
            Duration::from_secs(12),
            Duration::from_secs(10),
        );

        at(start, 11.0).await;
        let state = poller.state().await;
        assert!(state.failed);
        assert!(!state.retry_armed);
        assert_eq!(state.fetches, 2);

        // no ad-hoc retry between the failed retry and the next tick
        at(start, 11.9).await;
        assert_eq!(poller.state().await.fetches, 2);

        at(start, 13.0).await;
        let state = poller.state().await;
        assert!(!state.failed);
        assert_eq!(state.fetches, 3);
        assert_eq!(state.last_success, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn regular_tick_supersedes_pending_retry() {
        let start = Instant::now();
        let poller = RetryingPoller::schedule(
            "weather",
            clock(),
            scripted(&[false, true]),
            Duration::from_secs(5),
            Duration::from_secs(10),
        );

        at(start, 6.0).await;
        let state = poller.state().await;
        assert!(!state.failed);
        assert!(!state.retry_armed);

        // ticks at 0, 5 and 10 only; the retry armed at 0 never fires
        at(start, 11.0).await;
        assert_eq!(poller.state().await.fetches, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn last_success_survives_later_failures() {
        let start = Instant::now();
        let poller = RetryingPoller::schedule(
            "weather",
            clock(),
            scripted(&[true, false, false]),
            Duration::from_secs(12),
            Duration::from_secs(10),
        );

        at(start, 23.0).await;
        let state = poller.state().await;
        assert!(state.failed);
        assert_eq!(state.last_success, Some(1));
        assert_eq!(state.updated_at, Some(noon()));
    }
}

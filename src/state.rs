//! Locally observed copies of repository streams
//!
//! [`ObservedState`] mirrors an upstream `watch` channel into a local
//! `Option<T>` while anybody is subscribed. Forwarding starts with the first
//! subscriber and stops `grace` after the last one detaches; the last value is
//! kept. The local value is `None` until the forwarder has delivered the first
//! upstream value.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::lifecycle::LifecycleScope;

struct Control {
    subscribers: usize,
    forwarder: Option<CancellationToken>,
    /// Bumped on every subscribe/unsubscribe so stale stop timers do nothing
    generation: u64,
}

struct Inner<T> {
    name: String,
    upstream: watch::Receiver<T>,
    local: watch::Sender<Option<T>>,
    grace: Duration,
    scope: LifecycleScope,
    control: Mutex<Control>,
}

/// Shared, lazily observed state
pub struct ObservedState<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ObservedState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ObservedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start observing `upstream` on `scope`. Observation begins right away
    /// and ends after `grace` unless somebody subscribes in the meantime.
    pub fn state_in(
        name: impl Into<String>,
        upstream: watch::Receiver<T>,
        scope: &LifecycleScope,
        grace: Duration,
    ) -> Self {
        let (local, _) = watch::channel(None);
        let state = Self {
            inner: Arc::new(Inner {
                name: name.into(),
                upstream,
                local,
                grace,
                scope: scope.clone(),
                control: Mutex::new(Control {
                    subscribers: 0,
                    forwarder: None,
                    generation: 0,
                }),
            }),
        };

        {
            let mut control = state.lock_control();
            state.start_forwarder(&mut control);
            state.schedule_stop(&mut control);
        }
        state
    }

    /// Latest observed value, if any
    pub fn value(&self) -> Option<T> {
        self.inner.local.borrow().clone()
    }

    /// Whether the upstream is currently being forwarded
    pub fn is_observing(&self) -> bool {
        self.lock_control().forwarder.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_control().subscribers
    }

    /// Attach a subscriber, (re)starting the upstream if needed
    pub fn subscribe(&self) -> Subscription<T> {
        let mut control = self.lock_control();
        control.subscribers += 1;
        control.generation += 1;
        if control.forwarder.is_none() {
            self.start_forwarder(&mut control);
        }
        drop(control);

        Subscription {
            state: self.clone(),
            rx: self.inner.local.subscribe(),
        }
    }

    fn lock_control(&self) -> std::sync::MutexGuard<'_, Control> {
        // A poisoned lock only means another subscriber panicked mid-update;
        // the counters are still consistent.
        self.inner
            .control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_forwarder(&self, control: &mut Control) {
        let token = self.inner.scope.token().child_token();
        let mut upstream = self.inner.upstream.clone();
        let inner = self.inner.clone();
        let stop = token.clone();

        let launched = self.inner.scope.launch(async move {
            debug!("Observing {}", inner.name);
            let first = upstream.borrow_and_update().clone();
            inner.local.send_replace(Some(first));
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = upstream.changed() => {
                        if changed.is_err() {
                            debug!("Upstream of {} closed", inner.name);
                            break;
                        }
                        let value = upstream.borrow_and_update().clone();
                        inner.local.send_replace(Some(value));
                    }
                }
            }
            debug!("Stopped observing {}", inner.name);
        });

        if launched.is_some() {
            control.forwarder = Some(token);
        }
    }

    fn schedule_stop(&self, control: &mut Control) {
        control.generation += 1;
        let generation = control.generation;
        let state = self.clone();

        self.inner.scope.launch(async move {
            tokio::time::sleep(state.inner.grace).await;
            let mut control = state.lock_control();
            if control.subscribers == 0 && control.generation == generation {
                if let Some(token) = control.forwarder.take() {
                    debug!("No subscribers to {} for {:?}, stopping", state.inner.name, state.inner.grace);
                    token.cancel();
                }
            }
        });
    }

    fn unsubscribe(&self) {
        let mut control = self.lock_control();
        control.subscribers = control.subscribers.saturating_sub(1);
        if control.subscribers == 0 {
            self.schedule_stop(&mut control);
        }
    }
}

/// A live attachment to an [`ObservedState`]; detaches on drop
pub struct Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    state: ObservedState<T>,
    rx: watch::Receiver<Option<T>>,
}

impl<T> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Latest value, if one has been observed
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait up to `timeout` for the first value
    pub async fn ready(&mut self, timeout: Duration) -> Option<T> {
        match tokio::time::timeout(timeout, self.rx.wait_for(|v| v.is_some())).await {
            Ok(Ok(value)) => value.clone(),
            _ => None,
        }
    }
}

impl<T> Drop for Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.state.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_first_value_is_forwarded() {
        let scope = LifecycleScope::new("test");
        let (_tx, rx) = watch::channel(7u32);
        let state = ObservedState::state_in("numbers", rx, &scope, GRACE);

        let mut sub = state.subscribe();
        assert_eq!(sub.ready(Duration::from_secs(1)).await, Some(7));
        assert_eq!(state.value(), Some(7));
    }

    #[tokio::test]
    async fn test_updates_reach_subscribers() {
        let scope = LifecycleScope::new("test");
        let (tx, rx) = watch::channel(1u32);
        let state = ObservedState::state_in("numbers", rx, &scope, GRACE);
        let mut sub = state.subscribe();
        sub.ready(Duration::from_secs(1)).await;

        tx.send_replace(2);
        let mut probe = state.inner.local.subscribe();
        probe
            .wait_for(|v| *v == Some(2))
            .await
            .unwrap();
        assert_eq!(sub.current(), Some(2));
    }

    #[tokio::test]
    async fn test_stops_after_grace_and_resumes() {
        let scope = LifecycleScope::new("test");
        let (tx, rx) = watch::channel(1u32);
        let state = ObservedState::state_in("numbers", rx, &scope, GRACE);

        {
            let mut sub = state.subscribe();
            sub.ready(Duration::from_secs(1)).await;
        }
        assert_eq!(state.subscriber_count(), 0);
        tokio::time::sleep(GRACE * 4).await;
        assert!(!state.is_observing());

        // Not forwarded while stopped; last value is kept
        tx.send_replace(5);
        tokio::time::sleep(GRACE).await;
        assert_eq!(state.value(), Some(1));

        let mut sub = state.subscribe();
        assert!(state.is_observing());
        let mut probe = state.inner.local.subscribe();
        probe.wait_for(|v| *v == Some(5)).await.unwrap();
        assert_eq!(sub.ready(Duration::from_secs(1)).await, Some(5));
    }

    #[tokio::test]
    async fn test_resubscribe_within_grace_keeps_observing() {
        let scope = LifecycleScope::new("test");
        let (_tx, rx) = watch::channel(1u32);
        let state = ObservedState::state_in("numbers", rx, &scope, Duration::from_millis(200));

        drop(state.subscribe());
        let _sub = state.subscribe();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(state.is_observing());
    }

    #[tokio::test]
    async fn test_not_ready_after_scope_shutdown() {
        let scope = LifecycleScope::new("test");
        scope.shutdown().await;
        let (_tx, rx) = watch::channel(1u32);
        let state = ObservedState::state_in("numbers", rx, &scope, GRACE);

        let mut sub = state.subscribe();
        assert_eq!(sub.ready(Duration::from_millis(50)).await, None);
    }
}

//! Caller-supplied completion callbacks
//!
//! Callbacks are invoked at most once per request, from a worker task.
//! The `Channel*` types turn a callback into a oneshot receiver, which is
//! how in-process callers and tests await an outcome.

use std::sync::Mutex;
use tokio::sync::oneshot;

/// Completion callback for operations without a result value
pub trait RemoteCallback: Send + Sync {
    fn on_success(&self);

    /// `message` is a human readable reason, when one is known
    fn on_error(&self, message: Option<String>);
}

/// Receives the primary tunnel name, `None` when there is no primary tunnel
pub trait TunnelNameCallback: Send + Sync {
    fn on_name(&self, name: Option<String>);
}

/// Receives every stored tunnel name
pub trait TunnelListCallback: Send + Sync {
    fn on_names(&self, names: Vec<String>);

    fn on_error(&self, message: Option<String>);
}

/// Outcome delivered to a [`RemoteCallback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success,
    Error(Option<String>),
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallbackOutcome::Success)
    }
}

fn deliver<T>(slot: &Mutex<Option<oneshot::Sender<T>>>, value: T) {
    let sender = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(tx) = sender {
        // The receiver may have stopped waiting
        let _ = tx.send(value);
    }
}

/// [`RemoteCallback`] that forwards the first outcome to a oneshot channel
pub struct ChannelCallback {
    tx: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl ChannelCallback {
    pub fn new() -> (Self, oneshot::Receiver<CallbackOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl RemoteCallback for ChannelCallback {
    fn on_success(&self) {
        deliver(&self.tx, CallbackOutcome::Success);
    }

    fn on_error(&self, message: Option<String>) {
        deliver(&self.tx, CallbackOutcome::Error(message));
    }
}

pub struct ChannelNameCallback {
    tx: Mutex<Option<oneshot::Sender<Option<String>>>>,
}

impl ChannelNameCallback {
    pub fn new() -> (Self, oneshot::Receiver<Option<String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl TunnelNameCallback for ChannelNameCallback {
    fn on_name(&self, name: Option<String>) {
        deliver(&self.tx, name);
    }
}

pub struct ChannelTunnelListCallback {
    tx: Mutex<Option<oneshot::Sender<Result<Vec<String>, Option<String>>>>>,
}

impl ChannelTunnelListCallback {
    pub fn new() -> (Self, oneshot::Receiver<Result<Vec<String>, Option<String>>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl TunnelListCallback for ChannelTunnelListCallback {
    fn on_names(&self, names: Vec<String>) {
        deliver(&self.tx, Ok(names));
    }

    fn on_error(&self, message: Option<String>) {
        deliver(&self.tx, Err(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_first_outcome_is_delivered() {
        let (callback, rx) = ChannelCallback::new();
        callback.on_error(Some("boom".to_string()));
        callback.on_success();
        assert_eq!(rx.await.unwrap(), CallbackOutcome::Error(Some("boom".to_string())));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_ignored() {
        let (callback, rx) = ChannelNameCallback::new();
        drop(rx);
        callback.on_name(Some("office".to_string()));
    }
}

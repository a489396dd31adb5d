//! Transient user messages
//!
//! Any part of the shell can post a message through a cloned
//! [`SnackbarHost`]; the frontend drains them from the [`SnackbarQueue`] in
//! posting order.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Label of the dismiss action on every message
pub const ACTION_LABEL: &str = "Okay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnackbarDuration {
    Short,
    Long,
}

impl SnackbarDuration {
    pub fn as_duration(self) -> Duration {
        match self {
            SnackbarDuration::Short => Duration::from_secs(4),
            SnackbarDuration::Long => Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnackbarMessage {
    pub message: String,
    pub action_label: String,
    pub duration: SnackbarDuration,
}

/// Posting side, cheap to clone
#[derive(Debug, Clone)]
pub struct SnackbarHost {
    tx: mpsc::UnboundedSender<SnackbarMessage>,
}

/// Displaying side
#[derive(Debug)]
pub struct SnackbarQueue {
    rx: mpsc::UnboundedReceiver<SnackbarMessage>,
}

impl SnackbarHost {
    pub fn channel() -> (SnackbarHost, SnackbarQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SnackbarHost { tx }, SnackbarQueue { rx })
    }

    /// Post a short message with the dismiss action
    pub fn show(&self, message: impl Into<String>) {
        let message = SnackbarMessage {
            message: message.into(),
            action_label: ACTION_LABEL.to_string(),
            duration: SnackbarDuration::Short,
        };
        debug!("Snackbar: {}", message.message);
        if self.tx.send(message).is_err() {
            warn!("Snackbar queue closed, message dropped");
        }
    }
}

impl SnackbarQueue {
    /// Messages posted so far, oldest first
    pub fn drain(&mut self) -> Vec<SnackbarMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Wait for the next message
    pub async fn next(&mut self) -> Option<SnackbarMessage> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_keep_posting_order() {
        let (host, mut queue) = SnackbarHost::channel();
        let other = host.clone();
        host.show("first");
        other.show("second");

        let messages = queue.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "first");
        assert_eq!(messages[1].message, "second");
        assert_eq!(messages[0].action_label, "Okay");
        assert_eq!(messages[0].duration, SnackbarDuration::Short);
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn test_next_waits_for_message() {
        let (host, mut queue) = SnackbarHost::channel();
        tokio::spawn(async move { host.show("later") });
        assert_eq!(queue.next().await.unwrap().message, "later");
    }
}

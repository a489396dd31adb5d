//! Fault boundary for remote requests
//!
//! Request handlers run behind [`guard`], which turns both errors and panics
//! into an [`AutoTunnelError`]. [`report`] hands the outcome to the caller's
//! callback and logs failures. A panicking callback is logged and dropped.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

use super::callback::RemoteCallback;
use crate::error::{AutoTunnelError, AutoTunnelResult};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a handler, converting a panic into [`AutoTunnelError::Panicked`]
pub async fn guard<F, T>(fut: F) -> AutoTunnelResult<T>
where
    F: Future<Output = AutoTunnelResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(AutoTunnelError::Panicked(panic_message(payload))),
    }
}

/// Invoke a callback method, containing any panic it raises
pub fn notify<F>(operation: &str, invoke: F)
where
    F: FnOnce(),
{
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(invoke)) {
        error!("{}: callback panicked: {}", operation, panic_message(payload));
    }
}

/// Deliver `result` to `callback`
pub fn report(operation: &str, result: AutoTunnelResult<()>, callback: &dyn RemoteCallback) {
    match result {
        Ok(()) => {
            debug!("{} succeeded", operation);
            notify(operation, || callback.on_success());
        }
        Err(e) => {
            error!("{} failed: {}", operation, e);
            let message = e.to_string();
            notify(operation, || callback.on_error(Some(message)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::callback::{CallbackOutcome, ChannelCallback};

    #[tokio::test]
    async fn test_guard_passes_results_through() {
        assert_eq!(guard(async { Ok::<_, AutoTunnelError>(3) }).await.unwrap(), 3);

        let err = guard(async { Err::<(), _>(AutoTunnelError::NotFound("x".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AutoTunnelError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_guard_catches_panics() {
        let err = guard(async {
            if true {
                panic!("handler exploded");
            }
            Ok::<(), AutoTunnelError>(())
        })
        .await
        .unwrap_err();

        match err {
            AutoTunnelError::Panicked(message) => assert_eq!(message, "handler exploded"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_report_error_carries_message() {
        let (callback, rx) = ChannelCallback::new();
        report(
            "set_tunnel",
            Err(AutoTunnelError::TunnelNotFound("office".to_string())),
            &callback,
        );
        assert_eq!(
            rx.await.unwrap(),
            CallbackOutcome::Error(Some("No such tunnel: office".to_string()))
        );
    }

    struct PanickingCallback;

    impl RemoteCallback for PanickingCallback {
        fn on_success(&self) {
            panic!("caller went away");
        }

        fn on_error(&self, _message: Option<String>) {
            panic!("caller went away");
        }
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        report("save_tunnel", Ok(()), &PanickingCallback);
    }
}

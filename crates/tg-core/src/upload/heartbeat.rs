//! Periodic "uploading N%" notifications sent while an upload is in flight.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressState;
use crate::api::Api;
use crate::errors::InvokeError;
use crate::rpc::Peer;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Notify `target` of upload progress immediately and then every `interval`.
///
/// Returns `Ok` once `done` fires and `Cancelled` if `cancel` fires first.
/// Failed notifications are logged and skipped.
pub async fn run_heartbeat(
    api: &Api,
    cancel: &CancellationToken,
    done: &CancellationToken,
    target: &Peer,
    state: &ProgressState,
    interval: Duration,
) -> Result<(), InvokeError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
            _ = done.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let percent = state.percent();
        tokio::select! {
            biased;
            _ = done.cancelled() => return Ok(()),
            sent = api.set_upload_action(cancel, target, percent) => match sent {
                Ok(()) => log::trace!("upload heartbeat sent at {percent}%"),
                Err(InvokeError::Cancelled) => return Err(InvokeError::Cancelled),
                Err(err) => log::warn!("upload progress notification failed: {err}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::mock::ScriptedInvoker;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn beats_immediately_then_on_interval_until_done() {
        let transport = Arc::new(ScriptedInvoker::default());
        let api = Api::new(transport.clone());
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let state = ProgressState::new(100);

        let stopper = {
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(12)).await;
                done.cancel();
            })
        };
        run_heartbeat(&api, &cancel, &done, &Peer::SelfPeer, &state, HEARTBEAT_INTERVAL)
            .await
            .unwrap();
        stopper.await.unwrap();

        // t = 0, 5, 10
        assert_eq!(transport.call_count(), 3);
        let calls = transport.calls.lock();
        assert_eq!(calls[0].1.params["action"]["progress"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notifications_do_not_stop_the_heartbeat() {
        let transport = Arc::new(ScriptedInvoker::new(vec![Err(InvokeError::permanent(
            "CHAT_WRITE_FORBIDDEN",
        ))]));
        let api = Api::new(transport.clone());
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let state = ProgressState::new(100);

        let stopper = {
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(6)).await;
                done.cancel();
            })
        };
        run_heartbeat(&api, &cancel, &done, &Peer::SelfPeer, &state, HEARTBEAT_INTERVAL)
            .await
            .unwrap();
        stopper.await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn external_cancellation_is_an_error() {
        let api = Api::new(Arc::new(ScriptedInvoker::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_heartbeat(
            &api,
            &cancel,
            &CancellationToken::new(),
            &Peer::SelfPeer,
            &ProgressState::new(1),
            HEARTBEAT_INTERVAL,
        )
        .await
        .unwrap_err();
        assert_eq!(err, InvokeError::Cancelled);
    }
}

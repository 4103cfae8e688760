//! Scheduling of the validation probe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::authority::{ProbeOutcome, ProfileSource, SessionAuthority};
use crate::navigation::Visibility;

/// Background task that validates the session after startup and every time
/// the application comes back to the foreground.
///
/// Stopping (or dropping) the monitor cancels the task, including a probe
/// that is still in flight.
#[derive(Debug)]
pub struct SessionMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Spawn the monitor on the current runtime.
    pub fn start(
        authority: Arc<SessionAuthority>,
        source: Arc<dyn ProfileSource>,
        mut visibility: watch::Receiver<Visibility>,
        startup_delay: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(startup_delay) => {}
            }

            // Transitions that happened before the first probe are covered by it.
            visibility.borrow_and_update();
            if !probe(&authority, source.as_ref(), &token, "startup").await {
                return;
            }

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            debug!("Visibility signal closed; monitor exiting");
                            break;
                        }
                        let now = *visibility.borrow_and_update();
                        if now == Visibility::Visible
                            && !probe(&authority, source.as_ref(), &token, "foreground").await
                        {
                            break;
                        }
                    }
                }
            }
        });

        info!(name: "session.monitor.started", "Session monitor started");
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel the monitor and wait for it to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(name: "session.monitor.stopped", "Session monitor stopped");
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run one probe unless cancelled first. Returns `false` on cancellation.
async fn probe(
    authority: &SessionAuthority,
    source: &dyn ProfileSource,
    cancel: &CancellationToken,
    trigger: &'static str,
) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        outcome = authority.validate_session(source) => {
            match &outcome {
                ProbeOutcome::Purged(reason) => {
                    info!(name: "session.monitor.purged", trigger, reason = %reason, "Probe ended the session");
                }
                other => debug!(name: "session.monitor.probed", trigger, outcome = ?other, "Probe finished"),
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::Result;
    use crate::navigation::Navigator;
    use crate::session::{Identity, ProfilePayload};
    use crate::storage::StoreSet;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingProfiles {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileSource for CountingProfiles {
        async fn fetch_profile(&self, _user_id: i64) -> Result<ProfilePayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProfilePayload::default())
        }
    }

    fn signed_in() -> Arc<SessionAuthority> {
        let authority = SessionAuthority::new(StoreSet::in_memory(), &SessionConfig::default());
        let identity = Identity {
            id: Some(1),
            ..Identity::default()
        };
        authority.establish("t", &identity, true).unwrap();
        Arc::new(authority)
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_after_startup_and_on_foreground() {
        let authority = signed_in();
        let source = Arc::new(CountingProfiles::default());
        let navigator = Navigator::new("/admin");

        let monitor = SessionMonitor::start(
            authority,
            source.clone(),
            navigator.visibility(),
            Duration::from_millis(1500),
        );

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        navigator.set_visibility(Visibility::Hidden);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        navigator.set_visibility(Visibility::Visible);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        monitor.stop().await;

        navigator.set_visibility(Visibility::Hidden);
        navigator.set_visibility(Visibility::Visible);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_startup_probe() {
        let source = Arc::new(CountingProfiles::default());
        let navigator = Navigator::new("/");

        let monitor = SessionMonitor::start(
            signed_in(),
            source.clone(),
            navigator.visibility(),
            Duration::from_secs(5),
        );
        monitor.stop().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}

//! Timer-driven refresh of raw totals plus route-driven acknowledgment.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BadgeSource, BadgeTracker};
use crate::config::BadgeConfig;
use crate::navigation::Navigator;

/// Owns the polling task for a [`BadgeTracker`].
///
/// Each tick spawns its own fetch, so a slow response does not delay the
/// next poll; whichever response resolves last wins. Stopping (or dropping)
/// the poller cancels the loop and aborts fetches still in flight, so their
/// results are never applied.
#[derive(Debug)]
pub struct BadgePoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BadgePoller {
    /// Spawn the poller on the current runtime.
    ///
    /// The current route is acknowledged first, then every visit the
    /// navigator reports afterwards.
    pub fn start(
        tracker: Arc<BadgeTracker>,
        source: Arc<dyn BadgeSource>,
        navigator: &Navigator,
        config: &BadgeConfig,
    ) -> Self {
        let mut visits = navigator.visits();
        let initial_route = navigator.current();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = config.poll_interval();
        let first_tick = Instant::now() + config.initial_delay();

        let handle = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut visits_open = true;

            tracker.on_route(&initial_route);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let tracker = Arc::clone(&tracker);
                        let source = Arc::clone(&source);
                        in_flight.spawn(async move {
                            tracker.fetch_raw_totals(source.as_ref()).await;
                        });
                    }
                    visit = visits.recv(), if visits_open => match visit {
                        Ok(route) => {
                            tracker.on_route(&route);
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!(name: "badges.poller.lagged", missed, "Missed navigation events");
                        }
                        Err(RecvError::Closed) => visits_open = false,
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            debug!(error = %e, "Badge fetch task ended abnormally");
                        }
                    }
                }
            }

            in_flight.abort_all();
        });

        info!(
            name: "badges.poller.started",
            interval_secs = period.as_secs(),
            "Badge poller started"
        );
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel polling and wait for the task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(name: "badges.poller.stopped", "Badge poller stopped");
    }
}

impl Drop for BadgePoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//! Unseen-count bookkeeping.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{BadgeCategory, BadgeCounts, RawTotals, VisibleBadges, Watermarks};
use crate::error::Result;
use crate::session::SessionAuthority;
use crate::storage::KeyValueStore;

/// Fetches the server's per-category totals.
#[async_trait]
pub trait BadgeSource: Send + Sync {
    async fn fetch_badge_totals(&self) -> Result<RawTotals>;
}

#[derive(Debug, Default)]
struct TrackerState {
    totals: RawTotals,
    watermarks: Watermarks,
}

/// Turns raw totals into "new since last viewed" badges.
///
/// Only this type writes the watermark keys. Visible badges are recomputed
/// after every mutation and published on a `watch` channel.
#[derive(Debug)]
pub struct BadgeTracker {
    authority: Arc<SessionAuthority>,
    store: Arc<dyn KeyValueStore>,
    state: RwLock<TrackerState>,
    visible: watch::Sender<VisibleBadges>,
}

impl BadgeTracker {
    /// Create a tracker, loading persisted watermarks from `store`.
    pub fn new(authority: Arc<SessionAuthority>, store: Arc<dyn KeyValueStore>) -> Self {
        let mut watermarks = Watermarks::default();
        for category in BadgeCategory::ALL {
            let value = store
                .get(category.storage_key())
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(0);
            watermarks.set(category, value);
        }
        let (visible, _) = watch::channel(VisibleBadges::default());

        Self {
            authority,
            store,
            state: RwLock::new(TrackerState {
                totals: RawTotals::default(),
                watermarks,
            }),
            visible,
        }
    }

    /// Refresh raw totals from the server.
    ///
    /// Without a token this does nothing. Failures keep the previous snapshot
    /// and are only logged. Returns whether the snapshot was replaced.
    pub async fn fetch_raw_totals(&self, source: &dyn BadgeSource) -> bool {
        if !self.authority.is_authenticated() {
            return false;
        }

        match source.fetch_badge_totals().await {
            Ok(totals) => {
                // The session may have ended while the request was in flight.
                if !self.authority.is_authenticated() {
                    return false;
                }
                self.apply_totals(totals);
                true
            }
            Err(e) => {
                debug!(name: "badges.fetch.failed", error = %e, "Keeping last badge totals");
                false
            }
        }
    }

    /// Replace the raw totals snapshot wholesale.
    pub fn apply_totals(&self, totals: RawTotals) {
        self.with_state(|state| state.totals = totals);
    }

    /// Acknowledge the category whose listing route is `route`.
    pub fn on_route(&self, route: &str) -> Option<BadgeCategory> {
        let category = BadgeCategory::from_route(route);
        match category {
            Some(category) => {
                let acknowledged = self.with_state(|state| {
                    let raw = state.totals.get(category);
                    state.watermarks.set(category, raw);
                    raw
                });
                self.persist(category, acknowledged);
                debug!(name: "badges.acknowledged", category = %category, watermark = acknowledged, "Badge acknowledged");
            }
            None => self.recompute(),
        }
        category
    }

    /// Force a category's watermark back to zero so its badge reappears.
    pub fn reset_watermark(&self, category: BadgeCategory) {
        self.with_state(|state| state.watermarks.set(category, 0));
        self.persist(category, 0);
        debug!(name: "badges.reset", category = %category, "Badge watermark reset");
    }

    /// Current unseen counts.
    pub fn visible(&self) -> VisibleBadges {
        *self.visible.borrow()
    }

    /// Watch unseen counts.
    pub fn subscribe(&self) -> watch::Receiver<VisibleBadges> {
        self.visible.subscribe()
    }

    /// Last raw totals snapshot.
    pub fn totals(&self) -> RawTotals {
        self.read(|state| state.totals)
    }

    /// Current watermarks.
    pub fn watermarks(&self) -> Watermarks {
        self.read(|state| state.watermarks)
    }

    fn read<T>(&self, f: impl FnOnce(&TrackerState) -> T) -> T {
        let guard = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }

    /// Mutate state, then recompute.
    fn with_state<T>(&self, f: impl FnOnce(&mut TrackerState) -> T) -> T {
        let result = {
            let mut guard = self
                .state
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&mut guard)
        };
        self.recompute();
        result
    }

    fn recompute(&self) {
        let next = self.read(|state| BadgeCounts::unseen(&state.totals, &state.watermarks));
        self.visible.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn persist(&self, category: BadgeCategory, value: u64) {
        if let Err(e) = self.store.set(category.storage_key(), &value.to_string()) {
            warn!(category = %category, error = %e, "Failed to persist badge watermark");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::Error;
    use crate::session::Identity;
    use crate::storage::{MemoryStore, StoreSet};

    fn signed_in_authority() -> Arc<SessionAuthority> {
        let authority = SessionAuthority::new(StoreSet::in_memory(), &SessionConfig::default());
        let identity = Identity {
            id: Some(1),
            ..Identity::default()
        };
        authority.establish("t", &identity, true).unwrap();
        Arc::new(authority)
    }

    fn tracker() -> BadgeTracker {
        BadgeTracker::new(signed_in_authority(), Arc::new(MemoryStore::new()))
    }

    fn totals(posts: u64) -> RawTotals {
        RawTotals {
            posts,
            services: 1,
            upgrade_requests: 0,
            messages: 4,
        }
    }

    struct FixedSource(Result<RawTotals>);

    #[async_trait]
    impl BadgeSource for FixedSource {
        async fn fetch_badge_totals(&self) -> Result<RawTotals> {
            match &self.0 {
                Ok(totals) => Ok(*totals),
                Err(_) => Err(Error::Api {
                    status: 500,
                    message: "boom".into(),
                }),
            }
        }
    }

    #[test]
    fn test_acknowledgment_is_idempotent() {
        let tracker = tracker();
        tracker.apply_totals(totals(6));

        assert_eq!(
            tracker.on_route("/admin/posts-approval"),
            Some(BadgeCategory::Posts)
        );
        assert_eq!(tracker.visible().posts, 0);

        tracker.on_route("/admin/posts-approval");
        assert_eq!(tracker.visible().posts, 0);
        assert_eq!(tracker.watermarks().posts, 6);
    }

    #[test]
    fn test_reset_makes_badge_reappear() {
        let tracker = tracker();
        tracker.apply_totals(totals(5));
        tracker.on_route("/admin/posts-approval");
        assert_eq!(tracker.visible().posts, 0);

        tracker.reset_watermark(BadgeCategory::Posts);

        assert_eq!(tracker.visible().posts, 5);
    }

    #[test]
    fn test_lowered_total_clamps_to_zero() {
        let tracker = tracker();
        tracker.apply_totals(totals(9));
        tracker.on_route("/admin/posts-approval");

        tracker.apply_totals(totals(4));

        assert_eq!(tracker.visible().posts, 0);
        assert_eq!(tracker.watermarks().posts, 9);
    }

    #[test]
    fn test_unrelated_route_only_recomputes() {
        let tracker = tracker();
        tracker.apply_totals(totals(3));
        assert_eq!(tracker.on_route("/admin/dashboard"), None);
        assert_eq!(tracker.visible(), totals(3));
    }

    #[test]
    fn test_watermarks_are_persisted_and_reloaded() {
        let authority = signed_in_authority();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first = BadgeTracker::new(Arc::clone(&authority), Arc::clone(&store));
        first.apply_totals(totals(7));
        first.on_route("/admin/posts-approval");
        assert_eq!(store.get("viewedBadge.posts").as_deref(), Some("7"));

        let second = BadgeTracker::new(authority, store);
        second.apply_totals(totals(10));
        assert_eq!(second.visible().posts, 3);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_snapshot() {
        let tracker = tracker();
        assert!(tracker.fetch_raw_totals(&FixedSource(Ok(totals(2)))).await);

        let failing = FixedSource(Err(Error::NotAuthenticated));
        assert!(!tracker.fetch_raw_totals(&failing).await);

        assert_eq!(tracker.totals(), totals(2));
        assert_eq!(tracker.visible().posts, 2);
    }

    #[tokio::test]
    async fn test_fetch_without_token_is_noop() {
        let authority = signed_in_authority();
        authority.logout();
        let tracker = BadgeTracker::new(authority, Arc::new(MemoryStore::new()));

        assert!(!tracker.fetch_raw_totals(&FixedSource(Ok(totals(2)))).await);
        assert_eq!(tracker.totals(), RawTotals::default());
    }

    /// Ends the session while the request is in flight.
    struct LogoutDuringFetch(Arc<SessionAuthority>);

    #[async_trait]
    impl BadgeSource for LogoutDuringFetch {
        async fn fetch_badge_totals(&self) -> Result<RawTotals> {
            self.0.logout();
            Ok(totals(9))
        }
    }

    #[tokio::test]
    async fn test_fetch_resolving_after_logout_is_discarded() {
        let authority = signed_in_authority();
        let tracker = BadgeTracker::new(Arc::clone(&authority), Arc::new(MemoryStore::new()));
        tracker.apply_totals(totals(3));

        assert!(!tracker.fetch_raw_totals(&LogoutDuringFetch(authority)).await);

        assert_eq!(tracker.totals(), totals(3));
        assert_eq!(tracker.visible().posts, 3);
    }

    #[tokio::test]
    async fn test_visit_then_poll_shows_new_items() {
        let tracker = tracker();
        let mut badges = tracker.subscribe();

        tracker.fetch_raw_totals(&FixedSource(Ok(totals(10)))).await;
        assert_eq!(badges.borrow_and_update().posts, 10);

        tracker.on_route("/admin/posts-approval");
        assert_eq!(tracker.watermarks().posts, 10);
        assert_eq!(badges.borrow_and_update().posts, 0);

        tracker.fetch_raw_totals(&FixedSource(Ok(totals(12)))).await;
        assert!(badges.has_changed().unwrap());
        assert_eq!(badges.borrow_and_update().posts, 2);
    }
}

//! Current route and foreground visibility.
//!
//! The dispatch layer reads the current route when deciding whether to
//! redirect. Every navigation is also broadcast as a visit so the badge
//! poller sees each one, even several in quick succession. Visibility is a
//! `watch` channel consumed by the session monitor.

use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Whether the application is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Pending visits a slow subscriber may fall behind by.
const VISIT_CAPACITY: usize = 64;

/// Holds the current route and visibility.
#[derive(Debug)]
pub struct Navigator {
    route: watch::Sender<String>,
    visits: broadcast::Sender<String>,
    visibility: watch::Sender<Visibility>,
}

impl Navigator {
    /// Start at `route`, in the foreground.
    pub fn new(route: impl Into<String>) -> Self {
        let (route, _) = watch::channel(route.into());
        let (visits, _) = broadcast::channel(VISIT_CAPACITY);
        let (visibility, _) = watch::channel(Visibility::Visible);
        Self {
            route,
            visits,
            visibility,
        }
    }

    /// The current route.
    pub fn current(&self) -> String {
        self.route.borrow().clone()
    }

    /// Enter `route`.
    ///
    /// Every call is a visit, including a repeat of the current route.
    pub fn navigate(&self, route: impl Into<String>) {
        let route = route.into();
        debug!(name: "navigation.route", route = %route, "Route changed");
        self.route.send_replace(route.clone());
        // No subscribers is fine.
        let _ = self.visits.send(route);
    }

    /// Receive every subsequent visit, in order.
    pub fn visits(&self) -> broadcast::Receiver<String> {
        self.visits.subscribe()
    }

    /// Record a foreground/background transition. Repeats are ignored.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
    }

    /// Current visibility.
    pub fn visibility_now(&self) -> Visibility {
        *self.visibility.borrow()
    }

    /// Watch visibility changes.
    pub fn visibility(&self) -> watch::Receiver<Visibility> {
        self.visibility.subscribe()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new("/")
    }
}

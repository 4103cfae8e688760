//! ESCE session client
//!
//! Client-side session lifecycle and badge delta tracking for the ESCE
//! tour/service booking REST API.
//!
//! # Architecture
//!
//! - **Session Authority**: owns the bearer token and identity snapshot,
//!   authorizes every outbound request and purges state on invalidation
//! - **Dispatch**: a single HTTP chokepoint that routes every call through
//!   the session authority
//! - **Badge Delta Tracker**: turns server totals into "new since last
//!   viewed" counts using persisted watermarks
//!
//! # Modules
//!
//! - [`storage`]: durable and session key-value stores
//! - [`session`]: session authority, identity snapshot, probe monitor
//! - [`navigation`]: current route and foreground visibility
//! - [`client`]: request dispatch chokepoint
//! - [`badges`]: badge tracker and poller

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::default_trait_access)]

pub mod badges;
pub mod client;
pub mod config;
pub mod error;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};

use std::sync::Arc;

use crate::badges::{BadgePoller, BadgeTracker};
use crate::client::ApiClient;
use crate::config::AppConfig;
use crate::navigation::Navigator;
use crate::session::{SessionAuthority, SessionMonitor};
use crate::storage::{FileStore, MemoryStore, StoreSet};

/// Application components wired together.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Session authority over the durable and session stores.
    pub authority: Arc<SessionAuthority>,
    /// Current route and visibility.
    pub navigator: Arc<Navigator>,
    /// HTTP dispatch chokepoint.
    pub client: ApiClient,
    /// Badge delta tracker.
    pub badges: Arc<BadgeTracker>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppContext {
    /// Build the context with a file-backed durable store.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let durable = FileStore::open(config.storage.durable_path())?;
        let stores = StoreSet::new(Arc::new(durable), Arc::new(MemoryStore::new()));
        Self::with_stores(config, stores)
    }

    /// Build the context over injected stores.
    pub fn with_stores(config: AppConfig, stores: StoreSet) -> Result<Self> {
        let watermark_store = Arc::clone(&stores.durable);
        let authority = Arc::new(SessionAuthority::new(stores, &config.session));
        let navigator = Arc::new(Navigator::default());
        let client = ApiClient::new(&config.api, Arc::clone(&authority), Arc::clone(&navigator))?;
        let badges = Arc::new(BadgeTracker::new(Arc::clone(&authority), watermark_store));

        Ok(Self {
            authority,
            navigator,
            client,
            badges,
            config: Arc::new(config),
        })
    }

    /// Start the session monitor.
    pub fn start_monitor(&self) -> SessionMonitor {
        SessionMonitor::start(
            Arc::clone(&self.authority),
            Arc::new(self.client.clone()),
            self.navigator.visibility(),
            self.config.session.startup_probe_delay(),
        )
    }

    /// Start the badge poller.
    pub fn start_poller(&self) -> BadgePoller {
        BadgePoller::start(
            Arc::clone(&self.badges),
            Arc::new(self.client.clone()),
            &self.navigator,
            &self.config.badges,
        )
    }
}

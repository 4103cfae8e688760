//! The session authority: credential storage, request authorization and
//! invalidation handling.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::identity::{Identity, ProfilePayload};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::storage::{IDENTITY_KEY, StoreKind, StoreSet, TOKEN_KEY};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 32;

/// Fetches a user profile for the validation probe.
///
/// Implementations attach authorization but must not run the generic
/// response interception; the probe classifies statuses itself. A non-2xx
/// answer is reported as [`Error::Api`] carrying the status.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, user_id: i64) -> Result<ProfilePayload>;
}

/// Shape of an outbound request body, as far as headers are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Json,
    /// The transport writes `Content-Type` with the part boundary.
    Multipart,
}

/// Why the credential record was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeReason {
    /// A response came back 401.
    Unauthorized,
    /// The validation probe got 403.
    Forbidden,
    /// The validation probe got 404.
    UserNotFound,
    /// The identity snapshot was missing or unreadable.
    CorruptIdentity,
    /// Explicit logout.
    Logout,
}

impl PurgeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::UserNotFound => "user_not_found",
            Self::CorruptIdentity => "corrupt_identity",
            Self::Logout => "logout",
        }
    }
}

impl std::fmt::Display for PurgeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications about the credential lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Established { remembered: bool },
    Refreshed { identity: Identity },
    Purged { reason: PurgeReason, at: DateTime<Utc> },
    Redirect { to: String },
}

/// What the dispatch layer should do with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Hand the response to the caller.
    PassThrough,
    /// The credential was purged; navigate to `redirect` if set.
    SessionEnded { redirect: Option<String> },
    /// Permission denied for this action only.
    Forbidden,
}

/// Result of one validation probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// No token stored, nothing to validate.
    NoSession,
    /// The server confirmed the session; the snapshot was refreshed.
    Refreshed(Identity),
    /// The credential record was removed.
    Purged(PurgeReason),
    /// Network failure, timeout or an unclassified status. Nothing changed.
    Inconclusive(String),
}

/// Single owner of the bearer token and identity snapshot.
///
/// Only this type writes the `token` and `userInfo` keys.
#[derive(Debug)]
pub struct SessionAuthority {
    stores: StoreSet,
    login_route: String,
    public_routes: Vec<String>,
    probe_timeout: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionAuthority {
    /// Create an authority over injected stores.
    pub fn new(stores: StoreSet, config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            stores,
            login_route: config.login_route.clone(),
            public_routes: config.public_routes.clone(),
            probe_timeout: config.probe_timeout(),
            events,
        }
    }

    /// The injected stores.
    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credential access
    // ─────────────────────────────────────────────────────────────────────────

    /// Which store currently holds the token (durable wins).
    pub fn token_location(&self) -> Option<StoreKind> {
        [StoreKind::Durable, StoreKind::Session]
            .into_iter()
            .find(|kind| {
                self.stores
                    .get(*kind)
                    .get(TOKEN_KEY)
                    .is_some_and(|t| !t.is_empty())
            })
    }

    /// The bearer token, durable store first.
    pub fn get_token(&self) -> Option<String> {
        let kind = self.token_location()?;
        self.stores.get(kind).get(TOKEN_KEY)
    }

    /// Whether any store holds a token.
    pub fn is_authenticated(&self) -> bool {
        self.token_location().is_some()
    }

    /// The identity snapshot stored next to the token.
    pub fn identity(&self) -> Result<Option<Identity>> {
        let Some(kind) = self.token_location() else {
            return Ok(None);
        };
        self.stores
            .get(kind)
            .get(IDENTITY_KEY)
            .map(|raw| Identity::from_snapshot(&raw))
            .transpose()
    }

    /// Persist a login outcome.
    ///
    /// `remember` selects the durable store; the other store is cleared so a
    /// single store holds the credential.
    pub fn establish(&self, token: &str, identity: &Identity, remember: bool) -> Result<()> {
        if token.is_empty() {
            return Err(Error::NotAuthenticated);
        }
        let (target, other) = if remember {
            (StoreKind::Durable, StoreKind::Session)
        } else {
            (StoreKind::Session, StoreKind::Durable)
        };
        let snapshot = identity.to_snapshot()?;

        self.stores.get(other).remove(&[TOKEN_KEY, IDENTITY_KEY])?;

        let store = self.stores.get(target);
        store.set(IDENTITY_KEY, &snapshot)?;
        if let Err(e) = store.set(TOKEN_KEY, token) {
            // Never leave an identity without its token.
            if let Err(rollback) = store.remove(&[IDENTITY_KEY]) {
                warn!(
                    name: "session.establish.rollback_failed",
                    store = ?target,
                    error = %rollback,
                    "Failed to remove identity after token write failed"
                );
            }
            return Err(e);
        }

        info!(name: "session.established", remembered = remember, "Session established");
        self.emit(SessionEvent::Established {
            remembered: remember,
        });
        Ok(())
    }

    /// Remove token and identity from both stores.
    ///
    /// Idempotent. A failing store is logged and does not stop the other one
    /// from being cleared.
    pub fn purge(&self, reason: PurgeReason) {
        let had_credential = [StoreKind::Durable, StoreKind::Session]
            .into_iter()
            .any(|kind| {
                let store = self.stores.get(kind);
                store.get(TOKEN_KEY).is_some() || store.get(IDENTITY_KEY).is_some()
            });

        for kind in [StoreKind::Durable, StoreKind::Session] {
            if let Err(e) = self.stores.get(kind).remove(&[TOKEN_KEY, IDENTITY_KEY]) {
                warn!(
                    name: "session.purge.store_failed",
                    store = ?kind,
                    error = %e,
                    "Failed to clear credential from store"
                );
            }
        }

        if had_credential {
            info!(name: "session.purged", reason = %reason, "Session purged");
            self.emit(SessionEvent::Purged {
                reason,
                at: Utc::now(),
            });
        }
    }

    /// Explicit logout.
    pub fn logout(&self) {
        self.purge(PurgeReason::Logout);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request pipeline
    // ─────────────────────────────────────────────────────────────────────────

    /// Prepare outbound headers.
    ///
    /// Sets the bearer token when one is stored. Multipart bodies must reach
    /// the transport without a `Content-Type` so it can write the boundary.
    pub fn attach_authorization(&self, headers: &mut HeaderMap, body: BodyKind) {
        if let Some(token) = self.get_token() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Stored token is not a valid header value"),
            }
        }

        match body {
            BodyKind::Multipart => {
                headers.remove(CONTENT_TYPE);
            }
            BodyKind::Json => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            BodyKind::Empty => {}
        }
    }

    /// Inspect an inbound status.
    pub fn on_response(&self, status: StatusCode, current_route: &str) -> ResponseDisposition {
        match status {
            StatusCode::UNAUTHORIZED => {
                self.purge(PurgeReason::Unauthorized);
                let redirect = (!self.is_public_route(current_route)).then(|| {
                    let to = self.login_route.clone();
                    self.emit(SessionEvent::Redirect { to: to.clone() });
                    to
                });
                ResponseDisposition::SessionEnded { redirect }
            }
            StatusCode::FORBIDDEN => ResponseDisposition::Forbidden,
            _ => ResponseDisposition::PassThrough,
        }
    }

    /// Whether `route` tolerates anonymous access.
    ///
    /// Entries match exactly or as a path prefix; `/` only matches itself.
    pub fn is_public_route(&self, route: &str) -> bool {
        let path = route_path(route);
        self.public_routes.iter().any(|entry| {
            let entry = route_path(entry);
            path == entry
                || (entry != "/"
                    && path
                        .strip_prefix(entry)
                        .is_some_and(|rest| rest.starts_with('/')))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation probe
    // ─────────────────────────────────────────────────────────────────────────

    /// Confirm the stored credential with the server.
    ///
    /// Transient failures never purge. A probe whose token was replaced or
    /// removed while it was in flight discards its result.
    pub async fn validate_session(&self, source: &dyn ProfileSource) -> ProbeOutcome {
        let Some(token) = self.get_token() else {
            return ProbeOutcome::NoSession;
        };

        let identity = match self.identity() {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!(name: "session.probe.no_identity", "Token without identity snapshot");
                self.purge(PurgeReason::CorruptIdentity);
                return ProbeOutcome::Purged(PurgeReason::CorruptIdentity);
            }
            Err(e) => {
                warn!(name: "session.probe.corrupt_identity", error = %e, "Unreadable identity snapshot");
                self.purge(PurgeReason::CorruptIdentity);
                return ProbeOutcome::Purged(PurgeReason::CorruptIdentity);
            }
        };

        let Some(user_id) = identity.user_id() else {
            warn!(name: "session.probe.no_user_id", "Identity snapshot has no user id");
            self.purge(PurgeReason::CorruptIdentity);
            return ProbeOutcome::Purged(PurgeReason::CorruptIdentity);
        };

        debug!(name: "session.probe.started", user_id, "Validating session");

        let result = tokio::time::timeout(self.probe_timeout, source.fetch_profile(user_id)).await;

        let fetched = match result {
            Err(_) => {
                debug!(name: "session.probe.timeout", user_id, "Validation probe timed out");
                return ProbeOutcome::Inconclusive("timeout".into());
            }
            Ok(fetched) => fetched,
        };

        // Neither a refresh nor a purge may touch a credential that replaced
        // this one mid-flight.
        if self.get_token().as_deref() != Some(token.as_str()) {
            debug!(name: "session.probe.stale", "Credential changed during probe");
            return ProbeOutcome::Inconclusive("credential changed during probe".into());
        }
        let profile = match fetched {
            Ok(profile) => profile,
            Err(e) => return self.classify_probe_failure(&e),
        };
        let Some(kind) = self.token_location() else {
            return ProbeOutcome::NoSession;
        };

        let mut refreshed = identity;
        refreshed.merge(profile);
        let persisted = refreshed
            .to_snapshot()
            .and_then(|snapshot| self.stores.get(kind).set(IDENTITY_KEY, &snapshot));
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist refreshed identity");
        }

        debug!(name: "session.probe.refreshed", user_id, "Session confirmed");
        self.emit(SessionEvent::Refreshed {
            identity: refreshed.clone(),
        });
        ProbeOutcome::Refreshed(refreshed)
    }

    fn classify_probe_failure(&self, error: &Error) -> ProbeOutcome {
        let reason = match error.status() {
            Some(401) => PurgeReason::Unauthorized,
            Some(403) => PurgeReason::Forbidden,
            Some(404) => PurgeReason::UserNotFound,
            _ => {
                debug!(name: "session.probe.inconclusive", error = %error, "Validation probe failed");
                return ProbeOutcome::Inconclusive(error.to_string());
            }
        };
        self.purge(reason);
        ProbeOutcome::Purged(reason)
    }
}

/// Strip query and fragment, normalise the trailing slash.
pub(crate) fn route_path(route: &str) -> &str {
    let end = route.find(['?', '#']).unwrap_or(route.len());
    let path = &route[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

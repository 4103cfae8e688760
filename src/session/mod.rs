//! Client-side session lifecycle.
//!
//! The [`SessionAuthority`] is the single source of truth for "is there a
//! usable credential". It attaches the bearer token to outbound requests,
//! inspects every response for invalidation and purges the credential record
//! from both stores when the server stops accepting it.
//!
//! # Architecture
//!
//! - [`Identity`]: the persisted profile snapshot
//! - [`ProfilePayload`]: normalized `GET /user/{id}` response
//! - [`SessionAuthority`]: token access, request pipeline, validation probe
//! - [`SessionMonitor`]: runs the probe after startup and on foreground
//!
//! # Example
//!
//! ```rust
//! use esce_session::config::SessionConfig;
//! use esce_session::session::{Identity, SessionAuthority};
//! use esce_session::storage::StoreSet;
//!
//! let authority = SessionAuthority::new(StoreSet::in_memory(), &SessionConfig::default());
//! let identity = Identity { id: Some(7), ..Identity::default() };
//! authority.establish("token", &identity, false).unwrap();
//!
//! assert_eq!(authority.get_token().as_deref(), Some("token"));
//! authority.logout();
//! assert!(!authority.is_authenticated());
//! ```

mod authority;
mod identity;
mod monitor;

pub use authority::{
    BodyKind, ProbeOutcome, ProfileSource, PurgeReason, ResponseDisposition, SessionAuthority,
    SessionEvent,
};
pub(crate) use authority::route_path;
pub use identity::{Identity, ProfilePayload};
pub use monitor::SessionMonitor;

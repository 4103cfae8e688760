//! Key-value persistence for the credential record and badge watermarks.
//!
//! Two equivalent stores back the client:
//!
//! - the **durable** store survives restarts ("remember me"); the CLI backs
//!   it with a [`FileStore`],
//! - the **session** store lives as long as the process; a [`MemoryStore`].
//!
//! Both are injected through [`StoreSet`] so tests can substitute
//! in-memory stores everywhere.

mod file;
mod memory;

use std::sync::Arc;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage key for the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Storage key for the JSON identity snapshot.
pub const IDENTITY_KEY: &str = "userInfo";

/// A string key-value store with batched removal.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every listed key in one operation.
    ///
    /// Absent keys are ignored. Implementations must not leave a state where
    /// only part of `keys` was removed.
    fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Which of the two stores a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Survives restarts.
    Durable,
    /// Scoped to the running process.
    Session,
}

/// The durable and session stores, shared between components.
#[derive(Debug, Clone)]
pub struct StoreSet {
    pub durable: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
}

impl StoreSet {
    /// Bundle two stores.
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, session }
    }

    /// Two fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Get the store of the given kind.
    pub fn get(&self, kind: StoreKind) -> &Arc<dyn KeyValueStore> {
        match kind {
            StoreKind::Durable => &self.durable,
            StoreKind::Session => &self.session,
        }
    }
}

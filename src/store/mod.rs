//! Hierarchical key-value store seam.
//!
//! [`RemoteStore`] is the small set of tree primitives the device and log
//! stores are built from. [`realtime::RealtimeDatabase`] speaks to a Firebase
//! Realtime Database over REST; [`memory::InMemoryStore`] keeps the tree in
//! process.

pub mod memory;
pub mod realtime;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::FireLogError;

/// Top-level node holding everything this crate writes.
pub const ROOT_NODE: &str = "FireLog";

/// Node holding one configuration record per device.
pub const VENDING_MACHINE_NODE: &str = "FireVendingMachine";

/// Node holding one log collection per device.
pub const LOG_DETAIL_NODE: &str = "FireLogDetail";

/// Characters the realtime database forbids inside a key.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// Slash-separated location in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DbPath {
    segments: Vec<String>,
}

impl DbPath {
    /// The root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Path to a child of this node.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if `key` is empty, has control characters, or
    /// contains `. $ # [ ] /`.
    pub fn child(&self, key: &str) -> Result<Self, FireLogError> {
        validate_key(key)?;
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl std::fmt::Display for DbPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

fn validate_key(key: &str) -> Result<(), FireLogError> {
    if key.is_empty()
        || key.contains(FORBIDDEN_KEY_CHARS)
        || key.chars().any(|c| c.is_control())
    {
        return Err(FireLogError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// `FireLog/FireVendingMachine/{device_id}`
pub fn vending_machine_path(device_id: &str) -> Result<DbPath, FireLogError> {
    DbPath::root()
        .child(ROOT_NODE)?
        .child(VENDING_MACHINE_NODE)?
        .child(device_id)
}

/// `FireLog/FireLogDetail/{device_id}`
pub fn log_detail_path(device_id: &str) -> Result<DbPath, FireLogError> {
    DbPath::root()
        .child(ROOT_NODE)?
        .child(LOG_DETAIL_NODE)?
        .child(device_id)
}

/// Tree primitives offered by the remote store.
///
/// Writes are last-write-wins. `increment` is the only primitive that is
/// safe under concurrent writers to the same leaf.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace the node at `path` with `value`; `null` deletes it.
    async fn set(&self, path: &DbPath, value: Value) -> Result<(), FireLogError>;

    /// Write each child of `fields` under `path`, leaving other children untouched.
    async fn update(&self, path: &DbPath, fields: Map<String, Value>) -> Result<(), FireLogError>;

    /// Atomically add `delta` to the number at `path`, treating a missing node as 0.
    async fn increment(&self, path: &DbPath, delta: i64) -> Result<(), FireLogError>;

    /// Delete the node at `path` and everything below it.
    async fn remove(&self, path: &DbPath) -> Result<(), FireLogError>;

    /// Read the node at `path`, `None` if absent.
    async fn get(&self, path: &DbPath) -> Result<Option<Value>, FireLogError>;

    /// Mint a new unique, time-ordered child key for `parent`.
    fn mint_key(&self, parent: &DbPath) -> Result<String, FireLogError>;
}

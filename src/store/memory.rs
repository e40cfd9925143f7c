//! In-process JSON tree implementing [`RemoteStore`].
//!
//! Mirrors the realtime database's tree semantics closely enough for the
//! device and log stores: `null` and empty objects are never stored, and
//! removing the last child of a node removes the node. Failure switches let
//! tests exercise key-generation and transport errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::FireLogError;
use crate::push_id::PushIdGenerator;
use crate::store::{DbPath, RemoteStore};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    root: Mutex<Value>,
    push_ids: PushIdGenerator,
    fail_key_generation: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `mint_key` fail, as a client that cannot mint keys would.
    pub fn set_fail_key_generation(&self, fail: bool) {
        self.fail_key_generation.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with a 503 status.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.root.lock().map(|root| root.clone()).unwrap_or(Value::Null)
    }

    fn check_writable(&self) -> Result<(), FireLogError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FireLogError::Status {
                code: StatusCode::SERVICE_UNAVAILABLE,
                message: "simulated write failure".to_string(),
            });
        }
        Ok(())
    }

    fn with_root<T>(&self, f: impl FnOnce(&mut Value) -> T) -> Result<T, FireLogError> {
        let mut root = self.root.lock().map_err(|_| FireLogError::Status {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "store lock poisoned".to_string(),
        })?;
        Ok(f(&mut root))
    }
}

/// Replace the node at `segments` below `node`, pruning empty objects on the way back.
fn write_node(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = normalize(value);
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            // Nothing stored below a leaf
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(children) = node {
        let child = children.entry(first.clone()).or_insert(Value::Null);
        write_node(child, rest, value);
        if child.is_null() {
            children.remove(first);
        }
        if children.is_empty() {
            *node = Value::Null;
        }
    }
}

fn read_node<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(node, |current, key| current.get(key))
        .filter(|value| !value.is_null())
}

/// Drop nulls and empty objects, as the database does.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn set(&self, path: &DbPath, value: Value) -> Result<(), FireLogError> {
        self.check_writable()?;
        trace!(path = %path, "set");
        self.with_root(|root| write_node(root, path.segments(), value))
    }

    async fn update(&self, path: &DbPath, fields: Map<String, Value>) -> Result<(), FireLogError> {
        self.check_writable()?;
        trace!(path = %path, fields = fields.len(), "update");
        let children = fields
            .into_iter()
            .map(|(key, value)| path.child(&key).map(|child| (child, value)))
            .collect::<Result<Vec<_>, _>>()?;
        self.with_root(|root| {
            for (child, value) in children {
                write_node(root, child.segments(), value);
            }
        })
    }

    async fn increment(&self, path: &DbPath, delta: i64) -> Result<(), FireLogError> {
        self.check_writable()?;
        trace!(path = %path, delta, "increment");
        self.with_root(|root| {
            let current = read_node(root, path.segments())
                .and_then(Value::as_i64)
                .unwrap_or(0);
            write_node(root, path.segments(), Value::from(current.saturating_add(delta)));
        })
    }

    async fn remove(&self, path: &DbPath) -> Result<(), FireLogError> {
        self.check_writable()?;
        trace!(path = %path, "remove");
        self.with_root(|root| write_node(root, path.segments(), Value::Null))
    }

    async fn get(&self, path: &DbPath) -> Result<Option<Value>, FireLogError> {
        self.with_root(|root| read_node(root, path.segments()).cloned())
    }

    fn mint_key(&self, parent: &DbPath) -> Result<String, FireLogError> {
        if self.fail_key_generation.load(Ordering::SeqCst) {
            return Err(FireLogError::KeyGenerationFailed(format!(
                "simulated key generation failure under {}",
                parent
            )));
        }
        self.push_ids.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> DbPath {
        segments
            .iter()
            .try_fold(DbPath::root(), |p, s| p.child(s))
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        store.set(&path(&["a", "b"]), json!({"x": 1})).await.unwrap();

        assert_eq!(store.get(&path(&["a", "b"])).await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.get(&path(&["a", "b", "x"])).await.unwrap(), Some(json!(1)));
        assert_eq!(store.get(&path(&["a", "c"])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_whole_node() {
        let store = InMemoryStore::new();
        let node = path(&["n"]);
        store.set(&node, json!({"x": 1, "y": 2})).await.unwrap();
        store.set(&node, json!({"x": 5})).await.unwrap();

        assert_eq!(store.get(&node).await.unwrap(), Some(json!({"x": 5})));
    }

    #[tokio::test]
    async fn test_update_merges_children() {
        let store = InMemoryStore::new();
        let node = path(&["n"]);
        store.set(&node, json!({"x": 1, "y": 2})).await.unwrap();

        let mut fields = Map::new();
        fields.insert("y".to_string(), json!(3));
        fields.insert("z".to_string(), json!("new"));
        store.update(&node, fields).await.unwrap();

        assert_eq!(
            store.get(&node).await.unwrap(),
            Some(json!({"x": 1, "y": 3, "z": "new"}))
        );
    }

    #[tokio::test]
    async fn test_increment_missing_and_existing() {
        let store = InMemoryStore::new();
        let counter = path(&["n", "count"]);
        store.increment(&counter, 1).await.unwrap();
        store.increment(&counter, 2).await.unwrap();

        assert_eq!(store.get(&counter).await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_parents() {
        let store = InMemoryStore::new();
        store.set(&path(&["a", "b", "c"]), json!(1)).await.unwrap();
        store.remove(&path(&["a", "b", "c"])).await.unwrap();

        assert_eq!(store.snapshot(), Value::Null);
    }

    #[tokio::test]
    async fn test_nulls_are_not_stored() {
        let store = InMemoryStore::new();
        store
            .set(&path(&["n"]), json!({"x": null, "y": {"z": null}, "w": 0}))
            .await
            .unwrap();

        assert_eq!(store.snapshot(), json!({"n": {"w": 0}}));
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = InMemoryStore::new();
        store.set_fail_key_generation(true);
        assert!(matches!(
            store.mint_key(&path(&["logs"])),
            Err(FireLogError::KeyGenerationFailed(_))
        ));
        store.set_fail_key_generation(false);
        assert!(store.mint_key(&path(&["logs"])).is_ok());

        store.set_fail_writes(true);
        let err = store.set(&path(&["n"]), json!(1)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(store.snapshot(), Value::Null);
    }
}

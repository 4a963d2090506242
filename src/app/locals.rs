//! Per-request mutable state

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Key/value state shared by every hop of one external request.
///
/// Clones share the same values and identity. Two independently created
/// `Locals` never share an identity, even when their contents are equal.
#[derive(Clone)]
pub struct Locals {
    id: Uuid,
    values: Arc<RwLock<Map<String, Value>>>,
}

impl Locals {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            values: Arc::new(RwLock::new(Map::new())),
        }
    }

    /// Opaque identity of this request's state
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key)
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for Locals {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Locals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locals")
            .field("id", &self.id)
            .field("values", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_state() {
        let locals = Locals::new();
        let other = locals.clone();

        other.insert("user", "ada");
        assert_eq!(locals.get("user"), Some(json!("ada")));
        assert_eq!(locals.id(), other.id());
    }

    #[test]
    fn equal_contents_distinct_identity() {
        let a = Locals::new();
        let b = Locals::new();
        a.insert("k", 1);
        b.insert("k", 1);

        assert_eq!(a.snapshot(), b.snapshot());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn remove_value() {
        let locals = Locals::new();
        locals.insert("k", true);
        assert_eq!(locals.remove("k"), Some(json!(true)));
        assert!(locals.get("k").is_none());
    }
}

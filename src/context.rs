//! Per-branch context store.
//!
//! A context maps top-level keys (node ids, plus `"trigger"` for the
//! trigger input) to JSON values. Branches forked by a `parallel` node
//! inherit a snapshot of the parent context; a `join` merges the sibling
//! contexts back together in spawn order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level key under which the trigger input is seeded.
pub const TRIGGER_KEY: &str = "trigger";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunContext {
    values: BTreeMap<String, Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context seeded with the trigger input under [`TRIGGER_KEY`].
    pub fn seeded(input: Value) -> Self {
        let mut ctx = Self::new();
        if !input.is_null() {
            ctx.set(TRIGGER_KEY, input);
        }
        ctx
    }

    /// Write a top-level entry, typically a node's output keyed by its id.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Resolve a dot-path selector, e.g. `"fetch.result.id"`. The first
    /// segment is a top-level key; the rest descend into the value.
    pub fn get(&self, selector: &str) -> Option<&Value> {
        let mut parts = selector.split('.');
        let root = parts.next()?;
        let mut current = self.values.get(root)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge another context into this one; the other context's keys
    /// overwrite existing entries.
    pub fn merge_from(&mut self, other: &RunContext) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}

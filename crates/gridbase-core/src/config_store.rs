//! Pure operations over the global-config key/value store.
//!
//! The store is a nested plain-object map keyed by top-level string keys.
//! Paths may descend into nested plain objects only — arrays, primitives,
//! and null are not containers for config data, and trying to traverse one
//! is a programmer error, not a recoverable condition.
//!
//! Everything here is side-effect free: callers hand in the current store
//! and get back a validated result (or the replacement store plus the set of
//! changed top-level keys).

use crate::mutation::GlobalConfigPathUpdate;
use crate::path::format_path;
use serde_json::{Map, Value};
use thiserror::Error;

/// The in-memory global-config store.
pub type KvStore = Map<String, Value>;

/// Maximum serialized size of the whole store, in bytes.
pub const MAX_CONFIG_SIZE: usize = 150 * 1024;

/// Maximum total number of object keys in the store, counted recursively.
pub const MAX_CONFIG_KEYS: usize = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("global config paths must contain at least one part")]
    EmptyPath,
    #[error("global config path parts must be non-empty strings")]
    EmptySegment,
    #[error("cannot use '*' as a top-level key")]
    WildcardTopLevelKey,
    #[error("value at global config path '{path}' is not a plain object and cannot be traversed")]
    NotAContainer { path: String },
    #[error("global config is limited to {max} bytes (update would make it {actual})")]
    TooLarge { actual: usize, max: usize },
    #[error("global config is limited to {max} keys (update would make it {actual})")]
    TooManyKeys { actual: usize, max: usize },
    #[error("global config could not be serialized: {0}")]
    Serialize(String),
}

/// Validate one config path: non-empty, no empty parts, and `'*'` is never a
/// top-level key (the wildcard is a watch channel, not storage).
pub fn validate_path(path: &[String]) -> Result<(), ConfigError> {
    let Some(first) = path.first() else {
        return Err(ConfigError::EmptyPath);
    };
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(ConfigError::EmptySegment);
    }
    if first == "*" {
        return Err(ConfigError::WildcardTopLevelKey);
    }
    Ok(())
}

/// Strict own-property read. A missing intermediate yields `Ok(None)`;
/// an intermediate that exists but is not a plain object is an error.
pub fn get_at_path<'a>(store: &'a KvStore, path: &[String]) -> Result<Option<&'a Value>, ConfigError> {
    validate_path(path)?;
    let mut current = match store.get(&path[0]) {
        Some(value) => value,
        None => return Ok(None),
    };
    for (i, segment) in path[1..].iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            _ => {
                return Err(ConfigError::NotAContainer {
                    path: format_path(&path[..=i]),
                })
            }
        };
        match map.get(segment) {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// The result of applying a batch of updates: the replacement store and the
/// top-level keys whose values actually changed, in first-touched order.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedConfigUpdates {
    pub store: KvStore,
    pub changed_top_level_keys: Vec<String>,
}

/// Validate every path, apply the batch to a copy of the store, and enforce
/// the size and key-count limits on the result.
pub fn validate_and_apply_updates(
    store: &KvStore,
    updates: &[GlobalConfigPathUpdate],
) -> Result<AppliedConfigUpdates, ConfigError> {
    for update in updates {
        validate_path(&update.path)?;
    }

    let mut next = store.clone();
    for update in updates {
        apply_update(&mut next, update)?;
    }

    let serialized =
        serde_json::to_string(&next).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    if serialized.len() > MAX_CONFIG_SIZE {
        return Err(ConfigError::TooLarge {
            actual: serialized.len(),
            max: MAX_CONFIG_SIZE,
        });
    }
    let key_count = count_keys(&next);
    if key_count > MAX_CONFIG_KEYS {
        return Err(ConfigError::TooManyKeys {
            actual: key_count,
            max: MAX_CONFIG_KEYS,
        });
    }

    let mut changed_top_level_keys = Vec::new();
    for update in updates {
        let root = &update.path[0];
        if changed_top_level_keys.contains(root) {
            continue;
        }
        if store.get(root) != next.get(root) {
            changed_top_level_keys.push(root.clone());
        }
    }

    Ok(AppliedConfigUpdates {
        store: next,
        changed_top_level_keys,
    })
}

fn apply_update(store: &mut KvStore, update: &GlobalConfigPathUpdate) -> Result<(), ConfigError> {
    let (leaf, parents) = match update.path.split_last() {
        Some(split) => split,
        None => return Err(ConfigError::EmptyPath),
    };
    match &update.value {
        Some(value) => {
            let mut current = store;
            for (i, segment) in parents.iter().enumerate() {
                let entry = current
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                current = match entry {
                    Value::Object(map) => map,
                    _ => {
                        return Err(ConfigError::NotAContainer {
                            path: format_path(&update.path[..=i]),
                        })
                    }
                };
            }
            current.insert(leaf.clone(), value.clone());
        }
        None => {
            let mut current = store;
            for (i, segment) in parents.iter().enumerate() {
                current = match current.get_mut(segment) {
                    Some(Value::Object(map)) => map,
                    Some(_) => {
                        return Err(ConfigError::NotAContainer {
                            path: format_path(&update.path[..=i]),
                        })
                    }
                    // Nothing to delete below a missing intermediate.
                    None => return Ok(()),
                };
            }
            current.remove(leaf);
        }
    }
    Ok(())
}

fn count_keys(store: &KvStore) -> usize {
    fn count_value(value: &Value) -> usize {
        match value {
            Value::Object(map) => map.len() + map.values().map(count_value).sum::<usize>(),
            _ => 0,
        }
    }
    store.len() + store.values().map(count_value).sum::<usize>()
}

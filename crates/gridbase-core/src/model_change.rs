//! The generic model-change patcher.
//!
//! A [`ModelChange`] is a single `{path, value}` patch instruction against
//! the cached base tree; `value: None` means "remove the key at `path`",
//! never "set it to null". Batches apply strictly in list order, so a
//! delete-then-recreate of the same id behaves as written.
//!
//! Paths are validated against the tree's schema shape at one boundary
//! ([`validate_change_path`]) instead of ad hoc per-mutation-type checks.
//! Consumers never construct paths pointing outside the subtree their
//! mutation owns; the validation here catches structural mistakes (unknown
//! roots or table sections), which are programmer errors.

use crate::path::format_path;
use serde_json::{Map, Value};
use thiserror::Error;

/// Top-level keys of the cached base tree.
pub const KNOWN_ROOTS: &[&str] = &[
    "name",
    "tablesById",
    "tableOrder",
    "activeTableId",
    "collaboratorsById",
    "currentUserId",
    "permissionLevel",
];

/// Keys allowed directly under `tablesById/<tableId>`.
pub const TABLE_SECTIONS: &[&str] = &[
    "id",
    "name",
    "fieldsById",
    "recordsById",
    "recordOrder",
    "viewsById",
    "viewOrder",
    "activeViewId",
    "loadedFieldIds",
];

/// One `{path, value}` patch instruction. `value: None` deletes the key.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChange {
    pub path: Vec<String>,
    pub value: Option<Value>,
}

impl ModelChange {
    pub fn set(path: Vec<String>, value: Value) -> Self {
        Self {
            path,
            value: Some(value),
        }
    }

    pub fn delete(path: Vec<String>) -> Self {
        Self { path, value: None }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelChangeError {
    #[error("model change paths must contain at least one segment")]
    EmptyPath,
    #[error("model change path '{path}' contains an empty segment")]
    EmptySegment { path: String },
    #[error("'{segment}' is not a known base tree root")]
    UnknownRoot { segment: String },
    #[error("'{segment}' is not a known table section")]
    UnknownTableSection { segment: String },
    #[error("value at '{path}' is not an object and cannot be descended into")]
    NotAnObject { path: String },
    #[error("the base tree root is not an object")]
    RootNotAnObject,
}

/// Validate one change path against the tree's schema shape.
pub fn validate_change_path(path: &[String]) -> Result<(), ModelChangeError> {
    let Some(root) = path.first() else {
        return Err(ModelChangeError::EmptyPath);
    };
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(ModelChangeError::EmptySegment {
            path: format_path(path),
        });
    }
    if !KNOWN_ROOTS.contains(&root.as_str()) {
        return Err(ModelChangeError::UnknownRoot {
            segment: root.clone(),
        });
    }
    if root == "tablesById" {
        if let Some(section) = path.get(2) {
            if !TABLE_SECTIONS.contains(&section.as_str()) {
                return Err(ModelChangeError::UnknownTableSection {
                    segment: section.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Apply a batch of changes to the tree, in list order.
///
/// All paths are validated up front, so a structurally bad batch rejects
/// before the first write. Writes create missing intermediate objects;
/// descending through a primitive or array is a programmer error. Deleting
/// below a missing intermediate is a no-op.
///
/// The patcher itself never notifies watchers — callers notify once the
/// whole batch is written, which is what makes a batch look atomic to
/// observers.
pub fn apply_model_changes(
    tree: &mut Value,
    changes: &[ModelChange],
) -> Result<(), ModelChangeError> {
    if !tree.is_object() {
        return Err(ModelChangeError::RootNotAnObject);
    }
    for change in changes {
        validate_change_path(&change.path)?;
    }
    for change in changes {
        apply_one(tree, change)?;
    }
    Ok(())
}

fn apply_one(tree: &mut Value, change: &ModelChange) -> Result<(), ModelChangeError> {
    let Some((leaf, parents)) = change.path.split_last() else {
        return Err(ModelChangeError::EmptyPath);
    };
    match &change.value {
        Some(value) => {
            let parent = descend_creating(tree, parents)?;
            let map = match parent {
                Value::Object(map) => map,
                _ => {
                    return Err(ModelChangeError::NotAnObject {
                        path: format_path(parents),
                    })
                }
            };
            map.insert(leaf.clone(), value.clone());
            Ok(())
        }
        None => {
            let mut current = tree;
            for (i, segment) in parents.iter().enumerate() {
                let map = match current {
                    Value::Object(map) => map,
                    _ => {
                        return Err(ModelChangeError::NotAnObject {
                            path: format_path(&change.path[..i]),
                        })
                    }
                };
                match map.get_mut(segment) {
                    Some(next) => current = next,
                    // Nothing to delete below a missing intermediate.
                    None => return Ok(()),
                }
            }
            match current {
                Value::Object(map) => {
                    map.remove(leaf);
                    Ok(())
                }
                _ => Err(ModelChangeError::NotAnObject {
                    path: format_path(parents),
                }),
            }
        }
    }
}

fn descend_creating<'a>(
    tree: &'a mut Value,
    path: &[String],
) -> Result<&'a mut Value, ModelChangeError> {
    let mut current = tree;
    for (i, segment) in path.iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            _ => {
                return Err(ModelChangeError::NotAnObject {
                    path: format_path(&path[..i]),
                })
            }
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(current)
}

//! The SDK instance: owner of the cached base tree and its watcher
//! registries.
//!
//! One `Sdk` is constructed per workspace from an initial snapshot and a
//! backend collaborator, then handed by reference to everything that needs
//! it — there is no module-level singleton. The cached tree is the single
//! source of truth: read models borrow it through the instance and recompute
//! on every access, and only two paths ever write to it, the optimistic
//! side of [`Mutations`](crate::mutations::Mutations) and the authoritative
//! push feed wired up here. Both go through the same patcher.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use gridbase_core::config_store::{self, ConfigError, KvStore};
use gridbase_core::model_change::{apply_model_changes, ModelChange, ModelChangeError};
use gridbase_core::mutation::{GlobalConfigPathUpdate, PartialMutation, RecordId, TableId};
use gridbase_core::watchable::{ListenerId, Watchable, WatchableKey, WatchError};
use serde_json::Value;

use crate::backend::{BackendClient, PermissionCheckResult};
use crate::base::Base;
use crate::global_config::GlobalConfig;
use crate::mutations::{MutationError, MutationPolicies, Mutations};
use crate::session::Session;

/// Watch key space for the cached base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseWatchKey {
    /// The base's own name.
    Name,
    /// Any table/field/view structure change.
    Schema,
    TableOrder,
    ActiveTable,
    Collaborators,
    /// The session's permission level.
    Permissions,
    /// Record presence or ordering within one table.
    Records { table_id: TableId },
    /// Any property of one record.
    Record {
        table_id: TableId,
        record_id: RecordId,
    },
    /// One cell of one record.
    CellValue {
        table_id: TableId,
        record_id: RecordId,
        field_id: String,
    },
}

impl WatchableKey for BaseWatchKey {}

/// Watch key space for global config: one top-level key per subscription.
/// `"*"` is not a key — the wildcard lives on its own channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfigWatchKey(pub String);

impl WatchableKey for GlobalConfigWatchKey {
    fn is_watchable(&self) -> bool {
        !self.0.is_empty() && self.0 != "*"
    }
}

/// The state the SDK starts from: the cached base tree and the initial
/// global-config store, both supplied by the transport layer's bootstrap
/// snapshot.
#[derive(Debug, Clone)]
pub struct InitialSnapshot {
    pub base_data: Value,
    pub global_config: KvStore,
}

pub(crate) type UnhandledErrorHandler = Rc<dyn Fn(MutationError)>;

pub(crate) struct SdkInner {
    pub(crate) backend: Rc<dyn BackendClient>,
    pub(crate) base_data: RefCell<Value>,
    pub(crate) base_watchers: Watchable<BaseWatchKey>,
    pub(crate) config_store: RefCell<KvStore>,
    pub(crate) config_watchers: Watchable<GlobalConfigWatchKey>,
    pub(crate) policies: MutationPolicies,
    pub(crate) unhandled_error_handler: RefCell<UnhandledErrorHandler>,
}

impl SdkInner {
    /// Apply a change batch to the tree, then notify the derived watch keys.
    /// No watcher fires until the whole batch is written.
    pub(crate) fn apply_model_changes_internal(
        &self,
        changes: &[ModelChange],
    ) -> Result<(), ModelChangeError> {
        {
            let mut tree = self.base_data.borrow_mut();
            apply_model_changes(&mut tree, changes)?;
        }
        // The borrow is released first: watchers read the tree back.
        let keys = watch_keys_for_changes(changes);
        self.base_watchers.notify_batch(keys.iter());
        Ok(())
    }

    /// Validate-and-apply a config update batch, swap the store, and notify
    /// each changed top-level key, then the wildcard channel once.
    pub(crate) fn apply_config_updates(
        &self,
        updates: &[GlobalConfigPathUpdate],
    ) -> Result<(), ConfigError> {
        let applied = {
            let store = self.config_store.borrow();
            config_store::validate_and_apply_updates(&store, updates)?
        };
        *self.config_store.borrow_mut() = applied.store;
        let keys: Vec<GlobalConfigWatchKey> = applied
            .changed_top_level_keys
            .into_iter()
            .map(GlobalConfigWatchKey)
            .collect();
        self.config_watchers.notify_batch(keys.iter());
        Ok(())
    }

    pub(crate) fn check_permissions(&self, mutation: &PartialMutation) -> PermissionCheckResult {
        let tree = self.base_data.borrow();
        self.backend.check_permissions_for_mutation(mutation, &tree)
    }

    pub(crate) fn report_unhandled_error(&self, error: MutationError) {
        let handler = Rc::clone(&self.unhandled_error_handler.borrow());
        handler(error);
    }
}

/// One SDK instance per workspace.
pub struct Sdk {
    pub(crate) inner: Rc<SdkInner>,
}

impl Sdk {
    pub fn new(backend: Rc<dyn BackendClient>, snapshot: InitialSnapshot) -> Self {
        Self::with_policies(backend, snapshot, MutationPolicies::default())
    }

    /// Construct with explicit mutation policies (record-store readiness,
    /// field availability, default record properties).
    pub fn with_policies(
        backend: Rc<dyn BackendClient>,
        snapshot: InitialSnapshot,
        policies: MutationPolicies,
    ) -> Self {
        let inner = Rc::new(SdkInner {
            backend: Rc::clone(&backend),
            base_data: RefCell::new(snapshot.base_data),
            base_watchers: Watchable::new(),
            config_store: RefCell::new(snapshot.global_config),
            config_watchers: Watchable::new(),
            policies,
            unhandled_error_handler: RefCell::new(default_unhandled_error_handler()),
        });

        let weak: Weak<SdkInner> = Rc::downgrade(&inner);
        backend.subscribe_to_model_updates(Box::new(move |batch| {
            let Some(inner) = weak.upgrade() else { return };
            if let Err(error) = inner.apply_model_changes_internal(&batch.changes) {
                tracing::warn!(%error, "dropping authoritative model change batch");
            }
        }));

        let weak: Weak<SdkInner> = Rc::downgrade(&inner);
        backend.subscribe_to_global_config_updates(Box::new(move |batch| {
            let Some(inner) = weak.upgrade() else { return };
            if let Err(error) = inner.apply_config_updates(&batch.updates) {
                tracing::warn!(%error, "dropping authoritative global config batch");
            }
        }));

        Self { inner }
    }

    pub fn base(&self) -> Base {
        Base {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn session(&self) -> Session {
        Session {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn mutations(&self) -> Mutations {
        Mutations {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn global_config(&self) -> GlobalConfig {
        GlobalConfig {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Register a watcher on the base tree's key space.
    pub fn watch(
        &self,
        key: BaseWatchKey,
        callback: impl Fn(&BaseWatchKey) + 'static,
    ) -> Result<ListenerId, WatchError> {
        self.inner.base_watchers.watch(key, callback)
    }

    /// Register on the base tree's wildcard channel ("any change").
    pub fn watch_any(&self, callback: impl Fn() + 'static) -> ListenerId {
        self.inner.base_watchers.watch_any(callback)
    }

    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        self.inner.base_watchers.unwatch(id)
    }

    /// Replace the detached handler that receives backend failures occurring
    /// after an optimistic apply (see `Mutations::apply_mutation`).
    pub fn on_unhandled_mutation_error(&self, handler: impl Fn(MutationError) + 'static) {
        *self.inner.unhandled_error_handler.borrow_mut() = Rc::new(handler);
    }

    /// Apply an authoritative model-change batch. Normally reached through
    /// the backend subscription; exposed for transports that deliver batches
    /// by hand.
    pub fn apply_model_changes(&self, changes: &[ModelChange]) -> Result<(), ModelChangeError> {
        self.inner.apply_model_changes_internal(changes)
    }
}

fn default_unhandled_error_handler() -> UnhandledErrorHandler {
    Rc::new(|error| {
        tracing::error!(%error, "mutation failed after its optimistic update was applied");
    })
}

/// Derive the watch keys touched by a change batch, deduplicated in
/// first-touched order.
fn watch_keys_for_changes(changes: &[ModelChange]) -> Vec<BaseWatchKey> {
    let mut keys: Vec<BaseWatchKey> = Vec::new();
    let mut push = |keys: &mut Vec<BaseWatchKey>, key: BaseWatchKey| {
        if !keys.contains(&key) {
            keys.push(key);
        }
    };

    for change in changes {
        let segments: Vec<&str> = change.path.iter().map(String::as_str).collect();
        match segments.as_slice() {
            ["name", ..] => push(&mut keys, BaseWatchKey::Name),
            ["tableOrder", ..] => push(&mut keys, BaseWatchKey::TableOrder),
            ["activeTableId", ..] => push(&mut keys, BaseWatchKey::ActiveTable),
            ["collaboratorsById", ..] | ["currentUserId", ..] => {
                push(&mut keys, BaseWatchKey::Collaborators)
            }
            ["permissionLevel", ..] => push(&mut keys, BaseWatchKey::Permissions),
            ["tablesById", table_id, "recordsById", rest @ ..] => {
                let table_id = table_id.to_string();
                match rest {
                    [] => push(&mut keys, BaseWatchKey::Records { table_id }),
                    [record_id] => {
                        push(
                            &mut keys,
                            BaseWatchKey::Record {
                                table_id: table_id.clone(),
                                record_id: record_id.to_string(),
                            },
                        );
                        push(&mut keys, BaseWatchKey::Records { table_id });
                    }
                    [record_id, "cellValuesByFieldId", field_id, ..] => {
                        push(
                            &mut keys,
                            BaseWatchKey::CellValue {
                                table_id: table_id.clone(),
                                record_id: record_id.to_string(),
                                field_id: field_id.to_string(),
                            },
                        );
                        push(
                            &mut keys,
                            BaseWatchKey::Record {
                                table_id,
                                record_id: record_id.to_string(),
                            },
                        );
                    }
                    [record_id, ..] => push(
                        &mut keys,
                        BaseWatchKey::Record {
                            table_id,
                            record_id: record_id.to_string(),
                        },
                    ),
                }
            }
            ["tablesById", table_id, "recordOrder", ..] => push(
                &mut keys,
                BaseWatchKey::Records {
                    table_id: table_id.to_string(),
                },
            ),
            ["tablesById", ..] => push(&mut keys, BaseWatchKey::Schema),
            _ => {}
        }
    }
    keys
}

/// Table subtree lookup, shared by the read models and the orchestrator.
pub(crate) fn table_data<'t>(tree: &'t Value, table_id: &str) -> Option<&'t Value> {
    tree.get("tablesById")?.get(table_id)
}

pub(crate) fn field_data<'t>(table: &'t Value, field_id: &str) -> Option<&'t Value> {
    table.get("fieldsById")?.get(field_id)
}

pub(crate) fn record_data<'t>(table: &'t Value, record_id: &str) -> Option<&'t Value> {
    table.get("recordsById")?.get(record_id)
}

pub(crate) fn table_name(table: &Value, table_id: &str) -> String {
    table
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(table_id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cell_change_notifies_cell_then_record() {
        let changes = vec![ModelChange::set(
            path(&["tablesById", "tblA", "recordsById", "recX", "cellValuesByFieldId", "fld1"]),
            serde_json::json!(1),
        )];
        let keys = watch_keys_for_changes(&changes);
        assert_eq!(
            keys,
            vec![
                BaseWatchKey::CellValue {
                    table_id: "tblA".to_string(),
                    record_id: "recX".to_string(),
                    field_id: "fld1".to_string(),
                },
                BaseWatchKey::Record {
                    table_id: "tblA".to_string(),
                    record_id: "recX".to_string(),
                },
            ]
        );
    }

    #[test]
    fn record_delete_and_order_rewrite_dedupe_to_one_records_key() {
        let changes = vec![
            ModelChange::delete(path(&["tablesById", "tblA", "recordsById", "recX"])),
            ModelChange::set(
                path(&["tablesById", "tblA", "recordOrder"]),
                serde_json::json!([]),
            ),
        ];
        let keys = watch_keys_for_changes(&changes);
        assert_eq!(
            keys,
            vec![
                BaseWatchKey::Record {
                    table_id: "tblA".to_string(),
                    record_id: "recX".to_string(),
                },
                BaseWatchKey::Records {
                    table_id: "tblA".to_string(),
                },
            ]
        );
    }

    #[test]
    fn schema_paths_fold_into_schema_key() {
        let changes = vec![
            ModelChange::set(
                path(&["tablesById", "tblA", "fieldsById", "fld1", "name"]),
                serde_json::json!("Notes"),
            ),
            ModelChange::set(path(&["tablesById", "tblA", "viewOrder"]), serde_json::json!([])),
        ];
        assert_eq!(watch_keys_for_changes(&changes), vec![BaseWatchKey::Schema]);
    }
}

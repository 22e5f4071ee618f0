//! The permissioned, backend-synced global-config handle.
//!
//! Config data lives in its own store, not in the base tree, so reads and
//! optimistic writes bypass the model patcher and go through the pure
//! [`config_store`] operations instead. Writes are ordinary mutations: they
//! are permission-checked and submitted through the orchestrator like any
//! record change, and the optimistic store swap happens inside
//! `apply_mutation` before the network call resolves.

use std::rc::Rc;

use gridbase_core::config_store::{self, ConfigError};
use gridbase_core::mutation::{
    GlobalConfigPathUpdate, Mutation, PartialGlobalConfigPathUpdate, PartialMutation,
};
use gridbase_core::path::parse_path;
use gridbase_core::watchable::{ListenerId, WatchError};
use serde_json::Value;

use crate::backend::PermissionCheckResult;
use crate::mutations::{MutationError, Mutations, MutationSubmission};
use crate::sdk::{GlobalConfigWatchKey, SdkInner};

pub struct GlobalConfig {
    pub(crate) inner: Rc<SdkInner>,
}

impl GlobalConfig {
    /// Read a value by top-level key or `/`-joined path string.
    ///
    /// Traversal is strict: descending into an array, primitive, or null is
    /// a programmer error ([`ConfigError::NotAContainer`]), while a missing
    /// intermediate just yields `None`.
    pub fn get(&self, key_or_path: &str) -> Result<Option<Value>, ConfigError> {
        self.get_at(&parse_path(key_or_path))
    }

    /// Read a value by path segments.
    pub fn get_at(&self, path: &[String]) -> Result<Option<Value>, ConfigError> {
        let store = self.inner.config_store.borrow();
        Ok(config_store::get_at_path(&store, path)?.cloned())
    }

    /// Watch one top-level key. `"*"` is not a key; use [`Self::watch_any`].
    pub fn watch(
        &self,
        key: &str,
        callback: impl Fn() + 'static,
    ) -> Result<ListenerId, WatchError> {
        self.inner
            .config_watchers
            .watch(GlobalConfigWatchKey(key.to_string()), move |_| callback())
    }

    /// Watch the wildcard channel: fires once per applied update batch that
    /// changed anything.
    pub fn watch_any(&self, callback: impl Fn() + 'static) -> ListenerId {
        self.inner.config_watchers.watch_any(callback)
    }

    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        self.inner.config_watchers.unwatch(id)
    }

    /// Pre-flight permission check; `updates` may be `None` ("could I set
    /// anything at all?") or partial.
    pub fn check_permissions_for_set_paths(
        &self,
        updates: Option<&[PartialGlobalConfigPathUpdate]>,
    ) -> PermissionCheckResult {
        let partial = PartialMutation::SetMultipleGlobalConfigPaths {
            updates: updates.map(<[_]>::to_vec),
        };
        self.inner.check_permissions(&partial)
    }

    pub fn has_permission_to_set_paths(
        &self,
        updates: Option<&[PartialGlobalConfigPathUpdate]>,
    ) -> bool {
        self.check_permissions_for_set_paths(updates).has_permission
    }

    /// Set (or delete, with `value: None`) a single key or path.
    pub fn set(
        &self,
        key_or_path: &str,
        value: Option<Value>,
    ) -> Result<MutationSubmission, MutationError> {
        self.set_paths(vec![GlobalConfigPathUpdate {
            path: parse_path(key_or_path),
            value,
        }])
    }

    /// Submit a batch of path updates.
    ///
    /// Invalid paths and missing permission fail synchronously before
    /// anything is applied or sent; otherwise the optimistic store swap is
    /// visible to watchers when this returns, and the future covers the
    /// backend round-trip.
    pub fn set_paths(
        &self,
        updates: Vec<GlobalConfigPathUpdate>,
    ) -> Result<MutationSubmission, MutationError> {
        for update in &updates {
            config_store::validate_path(&update.path)?;
        }
        Mutations {
            inner: Rc::clone(&self.inner),
        }
        .apply_mutation(Mutation::SetMultipleGlobalConfigPaths { updates })
    }
}

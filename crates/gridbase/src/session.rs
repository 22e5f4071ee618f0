//! The Session read model: who is using the SDK, with what standing.

use std::rc::Rc;

use gridbase_core::watchable::{ListenerId, WatchError};
use serde_json::Value;

use crate::sdk::{BaseWatchKey, SdkInner};

pub struct Session {
    pub(crate) inner: Rc<SdkInner>,
}

impl Session {
    pub fn current_user_id(&self) -> Option<String> {
        let tree = self.inner.base_data.borrow();
        tree.get("currentUserId")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// The current collaborator's profile, when known.
    pub fn current_user(&self) -> Option<Value> {
        let user_id = self.current_user_id()?;
        let tree = self.inner.base_data.borrow();
        tree.get("collaboratorsById")?.get(&user_id).cloned()
    }

    /// The session's permission level string, e.g. `"editor"` or `"read"`.
    pub fn permission_level(&self) -> Option<String> {
        let tree = self.inner.base_data.borrow();
        tree.get("permissionLevel")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn watch_permission_level(
        &self,
        callback: impl Fn() + 'static,
    ) -> Result<ListenerId, WatchError> {
        self.inner
            .base_watchers
            .watch(BaseWatchKey::Permissions, move |_| callback())
    }

    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        self.inner.base_watchers.unwatch(id)
    }
}

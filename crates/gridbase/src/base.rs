//! The Base read model: the root of the cached tree.

use std::rc::Rc;

use gridbase_core::mutation::TableId;
use gridbase_core::watchable::{ListenerId, WatchError};
use serde_json::Value;

use crate::sdk::{table_data, BaseWatchKey, SdkInner};
use crate::table::Table;

/// Read-only view over the whole workspace. Holds a reference back to the
/// SDK's cached tree and recomputes every getter on access.
pub struct Base {
    pub(crate) inner: Rc<SdkInner>,
}

impl Base {
    pub fn name(&self) -> String {
        let tree = self.inner.base_data.borrow();
        tree.get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Table ids in display order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let tree = self.inner.base_data.borrow();
        string_array(tree.get("tableOrder"))
    }

    pub fn tables(&self) -> Vec<Table> {
        self.table_ids()
            .into_iter()
            .filter_map(|id| self.table(&id))
            .collect()
    }

    /// Look up a table by id; `None` if no such table exists.
    pub fn table(&self, table_id: &str) -> Option<Table> {
        let tree = self.inner.base_data.borrow();
        table_data(&tree, table_id)?;
        drop(tree);
        Some(Table {
            inner: Rc::clone(&self.inner),
            id: table_id.to_string(),
        })
    }

    pub fn table_by_name(&self, name: &str) -> Option<Table> {
        let id = {
            let tree = self.inner.base_data.borrow();
            let tables = tree.get("tablesById")?.as_object()?;
            tables
                .iter()
                .find(|(_, table)| table.get("name").and_then(Value::as_str) == Some(name))
                .map(|(id, _)| id.clone())?
        };
        self.table(&id)
    }

    pub fn active_table_id(&self) -> Option<TableId> {
        let tree = self.inner.base_data.borrow();
        tree.get("activeTableId")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn active_table(&self) -> Option<Table> {
        self.table(&self.active_table_id()?)
    }

    pub fn collaborator_ids(&self) -> Vec<String> {
        let tree = self.inner.base_data.borrow();
        tree.get("collaboratorsById")
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn collaborator(&self, user_id: &str) -> Option<Value> {
        let tree = self.inner.base_data.borrow();
        tree.get("collaboratorsById")?.get(user_id).cloned()
    }

    /// Watch table/field/view structure changes.
    pub fn watch_schema(
        &self,
        callback: impl Fn() + 'static,
    ) -> Result<ListenerId, WatchError> {
        self.inner
            .base_watchers
            .watch(BaseWatchKey::Schema, move |_| callback())
    }

    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        self.inner.base_watchers.unwatch(id)
    }
}

pub(crate) fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

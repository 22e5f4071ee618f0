//! The Record read model.

use std::rc::Rc;

use gridbase_core::mutation::{CellValuesByFieldId, RecordId, TableId};
use gridbase_core::watchable::{ListenerId, WatchError};
use serde_json::Value;

use crate::sdk::{record_data, table_data, BaseWatchKey, SdkInner};

/// Read-only view over one record. Like every model, it holds no data of its
/// own: each getter reads the cached tree at call time, so a record handle
/// obtained before an optimistic update observes the update immediately.
pub struct Record {
    pub(crate) inner: Rc<SdkInner>,
    pub(crate) table_id: TableId,
    pub(crate) id: RecordId,
}

impl Record {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the record is still present in the cache. A handle outlives
    /// an optimistic delete; this is how callers notice.
    pub fn exists(&self) -> bool {
        self.with_data(|_| true)
    }

    pub fn created_time(&self) -> Option<String> {
        self.with_data(|record| {
            record
                .get("createdTime")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    pub fn cell_value(&self, field_id: &str) -> Option<Value> {
        self.with_data(|record| {
            record
                .get("cellValuesByFieldId")
                .and_then(|cells| cells.get(field_id))
                .cloned()
        })
    }

    pub fn cell_values(&self) -> CellValuesByFieldId {
        self.with_data(|record| {
            record
                .get("cellValuesByFieldId")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Watch one cell of this record.
    pub fn watch_cell_value(
        &self,
        field_id: &str,
        callback: impl Fn() + 'static,
    ) -> Result<ListenerId, WatchError> {
        self.inner.base_watchers.watch(
            BaseWatchKey::CellValue {
                table_id: self.table_id.clone(),
                record_id: self.id.clone(),
                field_id: field_id.to_string(),
            },
            move |_| callback(),
        )
    }

    /// Watch any property of this record.
    pub fn watch(&self, callback: impl Fn() + 'static) -> Result<ListenerId, WatchError> {
        self.inner.base_watchers.watch(
            BaseWatchKey::Record {
                table_id: self.table_id.clone(),
                record_id: self.id.clone(),
            },
            move |_| callback(),
        )
    }

    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        self.inner.base_watchers.unwatch(id)
    }

    fn with_data<T>(&self, read: impl FnOnce(&Value) -> T) -> T
    where
        T: Default,
    {
        let tree = self.inner.base_data.borrow();
        let record =
            table_data(&tree, &self.table_id).and_then(|table| record_data(table, &self.id));
        match record {
            Some(record) => read(record),
            None => T::default(),
        }
    }
}

//! Table, Field, and View read models, plus the table-scoped mutation entry
//! points callers actually use.

use std::rc::Rc;

use gridbase_core::ids::generate_record_id;
use gridbase_core::mutation::{
    CellValuesByFieldId, FieldId, Mutation, PartialMutation, PartialRecordData, RecordData,
    RecordId, TableId, ViewId,
};
use gridbase_core::watchable::{ListenerId, WatchError};
use serde_json::Value;

use crate::backend::PermissionCheckResult;
use crate::base::string_array;
use crate::mutations::{MutationError, Mutations, MutationSubmission};
use crate::record::Record;
use crate::sdk::{field_data, table_data, BaseWatchKey, SdkInner};

pub struct Table {
    pub(crate) inner: Rc<SdkInner>,
    pub(crate) id: TableId,
}

impl Table {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.with_data(|table| {
            table
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&self.id)
                .to_string()
        })
    }

    pub fn field_ids(&self) -> Vec<FieldId> {
        self.with_data(|table| {
            table
                .get("fieldsById")
                .and_then(Value::as_object)
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn fields(&self) -> Vec<Field> {
        self.field_ids()
            .into_iter()
            .map(|id| Field {
                inner: Rc::clone(&self.inner),
                table_id: self.id.clone(),
                id,
            })
            .collect()
    }

    pub fn field(&self, field_id: &str) -> Option<Field> {
        self.with_data(|table| field_data(table, field_id).is_some())
            .then(|| Field {
                inner: Rc::clone(&self.inner),
                table_id: self.id.clone(),
                id: field_id.to_string(),
            })
    }

    pub fn field_by_name(&self, name: &str) -> Option<Field> {
        let id = self.with_data(|table| {
            table
                .get("fieldsById")
                .and_then(Value::as_object)?
                .iter()
                .find(|(_, field)| field.get("name").and_then(Value::as_str) == Some(name))
                .map(|(id, _)| id.clone())
        })?;
        self.field(&id)
    }

    pub fn view_ids(&self) -> Vec<ViewId> {
        self.with_data(|table| string_array(table.get("viewOrder")))
    }

    pub fn view(&self, view_id: &str) -> Option<View> {
        self.with_data(|table| {
            table
                .get("viewsById")
                .and_then(|views| views.get(view_id))
                .is_some()
        })
        .then(|| View {
            inner: Rc::clone(&self.inner),
            table_id: self.id.clone(),
            id: view_id.to_string(),
        })
    }

    pub fn active_view_id(&self) -> Option<ViewId> {
        self.with_data(|table| {
            table
                .get("activeViewId")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    /// Whether the local record cache has loaded enough to answer
    /// record-existence questions and hold optimistic record patches.
    pub fn records_ready(&self) -> bool {
        let tree = self.inner.base_data.borrow();
        (self.inner.policies.records_ready)(&tree, &self.id)
    }

    pub fn record_ids(&self) -> Vec<RecordId> {
        self.with_data(|table| {
            table
                .get("recordsById")
                .and_then(Value::as_object)
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Record ids in display order.
    pub fn record_order(&self) -> Vec<RecordId> {
        self.with_data(|table| string_array(table.get("recordOrder")))
    }

    pub fn record(&self, record_id: &str) -> Option<Record> {
        self.with_data(|table| {
            table
                .get("recordsById")
                .and_then(|records| records.get(record_id))
                .is_some()
        })
        .then(|| Record {
            inner: Rc::clone(&self.inner),
            table_id: self.id.clone(),
            id: record_id.to_string(),
        })
    }

    pub fn records(&self) -> Vec<Record> {
        self.record_order()
            .into_iter()
            .filter_map(|id| self.record(&id))
            .collect()
    }

    // ── Mutation entry points ──────────────────────────────────────────────

    /// Create records with the given cell values. Ids are minted locally and
    /// returned immediately; the future covers the backend round-trip.
    pub fn create_records(
        &self,
        cell_values: Vec<CellValuesByFieldId>,
    ) -> Result<(Vec<RecordId>, MutationSubmission), MutationError> {
        let records: Vec<RecordData> = cell_values
            .into_iter()
            .map(|cell_values_by_field_id| RecordData {
                id: generate_record_id(),
                cell_values_by_field_id,
            })
            .collect();
        let record_ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        let submission = self.mutations().apply_mutation(Mutation::CreateMultipleRecords {
            table_id: self.id.clone(),
            records,
        })?;
        Ok((record_ids, submission))
    }

    pub fn set_cell_values(
        &self,
        records: Vec<RecordData>,
    ) -> Result<MutationSubmission, MutationError> {
        self.mutations()
            .apply_mutation(Mutation::SetMultipleRecordsCellValues {
                table_id: self.id.clone(),
                records,
            })
    }

    pub fn set_cell_value(
        &self,
        record_id: &str,
        field_id: &str,
        value: Value,
    ) -> Result<MutationSubmission, MutationError> {
        let mut cell_values = CellValuesByFieldId::new();
        cell_values.insert(field_id.to_string(), value);
        self.set_cell_values(vec![RecordData {
            id: record_id.to_string(),
            cell_values_by_field_id: cell_values,
        }])
    }

    pub fn delete_records(
        &self,
        record_ids: Vec<RecordId>,
    ) -> Result<MutationSubmission, MutationError> {
        self.mutations()
            .apply_mutation(Mutation::DeleteMultipleRecords {
                table_id: self.id.clone(),
                record_ids,
            })
    }

    // ── Permission pre-flights ─────────────────────────────────────────────

    pub fn check_permissions_to_create_records(
        &self,
        records: Option<&[PartialRecordData]>,
    ) -> PermissionCheckResult {
        self.inner
            .check_permissions(&PartialMutation::CreateMultipleRecords {
                table_id: Some(self.id.clone()),
                records: records.map(<[_]>::to_vec),
            })
    }

    pub fn has_permission_to_create_records(
        &self,
        records: Option<&[PartialRecordData]>,
    ) -> bool {
        self.check_permissions_to_create_records(records).has_permission
    }

    pub fn has_permission_to_set_cell_values(
        &self,
        records: Option<&[PartialRecordData]>,
    ) -> bool {
        self.inner
            .check_permissions(&PartialMutation::SetMultipleRecordsCellValues {
                table_id: Some(self.id.clone()),
                records: records.map(<[_]>::to_vec),
            })
            .has_permission
    }

    pub fn has_permission_to_delete_records(&self, record_ids: Option<&[RecordId]>) -> bool {
        self.inner
            .check_permissions(&PartialMutation::DeleteMultipleRecords {
                table_id: Some(self.id.clone()),
                record_ids: record_ids.map(<[_]>::to_vec),
            })
            .has_permission
    }

    /// Watch record presence and ordering in this table.
    pub fn watch_records(
        &self,
        callback: impl Fn() + 'static,
    ) -> Result<ListenerId, WatchError> {
        self.inner.base_watchers.watch(
            BaseWatchKey::Records {
                table_id: self.id.clone(),
            },
            move |_| callback(),
        )
    }

    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        self.inner.base_watchers.unwatch(id)
    }

    fn mutations(&self) -> Mutations {
        Mutations {
            inner: Rc::clone(&self.inner),
        }
    }

    fn with_data<T>(&self, read: impl FnOnce(&Value) -> T) -> T
    where
        T: Default,
    {
        let tree = self.inner.base_data.borrow();
        match table_data(&tree, &self.id) {
            Some(table) => read(table),
            None => T::default(),
        }
    }
}

pub struct Field {
    pub(crate) inner: Rc<SdkInner>,
    pub(crate) table_id: TableId,
    pub(crate) id: FieldId,
}

impl Field {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.with_data(|field| {
            field
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&self.id)
                .to_string()
        })
    }

    /// The field's type discriminant, e.g. `"text"` or `"formula"`.
    pub fn field_type(&self) -> Option<String> {
        self.with_data(|field| {
            field
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    /// The raw field configuration, as the backend's field-type provider
    /// expects it.
    pub fn data(&self) -> Option<Value> {
        self.with_data(|field| Some(field.clone()))
    }

    /// Whether writes to this field are rejected because its value is
    /// derived (formula-like) rather than stored.
    pub fn is_computed(&self) -> bool {
        let tree = self.inner.base_data.borrow();
        let Some(field) =
            table_data(&tree, &self.table_id).and_then(|table| field_data(table, &self.id))
        else {
            return false;
        };
        self.inner.backend.field_type_provider().is_computed(field)
    }

    fn with_data<T>(&self, read: impl FnOnce(&Value) -> T) -> T
    where
        T: Default,
    {
        let tree = self.inner.base_data.borrow();
        match table_data(&tree, &self.table_id).and_then(|table| field_data(table, &self.id)) {
            Some(field) => read(field),
            None => T::default(),
        }
    }
}

pub struct View {
    pub(crate) inner: Rc<SdkInner>,
    pub(crate) table_id: TableId,
    pub(crate) id: ViewId,
}

impl View {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.with_data(|view| {
            view.get("name")
                .and_then(Value::as_str)
                .unwrap_or(&self.id)
                .to_string()
        })
    }

    pub fn view_type(&self) -> Option<String> {
        self.with_data(|view| {
            view.get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    fn with_data<T>(&self, read: impl FnOnce(&Value) -> T) -> T
    where
        T: Default,
    {
        let tree = self.inner.base_data.borrow();
        let view = table_data(&tree, &self.table_id)
            .and_then(|table| table.get("viewsById"))
            .and_then(|views| views.get(&self.id));
        match view {
            Some(view) => read(view),
            None => T::default(),
        }
    }
}

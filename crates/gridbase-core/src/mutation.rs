//! The mutation taxonomy: every change a client may request, as a closed
//! tagged union.
//!
//! Payloads carry only identifiers and values — never derived model state —
//! so a mutation can be serialized, shipped to the backend, and replayed.
//! [`PartialMutation`] mirrors the taxonomy with every payload part optional,
//! for "could I possibly do this" permission pre-checks where the full data
//! has not been chosen yet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type TableId = String;
pub type FieldId = String;
pub type RecordId = String;
pub type ViewId = String;

/// Cell values keyed by field id.
pub type CellValuesByFieldId = Map<String, Value>;

/// One record's id plus the cell values being written (for create, the full
/// initial cell values; for set-cell-values, just the changed fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    pub id: RecordId,
    pub cell_values_by_field_id: CellValuesByFieldId,
}

/// One global-config write: set `value` at `path`, or delete the leaf key
/// when `value` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfigPathUpdate {
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    #[serde(rename_all = "camelCase")]
    SetMultipleRecordsCellValues {
        table_id: TableId,
        records: Vec<RecordData>,
    },
    #[serde(rename_all = "camelCase")]
    CreateMultipleRecords {
        table_id: TableId,
        records: Vec<RecordData>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMultipleRecords {
        table_id: TableId,
        record_ids: Vec<RecordId>,
    },
    SetMultipleGlobalConfigPaths {
        updates: Vec<GlobalConfigPathUpdate>,
    },
}

impl Mutation {
    /// Wire discriminant, matching the serde tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Mutation::SetMultipleRecordsCellValues { .. } => "setMultipleRecordsCellValues",
            Mutation::CreateMultipleRecords { .. } => "createMultipleRecords",
            Mutation::DeleteMultipleRecords { .. } => "deleteMultipleRecords",
            Mutation::SetMultipleGlobalConfigPaths { .. } => "setMultipleGlobalConfigPaths",
        }
    }

    /// Human verb phrase used to prefix validation error messages, e.g.
    /// `Can't set cell values: ...`.
    pub fn verb(&self) -> &'static str {
        match self {
            Mutation::SetMultipleRecordsCellValues { .. } => "set cell values",
            Mutation::CreateMultipleRecords { .. } => "create records",
            Mutation::DeleteMultipleRecords { .. } => "delete records",
            Mutation::SetMultipleGlobalConfigPaths { .. } => "set global config paths",
        }
    }

    /// Length of the top-level batch array (the only dimension the batch
    /// limit applies to; nested data size is covered by the payload limit).
    pub fn batch_len(&self) -> usize {
        match self {
            Mutation::SetMultipleRecordsCellValues { records, .. } => records.len(),
            Mutation::CreateMultipleRecords { records, .. } => records.len(),
            Mutation::DeleteMultipleRecords { record_ids, .. } => record_ids.len(),
            Mutation::SetMultipleGlobalConfigPaths { updates } => updates.len(),
        }
    }

    /// Downgrade to a fully-populated [`PartialMutation`] for permission
    /// checks.
    pub fn to_partial(&self) -> PartialMutation {
        match self {
            Mutation::SetMultipleRecordsCellValues { table_id, records } => {
                PartialMutation::SetMultipleRecordsCellValues {
                    table_id: Some(table_id.clone()),
                    records: Some(records.iter().map(PartialRecordData::from).collect()),
                }
            }
            Mutation::CreateMultipleRecords { table_id, records } => {
                PartialMutation::CreateMultipleRecords {
                    table_id: Some(table_id.clone()),
                    records: Some(records.iter().map(PartialRecordData::from).collect()),
                }
            }
            Mutation::DeleteMultipleRecords {
                table_id,
                record_ids,
            } => PartialMutation::DeleteMultipleRecords {
                table_id: Some(table_id.clone()),
                record_ids: Some(record_ids.clone()),
            },
            Mutation::SetMultipleGlobalConfigPaths { updates } => {
                PartialMutation::SetMultipleGlobalConfigPaths {
                    updates: Some(
                        updates
                            .iter()
                            .map(|u| PartialGlobalConfigPathUpdate {
                                path: Some(u.path.clone()),
                                value: u.value.clone(),
                            })
                            .collect(),
                    ),
                }
            }
        }
    }
}

/// [`RecordData`] with every part optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRecordData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_values_by_field_id: Option<CellValuesByFieldId>,
}

impl From<&RecordData> for PartialRecordData {
    fn from(record: &RecordData) -> Self {
        Self {
            id: Some(record.id.clone()),
            cell_values_by_field_id: Some(record.cell_values_by_field_id.clone()),
        }
    }
}

/// [`GlobalConfigPathUpdate`] with the path optional. An absent `value` is
/// indistinguishable from an explicit delete here; that is fine for
/// permission pre-checks, which never apply the update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialGlobalConfigPathUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Mutation shapes with payload parts possibly omitted, used only for
/// permission checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PartialMutation {
    #[serde(rename_all = "camelCase")]
    SetMultipleRecordsCellValues {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_id: Option<TableId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        records: Option<Vec<PartialRecordData>>,
    },
    #[serde(rename_all = "camelCase")]
    CreateMultipleRecords {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_id: Option<TableId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        records: Option<Vec<PartialRecordData>>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMultipleRecords {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_id: Option<TableId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record_ids: Option<Vec<RecordId>>,
    },
    SetMultipleGlobalConfigPaths {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updates: Option<Vec<PartialGlobalConfigPathUpdate>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mutation_serializes_with_wire_tags() {
        let mutation = Mutation::DeleteMultipleRecords {
            table_id: "tblTasks".to_string(),
            record_ids: vec!["recA".to_string(), "recB".to_string()],
        };
        let encoded = serde_json::to_value(&mutation).expect("serializable");
        assert_eq!(
            encoded,
            json!({
                "type": "deleteMultipleRecords",
                "tableId": "tblTasks",
                "recordIds": ["recA", "recB"],
            })
        );

        let decoded: Mutation = serde_json::from_value(encoded).expect("replayable");
        assert_eq!(decoded, mutation);
    }

    #[test]
    fn to_partial_preserves_payload() {
        let mut cell_values = CellValuesByFieldId::new();
        cell_values.insert("fldName".to_string(), json!("hi"));
        let mutation = Mutation::SetMultipleRecordsCellValues {
            table_id: "tblTasks".to_string(),
            records: vec![RecordData {
                id: "recA".to_string(),
                cell_values_by_field_id: cell_values.clone(),
            }],
        };

        match mutation.to_partial() {
            PartialMutation::SetMultipleRecordsCellValues { table_id, records } => {
                assert_eq!(table_id.as_deref(), Some("tblTasks"));
                let records = records.expect("records present");
                assert_eq!(records[0].id.as_deref(), Some("recA"));
                assert_eq!(
                    records[0].cell_values_by_field_id.as_ref(),
                    Some(&cell_values)
                );
            }
            other => panic!("wrong partial variant: {other:?}"),
        }
    }

    #[test]
    fn config_update_value_none_round_trips_as_absent() {
        let update = GlobalConfigPathUpdate {
            path: vec!["a".to_string(), "b".to_string()],
            value: None,
        };
        let encoded = serde_json::to_value(&update).expect("serializable");
        assert_eq!(encoded, json!({"path": ["a", "b"]}));
    }
}

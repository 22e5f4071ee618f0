//! The mutation orchestrator: validate, enforce limits, permission-check,
//! optimistically apply, submit, and recover.
//!
//! One concrete orchestrator serves every deployment mode; the points where
//! modes differ — when the record store counts as loaded, which fields may
//! be optimistically written, what a freshly created record starts with —
//! are injected as [`MutationPolicies`] capabilities rather than expressed
//! as subclasses.

use std::collections::HashMap;
use std::rc::Rc;

use chrono::{SecondsFormat, Utc};
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use gridbase_core::config_store::{self, ConfigError};
use gridbase_core::limits::{check_mutation_under_limits, LimitError};
use gridbase_core::model_change::{ModelChange, ModelChangeError};
use gridbase_core::mutation::{Mutation, PartialMutation, RecordData};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::backend::{
    ApplyMutationOptions, BackendError, PermissionCheckResult, MUTATION_HOLD_FOR_MS,
};
use crate::sdk::{field_data, record_data, table_data, table_name, SdkInner};

#[derive(Debug, Error)]
pub enum MutationError {
    /// The mutation failed a structural or semantic check against the
    /// current tree. The message names the offending id.
    #[error("{0}")]
    InvalidMutation(String),
    #[error(transparent)]
    OverLimits(#[from] LimitError),
    /// The backend's permission predicate said no; the message is its
    /// display string.
    #[error("{reason}")]
    PermissionDenied { reason: String },
    #[error(transparent)]
    GlobalConfig(#[from] ConfigError),
    #[error(transparent)]
    ModelChange(#[from] ModelChangeError),
    #[error("backend rejected mutation: {0}")]
    Backend(#[from] BackendError),
}

/// Capability hooks that parameterize the orchestrator.
#[derive(Clone)]
pub struct MutationPolicies {
    /// Whether `table_id`'s local record cache has enough loaded data to
    /// validate record existence and hold optimistic record patches.
    pub records_ready: Rc<dyn Fn(&Value, &str) -> bool>,
    /// Whether `field_id` may currently be optimistically written in
    /// `table_id`. Distinct from "computed": an existing writable field can
    /// still be unavailable locally (e.g. not loaded).
    pub field_available: Rc<dyn Fn(&Value, &str, &str) -> bool>,
    /// Initial properties for an optimistically created record. Must at
    /// minimum produce a creation timestamp.
    pub default_record_properties: Rc<dyn Fn(&str, &str) -> Map<String, Value>>,
}

impl Default for MutationPolicies {
    fn default() -> Self {
        Self {
            // A table with no recordsById map has not loaded its records.
            records_ready: Rc::new(|tree, table_id| {
                table_data(tree, table_id)
                    .and_then(|table| table.get("recordsById"))
                    .map(Value::is_object)
                    .unwrap_or(false)
            }),
            // loadedFieldIds, when present, restricts availability to the
            // listed fields; otherwise every schema field is available.
            field_available: Rc::new(|tree, table_id, field_id| {
                let Some(table) = table_data(tree, table_id) else {
                    return false;
                };
                match table.get("loadedFieldIds").and_then(Value::as_array) {
                    Some(loaded) => loaded.iter().any(|v| v.as_str() == Some(field_id)),
                    None => field_data(table, field_id).is_some(),
                }
            }),
            default_record_properties: Rc::new(|_table_id, record_id| {
                let mut props = Map::new();
                props.insert("id".to_string(), Value::String(record_id.to_string()));
                props.insert(
                    "createdTime".to_string(),
                    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
                props
            }),
        }
    }
}

/// The submission half of a mutation: resolves when the backend confirms.
///
/// After a failed submission that followed an optimistic apply, this future
/// never settles (see [`Mutations::apply_mutation`]).
///
/// A transparent newtype over the boxed submission future: it is awaited
/// exactly like the underlying future (and supports `now_or_never`), and
/// additionally implements `Debug` so it can sit on the `Ok` side of a
/// `Result` in `.expect_err(..)`/`.unwrap_err(..)` assertions.
pub struct MutationSubmission(LocalBoxFuture<'static, Result<(), MutationError>>);

impl std::fmt::Debug for MutationSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationSubmission").finish_non_exhaustive()
    }
}

impl std::future::Future for MutationSubmission {
    type Output = Result<(), MutationError>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        // `LocalBoxFuture` is `Pin<Box<_>>`, which is `Unpin`, so `Self` is
        // `Unpin` and `get_mut` is sound.
        self.get_mut().0.as_mut().poll(cx)
    }
}

/// Handle to the orchestrator for one SDK instance.
pub struct Mutations {
    pub(crate) inner: Rc<SdkInner>,
}

impl Mutations {
    /// Re-derivable permission check over the current base snapshot,
    /// independent of any submission. Accepts partial payloads for
    /// pre-flight UI checks.
    pub fn check_permissions(&self, mutation: &PartialMutation) -> PermissionCheckResult {
        self.inner.check_permissions(mutation)
    }

    pub fn has_permission(&self, mutation: &PartialMutation) -> bool {
        self.check_permissions(mutation).has_permission
    }

    /// Run a mutation through the whole pipeline.
    ///
    /// Validation, limit, and permission failures return `Err` synchronously,
    /// before anything is sent or locally applied. On success the optimistic
    /// update is already visible to watchers when this returns; the returned
    /// future covers only the backend round-trip.
    ///
    /// If the backend rejects a mutation whose optimistic update was already
    /// applied, the error is routed to the SDK's unhandled-error handler and
    /// the returned future stays pending forever: the UI has shown the
    /// optimistic state, and silently reverting it could contradict a
    /// backend-side partial commit. Without an optimistic update the error
    /// resolves the future normally.
    pub fn apply_mutation(&self, mutation: Mutation) -> Result<MutationSubmission, MutationError> {
        self.assert_mutation_is_valid(&mutation)?;
        check_mutation_under_limits(&mutation)?;

        let permission = self.check_permissions(&mutation.to_partial());
        if !permission.has_permission {
            let reason = permission.reason_display_string.unwrap_or_else(|| {
                format!("You are not permitted to {}", mutation.verb())
            });
            return Err(MutationError::PermissionDenied { reason });
        }

        let did_apply_optimistically = match &mutation {
            Mutation::SetMultipleGlobalConfigPaths { updates } => {
                self.inner.apply_config_updates(updates)?;
                true
            }
            _ => {
                let changes = self.optimistic_changes_for(&mutation);
                if changes.is_empty() {
                    false
                } else {
                    self.inner.apply_model_changes_internal(&changes)?;
                    true
                }
            }
        };

        tracing::debug!(
            mutation_type = mutation.type_name(),
            optimistic = did_apply_optimistically,
            "submitting mutation"
        );
        let submission = self.inner.backend.apply_mutation(
            &mutation,
            ApplyMutationOptions {
                hold_for_ms: MUTATION_HOLD_FOR_MS,
            },
        );

        let inner = Rc::clone(&self.inner);
        Ok(MutationSubmission(
            async move {
                match submission.await {
                    Ok(()) => Ok(()),
                    Err(error) if did_apply_optimistically => {
                        inner.report_unhandled_error(MutationError::Backend(error));
                        future::pending::<()>().await;
                        unreachable!("pending future never resolves")
                    }
                    Err(error) => Err(MutationError::Backend(error)),
                }
            }
            .boxed_local(),
        ))
    }

    fn assert_mutation_is_valid(&self, mutation: &Mutation) -> Result<(), MutationError> {
        match mutation {
            Mutation::SetMultipleRecordsCellValues { table_id, records } => {
                self.validate_cell_values(mutation.verb(), table_id, records, true)
            }
            Mutation::CreateMultipleRecords { table_id, records } => {
                self.validate_cell_values(mutation.verb(), table_id, records, false)
            }
            Mutation::DeleteMultipleRecords {
                table_id,
                record_ids,
            } => {
                let tree = self.inner.base_data.borrow();
                let table = table_data(&tree, table_id).ok_or_else(|| {
                    invalid(mutation.verb(), format!("No table with id {table_id} exists"))
                })?;
                if (self.inner.policies.records_ready)(&tree, table_id) {
                    let name = table_name(table, table_id);
                    for record_id in record_ids {
                        if record_data(table, record_id).is_none() {
                            return Err(invalid(
                                mutation.verb(),
                                format!("No record with id {record_id} exists in table '{name}'"),
                            ));
                        }
                    }
                }
                Ok(())
            }
            Mutation::SetMultipleGlobalConfigPaths { updates } => {
                for update in updates {
                    config_store::validate_path(&update.path)?;
                }
                Ok(())
            }
        }
    }

    fn validate_cell_values(
        &self,
        verb: &'static str,
        table_id: &str,
        records: &[RecordData],
        against_existing_records: bool,
    ) -> Result<(), MutationError> {
        let tree = self.inner.base_data.borrow();
        let table = table_data(&tree, table_id)
            .ok_or_else(|| invalid(verb, format!("No table with id {table_id} exists")))?;
        let name = table_name(table, table_id);
        let provider = self.inner.backend.field_type_provider();
        let ready = (self.inner.policies.records_ready)(&tree, table_id);

        // Field-level checks are memoized per fieldId so a 50-record batch
        // does not re-validate the same field 50 times.
        let mut checked_fields: HashMap<&str, &Value> = HashMap::new();

        for record in records {
            if against_existing_records && ready && record_data(table, &record.id).is_none() {
                return Err(invalid(
                    verb,
                    format!("No record with id {} exists in table '{name}'", record.id),
                ));
            }
            for (field_id, new_value) in &record.cell_values_by_field_id {
                let field = match checked_fields.get(field_id.as_str()) {
                    Some(field) => *field,
                    None => {
                        let Some(field) = field_data(table, field_id) else {
                            return Err(invalid(
                                verb,
                                format!("No field with id {field_id} exists in table '{name}'"),
                            ));
                        };
                        let field_name = display_field_name(field, field_id);
                        if provider.is_computed(field) {
                            return Err(invalid(
                                verb,
                                format!("Field '{field_name}' is computed"),
                            ));
                        }
                        checked_fields.insert(field_id.as_str(), field);
                        field
                    }
                };
                let current = if against_existing_records {
                    record_data(table, &record.id)
                        .and_then(|r| r.get("cellValuesByFieldId"))
                        .and_then(|cells| cells.get(field_id))
                } else {
                    None
                };
                let verdict =
                    provider.validate_cell_value_for_update(Some(new_value), current, field);
                if !verdict.is_valid {
                    let field_name = display_field_name(field, field_id);
                    let message = match verdict.reason {
                        Some(reason) => format!(
                            "Invalid cell value for field '{field_name}': {reason}"
                        ),
                        None => format!("Invalid cell value for field '{field_name}'"),
                    };
                    return Err(invalid(verb, message));
                }
            }
        }
        Ok(())
    }

    /// Compute the optimistic change set for a record mutation. Empty when
    /// the table has no local record representation to update.
    fn optimistic_changes_for(&self, mutation: &Mutation) -> Vec<ModelChange> {
        let tree = self.inner.base_data.borrow();
        let policies = &self.inner.policies;
        match mutation {
            Mutation::SetMultipleRecordsCellValues { table_id, records } => {
                if !(policies.records_ready)(&tree, table_id) {
                    return Vec::new();
                }
                let mut changes = Vec::new();
                for record in records {
                    for (field_id, value) in &record.cell_values_by_field_id {
                        // Unavailable fields are skipped, not errors: the
                        // rest of the batch still lands locally.
                        if !(policies.field_available)(&tree, table_id, field_id) {
                            tracing::debug!(%field_id, "skipping optimistic write to unavailable field");
                            continue;
                        }
                        changes.push(ModelChange::set(
                            record_cell_path(table_id, &record.id, field_id),
                            value.clone(),
                        ));
                    }
                }
                changes
            }
            Mutation::CreateMultipleRecords { table_id, records } => {
                if !(policies.records_ready)(&tree, table_id) {
                    return Vec::new();
                }
                let mut changes = Vec::new();
                for record in records {
                    let mut record_obj = (policies.default_record_properties)(table_id, &record.id);
                    record_obj
                        .entry("id".to_string())
                        .or_insert_with(|| Value::String(record.id.clone()));
                    let mut cells = Map::new();
                    for (field_id, value) in &record.cell_values_by_field_id {
                        if (policies.field_available)(&tree, table_id, field_id) {
                            cells.insert(field_id.clone(), value.clone());
                        }
                    }
                    record_obj.insert("cellValuesByFieldId".to_string(), Value::Object(cells));
                    changes.push(ModelChange::set(
                        record_path(table_id, &record.id),
                        Value::Object(record_obj),
                    ));
                }
                changes
            }
            Mutation::DeleteMultipleRecords {
                table_id,
                record_ids,
            } => {
                if !(policies.records_ready)(&tree, table_id) {
                    return Vec::new();
                }
                let mut changes: Vec<ModelChange> = record_ids
                    .iter()
                    .map(|record_id| ModelChange::delete(record_path(table_id, record_id)))
                    .collect();
                // Ordering must stay consistent with presence: drop the
                // deleted ids from the table's record order as well.
                if let Some(order) = table_data(&tree, table_id)
                    .and_then(|table| table.get("recordOrder"))
                    .and_then(Value::as_array)
                {
                    let remaining: Vec<Value> = order
                        .iter()
                        .filter(|id| {
                            id.as_str()
                                .map(|id| !record_ids.iter().any(|deleted| deleted.as_str() == id))
                                .unwrap_or(true)
                        })
                        .cloned()
                        .collect();
                    changes.push(ModelChange::set(
                        vec![
                            "tablesById".to_string(),
                            table_id.clone(),
                            "recordOrder".to_string(),
                        ],
                        Value::Array(remaining),
                    ));
                }
                changes
            }
            // Config mutations do not go through the model patcher.
            Mutation::SetMultipleGlobalConfigPaths { .. } => Vec::new(),
        }
    }
}

fn invalid(verb: &str, detail: String) -> MutationError {
    MutationError::InvalidMutation(format!("Can't {verb}: {detail}"))
}

fn display_field_name(field: &Value, field_id: &str) -> String {
    field
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(field_id)
        .to_string()
}

fn record_path(table_id: &str, record_id: &str) -> Vec<String> {
    vec![
        "tablesById".to_string(),
        table_id.to_string(),
        "recordsById".to_string(),
        record_id.to_string(),
    ]
}

fn record_cell_path(table_id: &str, record_id: &str, field_id: &str) -> Vec<String> {
    let mut path = record_path(table_id, record_id);
    path.push("cellValuesByFieldId".to_string());
    path.push(field_id.to_string());
    path
}

//! The backend collaborator boundary.
//!
//! The SDK never talks to the network itself. Everything transport-level —
//! permission evaluation, mutation submission, field-type knowledge, and the
//! authoritative push feed — sits behind [`BackendClient`], injected at
//! [`Sdk`](crate::sdk::Sdk) construction. The SDK consumes this interface;
//! it does not implement it.

use futures::future::LocalBoxFuture;
use gridbase_core::model_change::ModelChange;
use gridbase_core::mutation::{GlobalConfigPathUpdate, Mutation, PartialMutation};
use serde_json::Value;
use thiserror::Error;

/// Buffer hint passed with every submission: the backend may hold the
/// authoritative echo for this long to coalesce it with the optimistic
/// change and avoid visible flicker.
pub const MUTATION_HOLD_FOR_MS: u32 = 100;

/// An authoritative batch of model changes pushed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUpdates {
    pub changes: Vec<ModelChange>,
}

/// An authoritative batch of global-config updates pushed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfigUpdates {
    pub updates: Vec<GlobalConfigPathUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheckResult {
    pub has_permission: bool,
    /// Backend-supplied display string explaining a denial.
    pub reason_display_string: Option<String>,
}

impl PermissionCheckResult {
    pub fn allowed() -> Self {
        Self {
            has_permission: true,
            reason_display_string: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            has_permission: false,
            reason_display_string: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellValueValidationResult {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl CellValueValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyMutationOptions {
    pub hold_for_ms: u32,
}

/// A backend-side submission failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Field-type knowledge supplied by the backend: which field configurations
/// are computed (and therefore reject writes), and whether a proposed cell
/// value is acceptable for a field's current configuration.
pub trait FieldTypeProvider {
    fn is_computed(&self, field_data: &Value) -> bool;

    fn validate_cell_value_for_update(
        &self,
        new_cell_value: Option<&Value>,
        current_cell_value: Option<&Value>,
        field_data: &Value,
    ) -> CellValueValidationResult;
}

/// The opaque transport collaborator.
///
/// `check_permissions_for_mutation` is synchronous and pure over the
/// supplied base snapshot, so the SDK can re-derive it at any time for
/// pre-flight UI checks. `apply_mutation` is the only suspension point in
/// the whole mutation pipeline.
pub trait BackendClient {
    fn field_type_provider(&self) -> &dyn FieldTypeProvider;

    fn check_permissions_for_mutation(
        &self,
        mutation: &PartialMutation,
        base_data: &Value,
    ) -> PermissionCheckResult;

    fn apply_mutation(
        &self,
        mutation: &Mutation,
        options: ApplyMutationOptions,
    ) -> LocalBoxFuture<'static, Result<(), BackendError>>;

    /// Register the callback the backend invokes with each authoritative
    /// model-change batch, in arrival order.
    fn subscribe_to_model_updates(&self, callback: Box<dyn Fn(ModelUpdates)>);

    /// Register the callback for authoritative global-config batches.
    fn subscribe_to_global_config_updates(&self, callback: Box<dyn Fn(GlobalConfigUpdates)>);
}

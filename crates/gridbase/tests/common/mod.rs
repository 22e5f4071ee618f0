//! Shared test double for the backend collaborator, plus the base fixture
//! the lifecycle tests run against.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use gridbase::backend::{
    ApplyMutationOptions, BackendClient, BackendError, CellValueValidationResult,
    FieldTypeProvider, GlobalConfigUpdates, ModelUpdates, PermissionCheckResult,
};
use gridbase::core::config_store::KvStore;
use gridbase::core::model_change::ModelChange;
use gridbase::core::mutation::{GlobalConfigPathUpdate, Mutation, PartialMutation};
use gridbase::{InitialSnapshot, Sdk};
use serde_json::{json, Value};

/// Field-type rules for the fixture: `"formula"` fields are computed, and
/// `"number"` fields only accept numbers or null.
pub struct TestFieldTypes;

impl FieldTypeProvider for TestFieldTypes {
    fn is_computed(&self, field_data: &Value) -> bool {
        field_data.get("type").and_then(Value::as_str) == Some("formula")
    }

    fn validate_cell_value_for_update(
        &self,
        new_cell_value: Option<&Value>,
        _current_cell_value: Option<&Value>,
        field_data: &Value,
    ) -> CellValueValidationResult {
        let is_number_field = field_data.get("type").and_then(Value::as_str) == Some("number");
        match new_cell_value {
            Some(value) if is_number_field && !value.is_number() && !value.is_null() => {
                CellValueValidationResult::invalid("expected a number")
            }
            _ => CellValueValidationResult::valid(),
        }
    }
}

pub enum SubmitBehavior {
    Succeed,
    Fail(String),
}

pub struct TestBackend {
    field_types: TestFieldTypes,
    pub behavior: RefCell<SubmitBehavior>,
    pub permission: RefCell<PermissionCheckResult>,
    pub submissions: RefCell<Vec<Mutation>>,
    pub permission_checks: RefCell<Vec<PartialMutation>>,
    pub last_options: Cell<Option<ApplyMutationOptions>>,
    model_update_callback: RefCell<Option<Box<dyn Fn(ModelUpdates)>>>,
    config_update_callback: RefCell<Option<Box<dyn Fn(GlobalConfigUpdates)>>>,
}

impl TestBackend {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            field_types: TestFieldTypes,
            behavior: RefCell::new(SubmitBehavior::Succeed),
            permission: RefCell::new(PermissionCheckResult::allowed()),
            submissions: RefCell::new(Vec::new()),
            permission_checks: RefCell::new(Vec::new()),
            last_options: Cell::new(None),
            model_update_callback: RefCell::new(None),
            config_update_callback: RefCell::new(None),
        })
    }

    pub fn deny(&self, reason: &str) {
        *self.permission.borrow_mut() = PermissionCheckResult::denied(reason);
    }

    pub fn fail_submissions(&self, message: &str) {
        *self.behavior.borrow_mut() = SubmitBehavior::Fail(message.to_string());
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.borrow().len()
    }

    /// Deliver an authoritative model-change batch, as the real transport
    /// would.
    pub fn push_model_updates(&self, changes: Vec<ModelChange>) {
        let callback = self.model_update_callback.borrow();
        let callback = callback.as_ref().expect("sdk subscribed to model updates");
        callback(ModelUpdates { changes });
    }

    pub fn push_global_config_updates(&self, updates: Vec<GlobalConfigPathUpdate>) {
        let callback = self.config_update_callback.borrow();
        let callback = callback
            .as_ref()
            .expect("sdk subscribed to global config updates");
        callback(GlobalConfigUpdates { updates });
    }
}

impl BackendClient for TestBackend {
    fn field_type_provider(&self) -> &dyn FieldTypeProvider {
        &self.field_types
    }

    fn check_permissions_for_mutation(
        &self,
        mutation: &PartialMutation,
        _base_data: &Value,
    ) -> PermissionCheckResult {
        self.permission_checks.borrow_mut().push(mutation.clone());
        self.permission.borrow().clone()
    }

    fn apply_mutation(
        &self,
        mutation: &Mutation,
        options: ApplyMutationOptions,
    ) -> LocalBoxFuture<'static, Result<(), BackendError>> {
        self.submissions.borrow_mut().push(mutation.clone());
        self.last_options.set(Some(options));
        let result = match &*self.behavior.borrow() {
            SubmitBehavior::Succeed => Ok(()),
            SubmitBehavior::Fail(message) => Err(BackendError::new(message.clone())),
        };
        async move { result }.boxed_local()
    }

    fn subscribe_to_model_updates(&self, callback: Box<dyn Fn(ModelUpdates)>) {
        *self.model_update_callback.borrow_mut() = Some(callback);
    }

    fn subscribe_to_global_config_updates(&self, callback: Box<dyn Fn(GlobalConfigUpdates)>) {
        *self.config_update_callback.borrow_mut() = Some(callback);
    }
}

/// A two-table workspace: `tblTasks` fully loaded, `tblBacklog` with its
/// record store not yet fetched.
pub fn base_data() -> Value {
    json!({
        "name": "Product Planning",
        "tablesById": {
            "tblTasks": {
                "id": "tblTasks",
                "name": "Tasks",
                "fieldsById": {
                    "fldName": {"id": "fldName", "name": "Name", "type": "text"},
                    "fldPoints": {"id": "fldPoints", "name": "Points", "type": "number"},
                    "fldTotal": {"id": "fldTotal", "name": "Total", "type": "formula"},
                },
                "recordsById": {
                    "recAlpha": {
                        "id": "recAlpha",
                        "createdTime": "2026-05-01T09:00:00.000Z",
                        "cellValuesByFieldId": {"fldName": "", "fldPoints": 3},
                    },
                    "recBeta": {
                        "id": "recBeta",
                        "createdTime": "2026-05-02T09:00:00.000Z",
                        "cellValuesByFieldId": {"fldName": "write spec", "fldPoints": 5},
                    },
                },
                "recordOrder": ["recAlpha", "recBeta"],
                "viewsById": {
                    "viwGrid": {"id": "viwGrid", "name": "Grid", "type": "grid"},
                },
                "viewOrder": ["viwGrid"],
                "activeViewId": "viwGrid",
            },
            "tblBacklog": {
                "id": "tblBacklog",
                "name": "Backlog",
                "fieldsById": {
                    "fldTitle": {"id": "fldTitle", "name": "Title", "type": "text"},
                },
                "recordOrder": [],
                "viewsById": {},
                "viewOrder": [],
            },
        },
        "tableOrder": ["tblTasks", "tblBacklog"],
        "activeTableId": "tblTasks",
        "collaboratorsById": {
            "usrOwner": {"id": "usrOwner", "name": "Pat Lee", "email": "pat@example.com"},
        },
        "currentUserId": "usrOwner",
        "permissionLevel": "editor",
    })
}

pub fn snapshot() -> InitialSnapshot {
    InitialSnapshot {
        base_data: base_data(),
        global_config: KvStore::new(),
    }
}

pub fn sdk_with_backend() -> (Sdk, Rc<TestBackend>) {
    let backend = TestBackend::new();
    let sdk = Sdk::new(backend.clone(), snapshot());
    (sdk, backend)
}

pub fn sdk_with_base_data(base_data: Value) -> (Sdk, Rc<TestBackend>) {
    let backend = TestBackend::new();
    let sdk = Sdk::new(
        backend.clone(),
        InitialSnapshot {
            base_data,
            global_config: KvStore::new(),
        },
    );
    (sdk, backend)
}

//! Authoritative push batches: applied through the same patcher as
//! optimistic updates, in arrival order, with watcher notification.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::sdk_with_backend;
use gridbase::core::model_change::ModelChange;
use gridbase::BaseWatchKey;
use serde_json::json;

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

#[test]
fn pushed_cell_change_updates_the_read_model_and_fires_watchers() {
    let (sdk, backend) = sdk_with_backend();
    let table = sdk.base().table("tblTasks").expect("table exists");
    let record = table.record("recAlpha").expect("record exists");

    let fires = Rc::new(Cell::new(0));
    let f = Rc::clone(&fires);
    record
        .watch_cell_value("fldName", move || f.set(f.get() + 1))
        .expect("valid watch");

    backend.push_model_updates(vec![ModelChange::set(
        path(&["tablesById", "tblTasks", "recordsById", "recAlpha", "cellValuesByFieldId", "fldName"]),
        json!("edited elsewhere"),
    )]);

    assert_eq!(record.cell_value("fldName"), Some(json!("edited elsewhere")));
    assert_eq!(fires.get(), 1);
}

#[test]
fn batches_apply_in_list_order() {
    let (sdk, backend) = sdk_with_backend();
    let table = sdk.base().table("tblTasks").expect("table exists");

    // Delete-then-recreate of the same id must leave the recreated record.
    backend.push_model_updates(vec![
        ModelChange::delete(path(&["tablesById", "tblTasks", "recordsById", "recAlpha"])),
        ModelChange::set(
            path(&["tablesById", "tblTasks", "recordsById", "recAlpha"]),
            json!({
                "id": "recAlpha",
                "createdTime": "2026-05-01T09:00:00.000Z",
                "cellValuesByFieldId": {"fldName": "fresh"},
            }),
        ),
    ]);

    let record = table.record("recAlpha").expect("recreated record");
    assert_eq!(record.cell_value("fldName"), Some(json!("fresh")));
    assert_eq!(record.cell_value("fldPoints"), None, "old cells are gone");
}

#[test]
fn watchers_fire_only_after_the_whole_batch_is_written() {
    let (sdk, backend) = sdk_with_backend();
    let table = sdk.base().table("tblTasks").expect("table exists");

    // The watcher reads the *other* record touched by the same batch; if
    // notification interleaved with writing it would see a half-applied
    // batch.
    let beta = table.record("recBeta").expect("record exists");
    let seen = Rc::new(Cell::new(None));
    let s = Rc::clone(&seen);
    let alpha = table.record("recAlpha").expect("record exists");
    beta.watch_cell_value("fldName", move || {
        s.set(alpha.cell_value("fldName"));
    })
    .expect("valid watch");

    backend.push_model_updates(vec![
        ModelChange::set(
            path(&["tablesById", "tblTasks", "recordsById", "recBeta", "cellValuesByFieldId", "fldName"]),
            json!("beta updated"),
        ),
        ModelChange::set(
            path(&["tablesById", "tblTasks", "recordsById", "recAlpha", "cellValuesByFieldId", "fldName"]),
            json!("alpha updated"),
        ),
    ]);

    assert_eq!(seen.take(), Some(json!("alpha updated")));
}

#[test]
fn structurally_invalid_batches_are_dropped_without_corrupting_the_tree() {
    let (sdk, backend) = sdk_with_backend();
    let table = sdk.base().table("tblTasks").expect("table exists");

    backend.push_model_updates(vec![
        ModelChange::set(
            path(&["tablesById", "tblTasks", "recordsById", "recAlpha", "cellValuesByFieldId", "fldName"]),
            json!("should not land"),
        ),
        ModelChange::set(path(&["bogusRoot", "x"]), json!(1)),
    ]);

    let record = table.record("recAlpha").expect("record exists");
    assert_eq!(record.cell_value("fldName"), Some(json!("")));
}

#[test]
fn pushed_schema_changes_surface_through_the_base_model() {
    let (sdk, backend) = sdk_with_backend();

    let schema_fires = Rc::new(Cell::new(0));
    let s = Rc::clone(&schema_fires);
    sdk.base().watch_schema(move || s.set(s.get() + 1)).expect("valid watch");

    backend.push_model_updates(vec![ModelChange::set(
        path(&["tablesById", "tblTasks", "fieldsById", "fldOwner"]),
        json!({"id": "fldOwner", "name": "Owner", "type": "text"}),
    )]);

    assert_eq!(schema_fires.get(), 1);
    let table = sdk.base().table("tblTasks").expect("table exists");
    assert!(table.field("fldOwner").is_some());
    assert_eq!(table.field("fldOwner").expect("field").name(), "Owner");
}

#[test]
fn base_watch_tokens_free_exactly_once() {
    let (sdk, _backend) = sdk_with_backend();

    let id = sdk
        .watch(
            BaseWatchKey::Records {
                table_id: "tblTasks".to_string(),
            },
            |_| {},
        )
        .expect("valid watch");
    sdk.unwatch(id).expect("first free succeeds");
    sdk.unwatch(id).expect_err("second free is an over-free");
}

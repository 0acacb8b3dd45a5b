//! End-to-end reconciliation behavior through the task/user services,
//! against the in-memory store.

use std::collections::HashMap;

use serde_json::{json, Value};
use taskd::error::ApiError;
use taskd::model::{Task, TaskPayload, User, UserPayload, UNASSIGNED};
use taskd::query::QueryOutcome;
use taskd::store::{memory::MemStore, Collection, EntityStore};
use taskd::{sync, tasks, users};

fn no_params() -> HashMap<String, String> {
    HashMap::new()
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn new_user(store: &MemStore, name: &str, email: &str) -> User {
    users::create(
        store,
        UserPayload::from_value(json!({ "name": name, "email": email })),
    )
    .await
    .unwrap()
}

async fn new_task(store: &MemStore, name: &str, deadline: &str, assignee: &str) -> Task {
    tasks::create(
        store,
        TaskPayload::from_value(json!({
            "name": name,
            "deadline": deadline,
            "assignedUser": assignee,
        })),
    )
    .await
    .unwrap()
}

fn replace_payload(task: &Task, completed: bool, assignee: &str) -> TaskPayload {
    TaskPayload::from_value(json!({
        "name": task.name.clone(),
        "description": task.description.clone(),
        "deadline": task.deadline.to_rfc3339(),
        "completed": completed,
        "assignedUser": assignee,
        "assignedUserName": "ignored by the server",
    }))
}

async fn pending(store: &MemStore, user_id: &str) -> Vec<String> {
    let user = store
        .find_by_id(Collection::Users, user_id)
        .await
        .unwrap()
        .unwrap();
    user.get("pendingTasks")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

async fn stored_task(store: &MemStore, id: &str) -> Task {
    Task::from_doc(
        store
            .find_by_id(Collection::Tasks, id)
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn assignment_fills_name_and_pending_list() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    assert_eq!(task.assigned_user_name, "Amy");
    assert_eq!(pending(&store, &amy.id).await, vec![task.id.clone()]);
}

#[tokio::test]
async fn completing_removes_from_pending_but_keeps_owner() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    let done = tasks::replace(&store, &task.id, replace_payload(&task, true, &amy.id))
        .await
        .unwrap();

    assert!(pending(&store, &amy.id).await.is_empty());
    assert_eq!(done.assigned_user, amy.id);
    assert_eq!(done.assigned_user_name, "Amy");

    // un-completing re-adds it
    tasks::replace(&store, &task.id, replace_payload(&task, false, &amy.id))
        .await
        .unwrap();
    assert_eq!(pending(&store, &amy.id).await, vec![task.id.clone()]);
}

#[tokio::test]
async fn reassignment_moves_between_lists() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let bob = new_user(&store, "Bob", "bob@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    let moved = tasks::replace(&store, &task.id, replace_payload(&task, false, &bob.id))
        .await
        .unwrap();

    assert_eq!(moved.assigned_user_name, "Bob");
    assert!(pending(&store, &amy.id).await.is_empty());
    assert_eq!(pending(&store, &bob.id).await, vec![task.id.clone()]);
}

#[tokio::test]
async fn unassigning_resets_the_name_sentinel() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    let freed = tasks::replace(&store, &task.id, replace_payload(&task, false, ""))
        .await
        .unwrap();

    assert_eq!(freed.assigned_user, "");
    assert_eq!(freed.assigned_user_name, UNASSIGNED);
    assert!(pending(&store, &amy.id).await.is_empty());
}

#[tokio::test]
async fn deleting_a_user_clears_every_owned_task() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let t1 = new_task(&store, "T1", "2026-09-01T00:00:00Z", &amy.id).await;
    let t2 = new_task(&store, "T2", "2026-09-02T00:00:00Z", &amy.id).await;
    // a completed task still points at its owner but sits outside the list
    let t3 = new_task(&store, "T3", "2026-09-03T00:00:00Z", &amy.id).await;
    tasks::replace(&store, &t3.id, replace_payload(&t3, true, &amy.id))
        .await
        .unwrap();

    users::delete(&store, &amy.id).await.unwrap();

    for id in [&t1.id, &t2.id, &t3.id] {
        let task = stored_task(&store, id).await;
        assert_eq!(task.assigned_user, "");
        assert_eq!(task.assigned_user_name, UNASSIGNED);
    }
}

#[tokio::test]
async fn deleting_a_task_strips_it_from_its_owner() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    tasks::delete(&store, &task.id).await.unwrap();

    assert!(pending(&store, &amy.id).await.is_empty());
    assert!(store
        .find_by_id(Collection::Tasks, &task.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn creation_seed_claims_tasks_from_previous_owner() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    let bob = users::create(
        &store,
        UserPayload::from_value(json!({
            "name": "Bob",
            "email": "bob@x.com",
            "pendingTasks": [task.id.clone()],
        })),
    )
    .await
    .unwrap();

    assert_eq!(bob.pending_tasks, vec![task.id.clone()]);
    // the old owner's list no longer contains the claimed task
    assert!(pending(&store, &amy.id).await.is_empty());
    let claimed = stored_task(&store, &task.id).await;
    assert_eq!(claimed.assigned_user, bob.id);
    assert_eq!(claimed.assigned_user_name, "Bob");
    assert!(!claimed.completed);
}

#[tokio::test]
async fn creation_seed_drops_unknown_ids() {
    let store = MemStore::new();
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", "").await;

    let amy = users::create(
        &store,
        UserPayload::from_value(json!({
            "name": "Amy",
            "email": "amy@x.com",
            "pendingTasks": [task.id.clone(), "no-such-task", task.id.clone()],
        })),
    )
    .await
    .unwrap();

    assert_eq!(amy.pending_tasks, vec![task.id]);
}

#[tokio::test]
async fn user_replacement_diffs_the_pending_list() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let t1 = new_task(&store, "T1", "2026-09-01T00:00:00Z", &amy.id).await;
    let t2 = new_task(&store, "T2", "2026-09-02T00:00:00Z", "").await;

    // drop t1, pick up t2, rename along the way
    let renamed = users::replace(
        &store,
        &amy.id,
        UserPayload::from_value(json!({
            "name": "Amelia",
            "email": "amy@x.com",
            "pendingTasks": [t2.id.clone()],
        })),
    )
    .await
    .unwrap();

    assert_eq!(renamed.pending_tasks, vec![t2.id.clone()]);

    let dropped = stored_task(&store, &t1.id).await;
    assert_eq!(dropped.assigned_user, "");
    assert_eq!(dropped.assigned_user_name, UNASSIGNED);

    let picked = stored_task(&store, &t2.id).await;
    assert_eq!(picked.assigned_user, amy.id);
    assert_eq!(picked.assigned_user_name, "Amelia");
}

#[tokio::test]
async fn renaming_refreshes_owned_task_names() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    users::replace(
        &store,
        &amy.id,
        UserPayload::from_value(json!({
            "name": "Amelia",
            "email": "amy@x.com",
            "pendingTasks": [task.id.clone()],
        })),
    )
    .await
    .unwrap();

    assert_eq!(stored_task(&store, &task.id).await.assigned_user_name, "Amelia");
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;
    let task = new_task(&store, "Write report", "2026-09-01T00:00:00Z", &amy.id).await;

    // re-running the create reconciliation must not duplicate the entry
    sync::reconcile_task(&store, &task).await.unwrap();
    sync::reconcile_task(&store, &task).await.unwrap();

    assert_eq!(pending(&store, &amy.id).await, vec![task.id]);
}

#[tokio::test]
async fn filtered_sorted_query_finds_earliest_incomplete() {
    let store = MemStore::new();
    let t1 = new_task(&store, "Late", "2026-12-01T00:00:00Z", "").await;
    let t2 = new_task(&store, "Early", "2026-09-01T00:00:00Z", "").await;
    let done = new_task(&store, "Done early", "2026-01-01T00:00:00Z", "").await;
    tasks::replace(&store, &done.id, replace_payload(&done, true, ""))
        .await
        .unwrap();

    let outcome = tasks::list(
        &store,
        &params(&[
            ("where", r#"{"completed":false}"#),
            ("sort", r#"{"deadline":1}"#),
            ("limit", "1"),
        ]),
    )
    .await
    .unwrap();

    let QueryOutcome::Documents(docs) = outcome else {
        panic!("expected documents");
    };
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("_id"), Some(&json!(t2.id)));
    assert_ne!(docs[0].get("_id"), Some(&json!(t1.id)));
}

// ─── Validation and error paths ──────────────────────────────────────────────

#[tokio::test]
async fn task_requires_name_and_deadline() {
    let store = MemStore::new();
    let err = tasks::create(&store, TaskPayload::from_value(json!({ "name": "x" })))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let err = tasks::create(
        &store,
        TaskPayload::from_value(json!({ "deadline": "2026-09-01T00:00:00Z" })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn assignment_to_unknown_user_is_rejected_before_commit() {
    let store = MemStore::new();
    let err = tasks::create(
        &store,
        TaskPayload::from_value(json!({
            "name": "x",
            "deadline": "2026-09-01T00:00:00Z",
            "assignedUser": "ghost",
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    // nothing was committed
    assert_eq!(store.count(Collection::Tasks, &Default::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_email_is_rejected_case_insensitively() {
    let store = MemStore::new();
    new_user(&store, "Amy", "amy@x.com").await;

    let err = users::create(
        &store,
        UserPayload::from_value(json!({ "name": "Shadow", "email": "  AMY@X.COM " })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn user_replacement_requires_all_fields() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;

    let err = users::replace(
        &store,
        &amy.id,
        UserPayload::from_value(json!({ "name": "Amy", "email": "amy@x.com" })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    // the comma-separated form is accepted
    users::replace(
        &store,
        &amy.id,
        UserPayload::from_value(json!({
            "name": "Amy",
            "email": "amy@x.com",
            "pendingTasks": "",
        })),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn missing_ids_surface_not_found() {
    let store = MemStore::new();
    assert!(matches!(
        tasks::get(&store, "nope", &no_params()).await.unwrap_err(),
        ApiError::NotFound
    ));
    assert!(matches!(
        tasks::delete(&store, "nope").await.unwrap_err(),
        ApiError::NotFound
    ));
    assert!(matches!(
        users::get(&store, "nope", &no_params()).await.unwrap_err(),
        ApiError::NotFound
    ));
    assert!(matches!(
        users::delete(&store, "nope").await.unwrap_err(),
        ApiError::NotFound
    ));
}

#[tokio::test]
async fn get_honors_projection() {
    let store = MemStore::new();
    let amy = new_user(&store, "Amy", "amy@x.com").await;

    let doc = users::get(
        &store,
        &amy.id,
        &params(&[("select", r#"{"email":1,"_id":0}"#)]),
    )
    .await
    .unwrap();

    assert_eq!(doc.len(), 1);
    assert_eq!(doc.get("email"), Some(&json!("amy@x.com")));
}

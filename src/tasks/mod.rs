// tasks/mod.rs — task request service: validate → mutate → reconcile.
//
// Mirrors the mutation shapes of the task collection. Validation runs
// before any write (assignment to a nonexistent user never commits);
// reconciliation runs after, as its own sequence of atomic store calls.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::model::{self, Task, TaskPayload, UNASSIGNED};
use crate::query::{self, QueryOutcome, QuerySpec};
use crate::store::{Collection, Document, EntityStore};
use crate::sync;

/// Tasks default to a 100-document page; users are uncapped.
pub const DEFAULT_LIST_LIMIT: usize = 100;

pub async fn list(
    store: &dyn EntityStore,
    params: &HashMap<String, String>,
) -> Result<QueryOutcome, ApiError> {
    let spec = QuerySpec::from_params(params, DEFAULT_LIST_LIMIT);
    Ok(query::execute(store, Collection::Tasks, &spec).await?)
}

pub async fn get(
    store: &dyn EntityStore,
    id: &str,
    params: &HashMap<String, String>,
) -> Result<Document, ApiError> {
    let doc = store
        .find_by_id(Collection::Tasks, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let spec = QuerySpec::from_params(params, 0);
    Ok(match &spec.projection {
        Some(projection) => projection.apply(doc),
        None => doc,
    })
}

pub async fn create(store: &dyn EntityStore, payload: TaskPayload) -> Result<Task, ApiError> {
    let name = payload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let deadline = payload
        .deadline
        .as_ref()
        .and_then(model::parse_deadline)
        .ok_or_else(|| ApiError::bad_request("deadline is required"))?;
    let completed = payload
        .completed
        .as_ref()
        .and_then(model::parse_completed)
        .unwrap_or(false);
    let assigned_user = payload.assigned_user.unwrap_or_default();
    let assigned_user_name = resolve_owner_name(store, &assigned_user).await?;

    let mut task = Task {
        id: model::new_id(),
        name,
        description: payload.description.unwrap_or_default(),
        deadline,
        completed,
        assigned_user,
        assigned_user_name,
        date_created: Utc::now(),
    };

    store.insert(Collection::Tasks, task.to_doc()).await?;
    apply_link(store, &mut task).await?;
    info!(task = %task.id, user = %task.assigned_user, "task created");
    Ok(task)
}

pub async fn replace(
    store: &dyn EntityStore,
    id: &str,
    payload: TaskPayload,
) -> Result<Task, ApiError> {
    let current = store
        .find_by_id(Collection::Tasks, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let current = Task::from_doc(current)?;

    // full replacement: every field must arrive well-typed
    let name = payload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let description = payload
        .description
        .ok_or_else(|| ApiError::bad_request("description is required"))?;
    let deadline = payload
        .deadline
        .as_ref()
        .and_then(model::parse_deadline)
        .ok_or_else(|| ApiError::bad_request("deadline is required"))?;
    let completed = payload
        .completed
        .as_ref()
        .and_then(model::parse_completed)
        .ok_or_else(|| ApiError::bad_request("completed is required"))?;
    let assigned_user = payload
        .assigned_user
        .ok_or_else(|| ApiError::bad_request("assignedUser is required"))?;
    // required for a full replacement, but the stored value is always
    // recomputed from the resolved owner
    payload
        .assigned_user_name
        .ok_or_else(|| ApiError::bad_request("assignedUserName is required"))?;
    let assigned_user_name = resolve_owner_name(store, &assigned_user).await?;

    // reassignment: pull from the previous owner before the new owner is
    // pushed, so no quiescent point shows the id in two lists
    if !current.assigned_user.is_empty() && current.assigned_user != assigned_user {
        sync::release_owner(store, &current.assigned_user, &current.id).await?;
    }

    let mut task = Task {
        id: current.id,
        name,
        description,
        deadline,
        completed,
        assigned_user,
        assigned_user_name,
        date_created: current.date_created,
    };
    store
        .replace_by_id(Collection::Tasks, &task.id, task.to_doc())
        .await?;
    apply_link(store, &mut task).await?;
    info!(task = %task.id, user = %task.assigned_user, "task replaced");
    Ok(task)
}

pub async fn delete(store: &dyn EntityStore, id: &str) -> Result<(), ApiError> {
    let current = store
        .find_by_id(Collection::Tasks, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let task = Task::from_doc(current)?;

    if task.assigned_user.is_empty() {
        sync::detach_everywhere(store, &task.id).await?;
    } else {
        sync::release_owner(store, &task.assigned_user, &task.id).await?;
    }
    store.delete_by_id(Collection::Tasks, id).await?;
    info!(task = %task.id, "task deleted");
    Ok(())
}

/// Owner's display name for an assignment, or the sentinel when unowned.
/// Assignment to an unknown user is rejected here, before anything commits.
async fn resolve_owner_name(
    store: &dyn EntityStore,
    assigned_user: &str,
) -> Result<String, ApiError> {
    if assigned_user.is_empty() {
        return Ok(UNASSIGNED.to_string());
    }
    let owner = store
        .find_by_id(Collection::Users, assigned_user)
        .await?
        .ok_or_else(|| {
            ApiError::bad_request(format!("assignedUser {assigned_user} does not exist"))
        })?;
    Ok(owner
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(UNASSIGNED)
        .to_string())
}

/// Run reconciliation and fold an owner-vanished repair back into the
/// entity handed to the caller.
async fn apply_link(store: &dyn EntityStore, task: &mut Task) -> Result<(), ApiError> {
    if sync::reconcile_task(store, task).await? == sync::TaskLink::OwnerMissing {
        task.assigned_user = String::new();
        task.assigned_user_name = UNASSIGNED.to_string();
    }
    Ok(())
}

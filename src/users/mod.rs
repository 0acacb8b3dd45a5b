// users/mod.rs — user request service.
//
// The pending-list edits here are the authoritative side of assignment:
// seeding or adding a task id to a user's list claims that task outright,
// while removals only release tasks the user still owns.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::model::{self, User, UserPayload};
use crate::query::{self, QueryOutcome, QuerySpec};
use crate::store::{doc, Collection, Document, EntityStore};
use crate::sync;

pub async fn list(
    store: &dyn EntityStore,
    params: &HashMap<String, String>,
) -> Result<QueryOutcome, ApiError> {
    let spec = QuerySpec::from_params(params, 0);
    Ok(query::execute(store, Collection::Users, &spec).await?)
}

pub async fn get(
    store: &dyn EntityStore,
    id: &str,
    params: &HashMap<String, String>,
) -> Result<Document, ApiError> {
    let doc = store
        .find_by_id(Collection::Users, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let spec = QuerySpec::from_params(params, 0);
    Ok(match &spec.projection {
        Some(projection) => projection.apply(doc),
        None => doc,
    })
}

pub async fn create(store: &dyn EntityStore, payload: UserPayload) -> Result<User, ApiError> {
    let name = payload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let email = payload
        .email
        .map(|e| model::normalize_email(&e))
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("email is required"))?;
    ensure_email_free(store, &email, None).await?;

    // a creation seed must be an array; anything else is treated as empty
    let seed: Vec<String> = match payload.pending_tasks {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    let claimed = resolve_existing(store, &seed).await?;

    let user = User {
        id: model::new_id(),
        name,
        email,
        pending_tasks: claimed.clone(),
        date_created: Utc::now(),
    };
    store.insert(Collection::Users, user.to_doc()).await?;
    sync::claim_tasks(store, &user.id, &user.name, &claimed).await?;
    info!(user = %user.id, claimed = claimed.len(), "user created");
    Ok(user)
}

pub async fn replace(
    store: &dyn EntityStore,
    id: &str,
    payload: UserPayload,
) -> Result<User, ApiError> {
    let name = payload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let email = payload
        .email
        .map(|e| model::normalize_email(&e))
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("email is required"))?;
    let requested = payload
        .pending_tasks
        .as_ref()
        .and_then(model::parse_pending_tasks)
        .ok_or_else(|| ApiError::bad_request("pendingTasks is required"))?;

    let current = store
        .find_by_id(Collection::Users, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let current = User::from_doc(current)?;
    ensure_email_free(store, &email, Some(id)).await?;

    let old: HashSet<&str> = current.pending_tasks.iter().map(String::as_str).collect();
    let new: HashSet<&str> = requested.iter().map(String::as_str).collect();

    let removed: Vec<String> = current
        .pending_tasks
        .iter()
        .filter(|t| !new.contains(t.as_str()))
        .cloned()
        .collect();
    let added: Vec<String> = dedup(requested.iter().filter(|t| !old.contains(t.as_str())));

    // release first, then claim — same order as a task reassignment
    sync::unclaim_tasks(store, id, &removed).await?;
    if name != current.name {
        sync::refresh_owner_name(store, id, &name).await?;
    }
    let added = resolve_existing(store, &added).await?;
    sync::claim_tasks(store, id, &name, &added).await?;

    // the stored list keeps the requested order, minus ids that no longer
    // name a live task
    let added_set: HashSet<&str> = added.iter().map(String::as_str).collect();
    let pending_tasks = dedup(
        requested
            .iter()
            .filter(|t| old.contains(t.as_str()) || added_set.contains(t.as_str())),
    );

    let user = User {
        id: current.id,
        name,
        email,
        pending_tasks,
        date_created: current.date_created,
    };
    store
        .replace_by_id(Collection::Users, id, user.to_doc())
        .await?;
    info!(user = %user.id, added = added.len(), removed = removed.len(), "user replaced");
    Ok(user)
}

pub async fn delete(store: &dyn EntityStore, id: &str) -> Result<(), ApiError> {
    if store.find_by_id(Collection::Users, id).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    let released = sync::clear_owner(store, id).await?;
    store.delete_by_id(Collection::Users, id).await?;
    info!(user = %id, released, "user deleted");
    Ok(())
}

/// Duplicate email is a validation failure, not a store failure. The check
/// runs against the normalized form; `exclude` skips the user being
/// replaced.
async fn ensure_email_free(
    store: &dyn EntityStore,
    email: &str,
    exclude: Option<&str>,
) -> Result<(), ApiError> {
    let filter = match exclude {
        Some(id) => doc(json!({ "email": email, "_id": { "$ne": id } })),
        None => doc(json!({ "email": email })),
    };
    if store.count(Collection::Users, &filter).await? > 0 {
        return Err(ApiError::bad_request(format!(
            "email {email} already registered"
        )));
    }
    Ok(())
}

/// Filter a requested id list down to tasks that actually exist, keeping
/// request order and dropping duplicates. A stored pending list never
/// carries a dangling id.
async fn resolve_existing(
    store: &dyn EntityStore,
    ids: &[String],
) -> Result<Vec<String>, ApiError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let found = store
        .find(
            Collection::Tasks,
            &doc(json!({ "_id": { "$in": ids } })),
        )
        .await?;
    let live: HashSet<String> = found
        .iter()
        .filter_map(|d| d.get("_id").and_then(Value::as_str).map(str::to_string))
        .collect();
    Ok(dedup(ids.iter().filter(|t| live.contains(t.as_str()))))
}

fn dedup<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

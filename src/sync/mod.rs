// sync/mod.rs — the reference-integrity engine.
//
// Keeps `Task.assignedUser` and `User.pendingTasks` mutually consistent
// after a mutation to either collection, without cross-collection
// transactions. Every step here is an idempotent, set-semantic atomic store
// call (conditional push guarded by `$ne`, unconditional pull, filtered
// `$set`), so a step that re-runs — or interleaves with a concurrent
// request — converges instead of corrupting state. Within one request the
// step order is fixed: pull from the old owner before pushing to the new
// one.
//
// Nothing in this module validates: callers reject assignment to a
// nonexistent user before mutating. The one exception is the owner
// re-check in `reconcile_task`, which repairs the race where the owner
// vanished between validation and reconciliation.

use anyhow::Result;
use serde_json::json;
use tracing::{debug, warn};

use crate::model::{Task, UNASSIGNED};
use crate::store::{doc, Collection, EntityStore};

/// How a task ended up linked after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLink {
    /// No owner; the id was stripped from every pending list.
    Unassigned,
    /// Owner confirmed; the pending list reflects the completion flag.
    Linked,
    /// The assignee disappeared before reconciliation ran; the task's
    /// assignment fields were cleared instead of leaving a dangling ref.
    OwnerMissing,
}

/// Restore the invariants after a task create or full replacement.
pub async fn reconcile_task(store: &dyn EntityStore, task: &Task) -> Result<TaskLink> {
    if task.assigned_user.is_empty() {
        detach_everywhere(store, &task.id).await?;
        return Ok(TaskLink::Unassigned);
    }

    if store
        .find_by_id(Collection::Users, &task.assigned_user)
        .await?
        .is_none()
    {
        warn!(
            task = %task.id,
            user = %task.assigned_user,
            "assignee vanished before reconciliation; clearing assignment"
        );
        store
            .update_one(
                Collection::Tasks,
                &doc(json!({ "_id": task.id.clone() })),
                &doc(json!({ "$set": { "assignedUser": "", "assignedUserName": UNASSIGNED } })),
            )
            .await?;
        return Ok(TaskLink::OwnerMissing);
    }

    if task.completed {
        // completed tasks never sit in a pending list
        store
            .update_one(
                Collection::Users,
                &doc(json!({ "_id": task.assigned_user.clone() })),
                &doc(json!({ "$pull": { "pendingTasks": task.id.clone() } })),
            )
            .await?;
    } else {
        // conditional push: the $ne guard makes re-runs no-ops and keeps the
        // list duplicate-free
        store
            .update_one(
                Collection::Users,
                &doc(json!({
                    "_id": task.assigned_user.clone(),
                    "pendingTasks": { "$ne": task.id.clone() }
                })),
                &doc(json!({ "$push": { "pendingTasks": task.id.clone() } })),
            )
            .await?;
    }
    debug!(task = %task.id, user = %task.assigned_user, "task reconciled");
    Ok(TaskLink::Linked)
}

/// Pull a task id from one specific user's pending list (reassignment and
/// task-delete paths, where the previous owner is known from the task
/// record).
pub async fn release_owner(store: &dyn EntityStore, owner_id: &str, task_id: &str) -> Result<()> {
    store
        .update_one(
            Collection::Users,
            &doc(json!({ "_id": owner_id })),
            &doc(json!({ "$pull": { "pendingTasks": task_id } })),
        )
        .await?;
    Ok(())
}

/// Pull a task id from every pending list that holds it. Cleanup for
/// unowned tasks; normally a no-op.
pub async fn detach_everywhere(store: &dyn EntityStore, task_id: &str) -> Result<u64> {
    store
        .update_many(
            Collection::Users,
            &doc(json!({ "pendingTasks": task_id })),
            &doc(json!({ "$pull": { "pendingTasks": task_id } })),
        )
        .await
}

/// Authoritatively claim a set of tasks for `owner_id`: strip the ids from
/// every other user's pending list, then force assignment and un-complete
/// the tasks. Claiming always wins over whatever state the tasks were in.
pub async fn claim_tasks(
    store: &dyn EntityStore,
    owner_id: &str,
    owner_name: &str,
    task_ids: &[String],
) -> Result<u64> {
    if task_ids.is_empty() {
        return Ok(0);
    }
    let displaced = store
        .update_many(
            Collection::Users,
            &doc(json!({
                "_id": { "$ne": owner_id },
                "pendingTasks": { "$in": task_ids }
            })),
            &doc(json!({ "$pull": { "pendingTasks": { "$in": task_ids } } })),
        )
        .await?;
    if displaced > 0 {
        debug!(owner = %owner_id, displaced, "claim displaced tasks from other users");
    }
    store
        .update_many(
            Collection::Tasks,
            &doc(json!({ "_id": { "$in": task_ids } })),
            &doc(json!({
                "$set": {
                    "assignedUser": owner_id,
                    "assignedUserName": owner_name,
                    "completed": false
                }
            })),
        )
        .await
}

/// Clear assignment on tasks dropped from a user's pending list — but only
/// where the task still names this user as owner, so a concurrent
/// reassignment elsewhere is not clobbered.
pub async fn unclaim_tasks(
    store: &dyn EntityStore,
    owner_id: &str,
    task_ids: &[String],
) -> Result<u64> {
    if task_ids.is_empty() {
        return Ok(0);
    }
    store
        .update_many(
            Collection::Tasks,
            &doc(json!({ "_id": { "$in": task_ids }, "assignedUser": owner_id })),
            &doc(json!({ "$set": { "assignedUser": "", "assignedUserName": UNASSIGNED } })),
        )
        .await
}

/// User-delete cascade: clear assignment on every task pointing at the
/// user, completed ones included (they are absent from the pending list
/// but still reference the owner).
pub async fn clear_owner(store: &dyn EntityStore, owner_id: &str) -> Result<u64> {
    store
        .update_many(
            Collection::Tasks,
            &doc(json!({ "assignedUser": owner_id })),
            &doc(json!({ "$set": { "assignedUser": "", "assignedUserName": UNASSIGNED } })),
        )
        .await
}

/// Refresh the denormalized owner name on every task the user holds, after
/// a rename.
pub async fn refresh_owner_name(
    store: &dyn EntityStore,
    owner_id: &str,
    owner_name: &str,
) -> Result<u64> {
    store
        .update_many(
            Collection::Tasks,
            &doc(json!({ "assignedUser": owner_id })),
            &doc(json!({ "$set": { "assignedUserName": owner_name } })),
        )
        .await
}

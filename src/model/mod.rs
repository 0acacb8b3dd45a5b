// model/mod.rs — Task and User documents plus payload coercion.
//
// Wire shape follows the persisted layout: camelCase fields, `_id` identity.
// `assignedUserName` is server-owned — it is always recomputed from the
// resolved owner (or reset to the sentinel), never trusted from a caller.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::Document;

/// Display value for a task with no owner.
pub const UNASSIGNED: &str = "unassigned";

fn unassigned_name() -> String {
    UNASSIGNED.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    /// Owner's user id, or "" when unowned.
    #[serde(default)]
    pub assigned_user: String,
    /// Denormalized copy of the owner's display name.
    #[serde(default = "unassigned_name")]
    pub assigned_user_name: String,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    /// Ids of tasks assigned to this user and not yet completed.
    #[serde(default)]
    pub pending_tasks: Vec<String>,
    pub date_created: DateTime<Utc>,
}

impl Task {
    pub fn to_doc(&self) -> Document {
        to_doc(self)
    }

    pub fn from_doc(doc: Document) -> Result<Self> {
        serde_json::from_value(Value::Object(doc)).context("malformed task document")
    }
}

impl User {
    pub fn to_doc(&self) -> Document {
        to_doc(self)
    }

    pub fn from_doc(doc: Document) -> Result<Self> {
        serde_json::from_value(Value::Object(doc)).context("malformed user document")
    }
}

fn to_doc<T: Serialize>(entity: &T) -> Document {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map,
        _ => Document::new(),
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ─── Request payloads ─────────────────────────────────────────────────────────

/// Loosely-typed task body. Fields the caller got wrong collapse to an empty
/// payload, which the validation step rejects as Bad Request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<Value>,
    pub completed: Option<Value>,
    pub assigned_user: Option<String>,
    pub assigned_user_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub pending_tasks: Option<Value>,
}

impl TaskPayload {
    pub fn from_value(body: Value) -> Self {
        serde_json::from_value(body).unwrap_or_default()
    }
}

impl UserPayload {
    pub fn from_value(body: Value) -> Self {
        serde_json::from_value(body).unwrap_or_default()
    }
}

// ─── Field coercion ───────────────────────────────────────────────────────────

/// Accepts epoch milliseconds (number or numeric string) or an RFC 3339
/// string.
pub fn parse_deadline(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        _ => None,
    }
}

/// Accepts a bool or the strings "true" / "false".
pub fn parse_completed(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts an array of id strings, or a comma-separated string
/// ("t1,t2" — the form HTML forms submit). Any other shape is rejected.
pub fn parse_pending_tasks(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

/// Emails are stored trimmed and lowercased; uniqueness is checked against
/// this normal form.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

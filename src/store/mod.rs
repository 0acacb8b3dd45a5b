// store/mod.rs — document store abstraction.
//
// Both collections live behind the `EntityStore` trait: per-collection CRUD
// plus atomic filtered updates. The reconciliation engine leans on the
// atomicity of a single `update_one`/`update_many` call — a filter match and
// its operator application commit as one unit — so implementations must not
// split them.

pub mod memory;
pub mod sqlite;
pub mod update;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A stored entity: a flat JSON object keyed by field name, identity under
/// `_id`.
pub type Document = serde_json::Map<String, Value>;

/// Build a [`Document`] from a `json!` object literal.
///
/// Non-object values yield an empty document, which reads as match-all when
/// used as a filter.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// The two entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tasks,
    Users,
}

impl Collection {
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Users => "users",
        }
    }
}

/// Per-collection CRUD primitives with atomic filtered updates.
///
/// Filters are documents in the predicate language of [`crate::query::filter`];
/// update documents carry `$set` / `$push` / `$pull` operators (see
/// [`update::apply`]). Passed around as `Arc<dyn EntityStore>` so handlers and
/// tests can swap the durable backend for the in-memory one.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All documents matching `filter`, in insertion order.
    async fn find(&self, coll: Collection, filter: &Document) -> Result<Vec<Document>>;

    /// Single document by `_id`.
    async fn find_by_id(&self, coll: Collection, id: &str) -> Result<Option<Document>>;

    /// Number of documents matching `filter`.
    async fn count(&self, coll: Collection, filter: &Document) -> Result<usize>;

    /// Insert a document, assigning a fresh `_id` if the caller did not.
    /// Returns the stored document.
    async fn insert(&self, coll: Collection, doc: Document) -> Result<Document>;

    /// Apply `update` to the first document matching `filter`.
    /// Returns the number of documents matched (0 or 1).
    async fn update_one(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
    ) -> Result<u64>;

    /// Apply `update` to every document matching `filter`, as one atomic unit.
    /// Returns the number of documents matched.
    async fn update_many(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
    ) -> Result<u64>;

    /// Replace the document with the given `_id` wholesale.
    /// Returns false when no such document exists.
    async fn replace_by_id(&self, coll: Collection, id: &str, doc: Document) -> Result<bool>;

    /// Delete by `_id`. Returns false when no such document exists.
    async fn delete_by_id(&self, coll: Collection, id: &str) -> Result<bool>;
}

pub(crate) fn doc_id(doc: &Document) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

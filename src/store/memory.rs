// store/memory.rs — in-memory EntityStore.
//
// Each trait call takes the collection's write lock for its whole
// read-modify-write, which is what gives a filtered update its single-call
// atomicity. Used as the test double and as the `--store memory` backend.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::query::filter;
use crate::store::{doc_id, update, Collection, Document, EntityStore};

#[derive(Default)]
pub struct MemStore {
    tasks: RwLock<Vec<Document>>,
    users: RwLock<Vec<Document>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn coll(&self, coll: Collection) -> &RwLock<Vec<Document>> {
        match coll {
            Collection::Tasks => &self.tasks,
            Collection::Users => &self.users,
        }
    }
}

#[async_trait]
impl EntityStore for MemStore {
    async fn find(&self, coll: Collection, filter: &Document) -> Result<Vec<Document>> {
        let docs = self.coll(coll).read().await;
        Ok(docs
            .iter()
            .filter(|d| filter::matches(d, filter))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, coll: Collection, id: &str) -> Result<Option<Document>> {
        let docs = self.coll(coll).read().await;
        Ok(docs.iter().find(|d| doc_id(d) == Some(id)).cloned())
    }

    async fn count(&self, coll: Collection, filter: &Document) -> Result<usize> {
        let docs = self.coll(coll).read().await;
        Ok(docs.iter().filter(|d| filter::matches(d, filter)).count())
    }

    async fn insert(&self, coll: Collection, mut doc: Document) -> Result<Document> {
        if doc_id(&doc).is_none() {
            doc.insert("_id".into(), json!(Uuid::new_v4().to_string()));
        }
        let mut docs = self.coll(coll).write().await;
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn update_one(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
    ) -> Result<u64> {
        let mut docs = self.coll(coll).write().await;
        for doc in docs.iter_mut() {
            if filter::matches(doc, filter) {
                update::apply(doc, update);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn update_many(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
    ) -> Result<u64> {
        let mut docs = self.coll(coll).write().await;
        let mut matched = 0;
        for doc in docs.iter_mut() {
            if filter::matches(doc, filter) {
                update::apply(doc, update);
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn replace_by_id(&self, coll: Collection, id: &str, mut doc: Document) -> Result<bool> {
        doc.insert("_id".into(), Value::String(id.to_string()));
        let mut docs = self.coll(coll).write().await;
        match docs.iter_mut().find(|d| doc_id(d) == Some(id)) {
            Some(slot) => {
                *slot = doc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, coll: Collection, id: &str) -> Result<bool> {
        let mut docs = self.coll(coll).write().await;
        let before = docs.len();
        docs.retain(|d| doc_id(d) != Some(id));
        Ok(docs.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::doc;

    #[tokio::test]
    async fn insert_assigns_id_when_absent() {
        let store = MemStore::new();
        let stored = store
            .insert(Collection::Tasks, doc(json!({"name": "x"})))
            .await
            .unwrap();
        let id = doc_id(&stored).unwrap().to_string();
        assert!(store
            .find_by_id(Collection::Tasks, &id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn guarded_push_is_idempotent() {
        let store = MemStore::new();
        store
            .insert(Collection::Users, doc(json!({"_id": "u1", "pendingTasks": []})))
            .await
            .unwrap();

        let filter = doc(json!({"_id": "u1", "pendingTasks": {"$ne": "t1"}}));
        let push = doc(json!({"$push": {"pendingTasks": "t1"}}));

        assert_eq!(store.update_one(Collection::Users, &filter, &push).await.unwrap(), 1);
        // second run: the guard no longer matches, nothing is appended
        assert_eq!(store.update_one(Collection::Users, &filter, &push).await.unwrap(), 0);

        let user = store.find_by_id(Collection::Users, "u1").await.unwrap().unwrap();
        assert_eq!(user.get("pendingTasks"), Some(&json!(["t1"])));
    }

    #[tokio::test]
    async fn update_many_pulls_across_documents() {
        let store = MemStore::new();
        for (id, pending) in [("u1", json!(["t1", "t2"])), ("u2", json!(["t1"]))] {
            store
                .insert(Collection::Users, doc(json!({"_id": id, "pendingTasks": pending})))
                .await
                .unwrap();
        }
        let matched = store
            .update_many(
                Collection::Users,
                &doc(json!({"pendingTasks": "t1"})),
                &doc(json!({"$pull": {"pendingTasks": "t1"}})),
            )
            .await
            .unwrap();
        assert_eq!(matched, 2);
        for id in ["u1", "u2"] {
            let user = store.find_by_id(Collection::Users, id).await.unwrap().unwrap();
            let pending = user.get("pendingTasks").and_then(Value::as_array).unwrap();
            assert!(!pending.contains(&json!("t1")));
        }
    }

    #[tokio::test]
    async fn replace_and_delete() {
        let store = MemStore::new();
        store
            .insert(Collection::Tasks, doc(json!({"_id": "t1", "name": "a"})))
            .await
            .unwrap();
        assert!(store
            .replace_by_id(Collection::Tasks, "t1", doc(json!({"name": "b"})))
            .await
            .unwrap());
        let stored = store.find_by_id(Collection::Tasks, "t1").await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&json!("b")));
        assert_eq!(doc_id(&stored), Some("t1"));

        assert!(store.delete_by_id(Collection::Tasks, "t1").await.unwrap());
        assert!(!store.delete_by_id(Collection::Tasks, "t1").await.unwrap());
    }
}

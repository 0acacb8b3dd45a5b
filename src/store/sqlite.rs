// store/sqlite.rs — durable EntityStore on SQLite.
//
// Documents are stored as JSON text, one row per document, one table per
// collection. Filters and update operators are evaluated in process; a
// filtered update reads, rewrites, and commits inside a single transaction,
// which is what makes it atomic as one unit.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

use crate::query::filter;
use crate::store::{doc_id, update, Collection, Document, EntityStore};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking a request indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create the store with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding
    /// it are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("taskd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        for coll in [Collection::Tasks, Collection::Users] {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    doc TEXT NOT NULL
                )",
                coll.name()
            ))
            .execute(pool)
            .await
            .context("failed to create collection table")?;
        }
        Ok(())
    }

    async fn load_all(&self, coll: Collection) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!("SELECT doc FROM {}", coll.name()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| parse_doc(&row.try_get::<String, _>("doc")?))
            .collect()
    }
}

fn parse_doc(raw: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow::anyhow!("stored document is not an object: {other}")),
    }
}

fn encode_doc(doc: &Document) -> Result<String> {
    serde_json::to_string(&Value::Object(doc.clone())).context("failed to encode document")
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn find(&self, coll: Collection, filter: &Document) -> Result<Vec<Document>> {
        with_timeout(async {
            let docs = self.load_all(coll).await?;
            Ok(docs
                .into_iter()
                .filter(|d| filter::matches(d, filter))
                .collect())
        })
        .await
    }

    async fn find_by_id(&self, coll: Collection, id: &str) -> Result<Option<Document>> {
        with_timeout(async {
            let row = sqlx::query(&format!("SELECT doc FROM {} WHERE id = ?", coll.name()))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|r| parse_doc(&r.try_get::<String, _>("doc")?))
                .transpose()
        })
        .await
    }

    async fn count(&self, coll: Collection, filter: &Document) -> Result<usize> {
        Ok(self.find(coll, filter).await?.len())
    }

    async fn insert(&self, coll: Collection, mut doc: Document) -> Result<Document> {
        with_timeout(async {
            if doc_id(&doc).is_none() {
                doc.insert("_id".into(), json!(Uuid::new_v4().to_string()));
            }
            let id = doc_id(&doc)
                .map(str::to_string)
                .unwrap_or_default();
            sqlx::query(&format!(
                "INSERT INTO {} (id, doc) VALUES (?, ?)",
                coll.name()
            ))
            .bind(id)
            .bind(encode_doc(&doc)?)
            .execute(&self.pool)
            .await?;
            Ok(doc)
        })
        .await
    }

    async fn update_one(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
    ) -> Result<u64> {
        self.filtered_update(coll, filter, update, true).await
    }

    async fn update_many(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
    ) -> Result<u64> {
        self.filtered_update(coll, filter, update, false).await
    }

    async fn replace_by_id(&self, coll: Collection, id: &str, mut doc: Document) -> Result<bool> {
        with_timeout(async {
            doc.insert("_id".into(), Value::String(id.to_string()));
            let result = sqlx::query(&format!("UPDATE {} SET doc = ? WHERE id = ?", coll.name()))
                .bind(encode_doc(&doc)?)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn delete_by_id(&self, coll: Collection, id: &str) -> Result<bool> {
        with_timeout(async {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", coll.name()))
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}

impl SqliteStore {
    /// Read-filter-rewrite inside one transaction. `single` stops after the
    /// first match (update-one semantics).
    async fn filtered_update(
        &self,
        coll: Collection,
        filter: &Document,
        update: &Document,
        single: bool,
    ) -> Result<u64> {
        with_timeout(async {
            let mut tx = self.pool.begin().await?;
            let rows = sqlx::query(&format!("SELECT id, doc FROM {}", coll.name()))
                .fetch_all(&mut *tx)
                .await?;

            let mut matched = 0u64;
            for row in rows {
                let id: String = row.try_get("id")?;
                let mut doc = parse_doc(&row.try_get::<String, _>("doc")?)?;
                if !filter::matches(&doc, filter) {
                    continue;
                }
                matched += 1;
                if update::apply(&mut doc, update) {
                    sqlx::query(&format!("UPDATE {} SET doc = ? WHERE id = ?", coll.name()))
                        .bind(encode_doc(&doc)?)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await?;
                }
                if single {
                    break;
                }
            }
            tx.commit().await?;
            Ok(matched)
        })
        .await
    }
}

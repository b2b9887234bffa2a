//! SQLite store: structured, indexed persistence of activity records.

use super::LocalStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use autopatch_engine::{ActivityRecord, RecordState, Seq, StateFilter};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::Json;
use sqlx::Row;

/// A stored activity row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub seq: i64,
    pub time: i64,
    pub path: String,
    pub value: Json<Value>,
    pub state: i64,
    pub previous: Option<Json<Value>>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredRecord {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            seq: row.try_get("seq")?,
            time: row.try_get("time")?,
            path: row.try_get("path")?,
            value: row.try_get("value")?,
            state: row.try_get("state")?,
            previous: row.try_get("previous")?,
        })
    }
}

impl StoredRecord {
    /// Convert a database row to an engine record.
    pub fn to_record(&self) -> Result<ActivityRecord> {
        let state = RecordState::from_code(self.state).ok_or_else(|| {
            Error::Unavailable(format!(
                "record {} has unknown state code {}",
                self.seq, self.state
            ))
        })?;

        let seq = Seq::try_from(self.seq).map_err(|_| {
            Error::Unavailable(format!("record has negative seq {}", self.seq))
        })?;
        let time = u64::try_from(self.time).map_err(|_| {
            Error::Unavailable(format!("record {} has negative time {}", self.seq, self.time))
        })?;

        Ok(ActivityRecord {
            seq,
            time,
            path: self.path.clone(),
            value: self.value.0.clone(),
            state,
            previous: self.previous.as_ref().map(|p| p.0.clone()),
        })
    }
}

/// Activity records persisted in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database URL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        // A single connection keeps `sqlite::memory:` databases coherent
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        tracing::debug!("Running activity store migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn load(&self, namespace: &str, filter: StateFilter) -> Result<Vec<ActivityRecord>> {
        let condition = match filter {
            StateFilter::Dirty => "AND state = 0",
            StateFilter::Acknowledged => "AND state >= 2",
            StateFilter::All => "",
        };
        let sql = format!(
            r#"
            SELECT seq, time, path, value, state, previous
            FROM activity_records
            WHERE namespace = ?1 {condition}
            ORDER BY seq
            "#
        );

        let rows = sqlx::query_as::<_, StoredRecord>(&sql)
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(StoredRecord::to_record).collect()
    }

    async fn upsert(&self, namespace: &str, records: &[ActivityRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO activity_records (namespace, seq, time, path, value, state, previous)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (namespace, seq) DO UPDATE SET
                    time = excluded.time,
                    path = excluded.path,
                    value = excluded.value,
                    state = excluded.state,
                    previous = excluded.previous
                "#,
            )
            .bind(namespace)
            .bind(record.seq as i64)
            .bind(record.time as i64)
            .bind(&record.path)
            .bind(Json(&record.value))
            .bind(record.state.code())
            .bind(record.previous.as_ref().map(Json))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn remove(&self, namespace: &str, seqs: &[Seq]) -> Result<()> {
        if seqs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for seq in seqs {
            sqlx::query("DELETE FROM activity_records WHERE namespace = ?1 AND seq = ?2")
                .bind(namespace)
                .bind(*seq as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn prune_accepted(&self, namespace: &str) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM activity_records
            WHERE namespace = ?1
              AND state = 3
              AND seq NOT IN (
                  SELECT MAX(seq) FROM activity_records
                  WHERE namespace = ?1 AND state = 3
                  GROUP BY path
              )
            "#,
        )
        .bind(namespace)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn record(seq: Seq, path: &str, value: Value, state: RecordState) -> ActivityRecord {
        let mut record = ActivityRecord::pending(seq, path, value, seq * 100);
        record.state = state;
        record
    }

    #[tokio::test]
    async fn filters_by_state_index() {
        let store = memory_store().await;
        store
            .upsert(
                "/form",
                &[
                    record(1, "a", json!(1), RecordState::Accepted),
                    record(2, "b", json!(2), RecordState::Submitted),
                    record(3, "c", json!(3), RecordState::Superseded),
                    record(4, "c", json!(4), RecordState::Pending),
                ],
            )
            .await
            .unwrap();

        let dirty = store.load("/form", StateFilter::Dirty).await.unwrap();
        assert_eq!(dirty.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![4]);

        let acknowledged = store.load("/form", StateFilter::Acknowledged).await.unwrap();
        assert_eq!(
            acknowledged.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![1, 2]
        );

        assert_eq!(store.load("/form", StateFilter::All).await.unwrap().len(), 4);
        assert!(store.load("/other", StateFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_roundtrips_values() {
        let store = memory_store().await;
        let mut folded = record(1, "$.profile", json!({"tags": ["x"]}), RecordState::Pending);
        folded.previous = Some(json!(null));
        let plain = record(2, "$.name", json!("Ada"), RecordState::Pending);
        store.upsert("/form", &[folded.clone(), plain.clone()]).await.unwrap();

        let mut submitted = plain.clone();
        submitted.state = RecordState::Submitted;
        store.upsert("/form", &[submitted.clone()]).await.unwrap();

        let all = store.load("/form", StateFilter::All).await.unwrap();
        assert_eq!(all, vec![folded, submitted]);
    }

    #[tokio::test]
    async fn remove_and_prune() {
        let store = memory_store().await;
        store
            .upsert(
                "/form",
                &[
                    record(1, "a", json!(1), RecordState::Accepted),
                    record(2, "a", json!(2), RecordState::Accepted),
                    record(3, "b", json!(3), RecordState::Accepted),
                    record(4, "b", json!(4), RecordState::Pending),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.prune_accepted("/form").await.unwrap(), 1);
        store.remove("/form", &[4]).await.unwrap();

        let left: Vec<_> = store
            .load("/form", StateFilter::All)
            .await
            .unwrap()
            .iter()
            .map(|r| r.seq)
            .collect();
        assert_eq!(left, vec![2, 3]);
    }

    #[tokio::test]
    async fn negative_columns_are_reported_not_wrapped() {
        let store = memory_store().await;
        store
            .upsert("/form", &[record(1, "a", json!(1), RecordState::Pending)])
            .await
            .unwrap();

        sqlx::query("UPDATE activity_records SET time = -5 WHERE seq = 1")
            .execute(store.pool())
            .await
            .unwrap();
        let err = store.load("/form", StateFilter::All).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));

        sqlx::query("UPDATE activity_records SET time = 100, seq = -1 WHERE seq = 1")
            .execute(store.pool())
            .await
            .unwrap();
        let err = store.load("/form", StateFilter::All).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}

use crate::adapters::{TransactionManager, TransactionScope};
use crate::domain::{Checkpoint, PersistedLogEvent, QueuedEvent, SequencedLogEvent};
use crate::error::{LogHookError, Result};
use crate::persistence::{DrainLease, DurableQueue, LogRepository, Sequencer, SEQUENCE_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

const SELECT_EVENTS_AFTER: &str = r#"
    SELECT sequence_id, level, message, source, metadata, timestamp
    FROM logs
    WHERE sequence_id > $1
    ORDER BY sequence_id ASC
    LIMIT $2
"#;

const STREAM_EVENTS_AFTER: &str = r#"
    SELECT sequence_id, level, message, source, metadata, timestamp
    FROM logs
    WHERE sequence_id > $1
    ORDER BY sequence_id ASC
"#;

/// Sequencer and queue failures mean the backing store is unreachable
fn unavailable(err: sqlx::Error) -> LogHookError {
    LogHookError::Unavailable(err.to_string())
}

/// Commit failures are retried by the persistence worker
fn transient(err: LogHookError) -> LogHookError {
    match err {
        LogHookError::Database(e) => LogHookError::TransientStorage(e.to_string()),
        other => other,
    }
}

fn event_from_row(row: &PgRow) -> Result<PersistedLogEvent> {
    let metadata = match row.try_get::<Value, _>("metadata")? {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(PersistedLogEvent {
        sequence_id: row.try_get("sequence_id")?,
        level: row.try_get("level")?,
        message: row.try_get("message")?,
        source: row.try_get("source")?,
        metadata,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
    })
}

fn checkpoint_from_row(row: &PgRow) -> Result<Checkpoint> {
    Ok(Checkpoint {
        checkpoint_id: row.try_get("checkpoint_id")?,
        last_sequence: row.try_get("last_sequence")?,
        created_at: row.try_get("created_at")?,
    })
}

/// PostgreSQL storage adapter
///
/// Backs all three storage seams: the `log_sequence` counter row, the
/// `log_queue` table scoped by queue name, and the `logs`/`checkpoints`
/// relational tables.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    queue_name: String,
    transactions: TransactionManager,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32, queue_name: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self::from_pool(pool, queue_name))
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool, queue_name: &str) -> Self {
        Self {
            transactions: TransactionManager::new(pool.clone()),
            pool,
            queue_name: queue_name.to_string(),
        }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

// ==================== Sequencer ====================

#[async_trait]
impl Sequencer for PostgresStore {
    /// Row-locked increment: concurrent callers serialize on the counter row,
    /// and a failed statement leaves the value untouched. The first call on a
    /// freshly provisioned database creates the row at 1.
    #[instrument(skip(self))]
    async fn next(&self) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO log_sequence (name, value)
            VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = log_sequence.value + 1
            RETURNING value
            "#,
        )
        .bind(SEQUENCE_KEY)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(value)
    }

    async fn current(&self) -> Result<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM log_sequence WHERE name = $1")
                .bind(SEQUENCE_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(value.unwrap_or(0))
    }
}

// ==================== Queue ====================

#[async_trait]
impl DurableQueue for PostgresStore {
    #[instrument(skip(self, event), fields(sequence_id = event.sequence_id))]
    async fn push(&self, event: &SequencedLogEvent) -> Result<i64> {
        let payload = serde_json::to_value(event)?;

        let entry_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO log_queue (queue_name, sequence_id, payload)
            VALUES ($1, $2, $3)
            RETURNING entry_id
            "#,
        )
        .bind(&self.queue_name)
        .bind(event.sequence_id)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(entry_id)
    }

    async fn peek_batch(&self, limit: usize) -> Result<Vec<QueuedEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, payload
            FROM log_queue
            WHERE queue_name = $1
            ORDER BY entry_id ASC
            LIMIT $2
            "#,
        )
        .bind(&self.queue_name)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                let entry_id: i64 = row.try_get("entry_id")?;
                let payload: Value = row.try_get("payload")?;
                Ok(QueuedEvent {
                    entry_id,
                    event: serde_json::from_value(payload)?,
                })
            })
            .collect()
    }

    async fn ack(&self, entry_ids: &[i64]) -> Result<u64> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM log_queue
            WHERE queue_name = $1 AND entry_id = ANY($2)
            "#,
        )
        .bind(&self.queue_name)
        .bind(entry_ids)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(result.rows_affected())
    }

    async fn len(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM log_queue WHERE queue_name = $1")
                .bind(&self.queue_name)
                .fetch_one(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(count.max(0) as u64)
    }

    // The advisory lock is transaction-scoped: dropping the lease rolls the
    // transaction back and releases it, even if the holder never unlocks.
    async fn acquire_drain_lease(&self) -> Result<DrainLease> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::BIGINT)")
            .bind(&self.queue_name)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        debug!("Acquired drain lease on queue {}", self.queue_name);
        Ok(DrainLease::new(tx))
    }

    async fn try_acquire_drain_lease(&self) -> Result<Option<DrainLease>> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let acquired: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_xact_lock(hashtext($1)::BIGINT)")
                .bind(&self.queue_name)
                .fetch_one(&mut *tx)
                .await
                .map_err(unavailable)?;

        Ok(acquired.then(|| DrainLease::new(tx)))
    }
}

// ==================== Logs & checkpoints ====================

#[async_trait]
impl LogRepository for PostgresStore {
    #[instrument(skip(self, events), fields(batch = events.len()))]
    async fn insert_batch(&self, events: &[SequencedLogEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .transactions
            .begin(TransactionScope::PersistBatch)
            .await
            .map_err(transient)?;
        let mut inserted = 0;

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO logs (sequence_id, level, message, source, metadata, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (sequence_id) DO NOTHING
                "#,
            )
            .bind(event.sequence_id)
            .bind(&event.level)
            .bind(&event.message)
            .bind(&event.source)
            .bind(Value::Object(event.metadata.clone()))
            .bind(event.timestamp)
            .execute(tx.executor()?)
            .await
            .map_err(|e| transient(e.into()))?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(transient)?;
        debug!("Inserted {} of {} logs", inserted, events.len());
        Ok(inserted)
    }

    async fn high_water_mark(&self) -> Result<i64> {
        let mark: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(sequence_id), 0)::BIGINT FROM logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(mark)
    }

    #[instrument(skip(self))]
    async fn create_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        let mut tx = self
            .transactions
            .begin(TransactionScope::CreateCheckpoint)
            .await?;

        // Read-committed: only rows whose batch transaction has committed count
        let last_sequence: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sequence_id), 0)::BIGINT FROM logs")
                .fetch_one(tx.executor()?)
                .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO checkpoints (checkpoint_id, last_sequence)
            VALUES ($1, $2)
            RETURNING checkpoint_id, last_sequence, created_at
            "#,
        )
        .bind(checkpoint_id)
        .bind(last_sequence)
        .fetch_one(tx.executor()?)
        .await?;

        let checkpoint = checkpoint_from_row(&row)?;
        tx.commit().await?;
        Ok(checkpoint)
    }

    async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            r#"
            SELECT checkpoint_id, last_sequence, created_at
            FROM checkpoints WHERE checkpoint_id = $1
            "#,
        )
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn list_checkpoints(&self, limit: i64) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            r#"
            SELECT checkpoint_id, last_sequence, created_at
            FROM checkpoints
            ORDER BY created_at DESC, checkpoint_id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(checkpoint_from_row).collect()
    }

    async fn events_after(
        &self,
        after: i64,
        limit: Option<i64>,
    ) -> Result<Vec<PersistedLogEvent>> {
        // LIMIT NULL means no limit
        let rows = sqlx::query(SELECT_EVENTS_AFTER)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(event_from_row).collect()
    }

    fn stream_events_after(&self, after: i64) -> BoxStream<'_, Result<PersistedLogEvent>> {
        sqlx::query(STREAM_EVENTS_AFTER)
            .bind(after)
            .fetch(&self.pool)
            .map(|row| event_from_row(&row?))
            .boxed()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

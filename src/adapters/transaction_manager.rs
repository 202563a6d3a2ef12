//! Transaction Manager for atomic batch commits
//!
//! Every write that must land all-or-nothing (a persistence batch, a
//! checkpoint with its high-water mark read) runs inside a scoped
//! transaction that rolls back when dropped without commit.

use crate::error::{LogHookError, Result};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, instrument, warn};

/// Transaction scope identifier for tracking and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionScope {
    /// Batch of queued events written to `logs`
    PersistBatch,
    /// High-water mark read plus checkpoint insert
    CreateCheckpoint,
}

impl std::fmt::Display for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PersistBatch => write!(f, "persist_batch"),
            Self::CreateCheckpoint => write!(f, "create_checkpoint"),
        }
    }
}

/// Transaction Manager for atomic database operations
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a new transaction with scope tracking
    #[instrument(skip(self))]
    pub async fn begin(&self, scope: TransactionScope) -> Result<ManagedTransaction<'static>> {
        let tx = self.pool.begin().await?;
        debug!("Started transaction for scope: {}", scope);
        Ok(ManagedTransaction {
            tx: Some(tx),
            scope,
            committed: false,
        })
    }
}

/// A managed transaction with automatic rollback on drop
pub struct ManagedTransaction<'a> {
    tx: Option<Transaction<'a, Postgres>>,
    scope: TransactionScope,
    committed: bool,
}

impl<'a> ManagedTransaction<'a> {
    /// Connection for executing queries inside the transaction
    /// Use as: `.execute(tx.executor()?).await`
    pub fn executor(&mut self) -> Result<&mut sqlx::PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(LogHookError::Internal(format!(
                "transaction for scope {} already finished",
                self.scope
            ))),
        }
    }

    pub fn scope(&self) -> TransactionScope {
        self.scope
    }

    /// Commit the transaction
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            self.committed = true;
            debug!("Committed transaction for scope: {}", self.scope);
        }
        Ok(())
    }

    /// Rollback the transaction explicitly
    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            warn!("Rolled back transaction for scope: {}", self.scope);
        }
        Ok(())
    }
}

impl<'a> Drop for ManagedTransaction<'a> {
    fn drop(&mut self) {
        if self.tx.is_some() && !self.committed {
            // sqlx rolls the transaction back when it is dropped
            warn!(
                "Transaction for scope {} was dropped without commit - rolling back",
                self.scope
            );
        }
    }
}

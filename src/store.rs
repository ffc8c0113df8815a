// src/store.rs

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::migrate::MigrateError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::config::Config;
use crate::ingest::locks::KeyedLocks;

/// Handle to the normalized store.
///
/// Created by the caller at batch start and passed explicitly to every
/// component; cloning shares the pools and the identity locks.
///
/// Reads go through `pool`. Every write goes through `writer`, which holds a
/// single connection, so two writers of this process never race for the
/// SQLite write lock.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    writer: SqlitePool,
    post_locks: KeyedLocks,
    actor_locks: KeyedLocks,
}

impl Store {
    /// Both reads and writes share `pool`. Callers must keep it to one
    /// connection, or accept write lock contention.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::from_pools(pool.clone(), pool)
    }

    fn from_pools(pool: SqlitePool, writer: SqlitePool) -> Self {
        Self {
            pool,
            writer,
            post_locks: KeyedLocks::new(),
            actor_locks: KeyedLocks::new(),
        }
    }

    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options.clone())
            .await?;

        if config.store_max_connections <= 1 {
            return Ok(Self::from_pool(writer));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.store_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        Ok(Self::from_pools(pool, writer))
    }

    /// Private in-memory database, for tests and dry runs.
    /// Pinned to one connection that never expires, since each SQLite memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(&self.writer).await
    }

    /// Pool for read-only queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Single-connection pool every write goes through.
    pub fn writer(&self) -> &SqlitePool {
        &self.writer
    }

    pub(crate) fn post_locks(&self) -> &KeyedLocks {
        &self.post_locks
    }

    pub(crate) fn actor_locks(&self) -> &KeyedLocks {
        &self.actor_locks
    }

    /// Waits for checked-out connections to be returned, then closes the pools.
    pub async fn close(&self) {
        self.writer.close().await;
        self.pool.close().await;
    }
}

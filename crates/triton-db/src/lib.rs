pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, InterruptHandle, Transaction, TransactionBehavior};
use tracing::{debug, info};

pub use error::DbError;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Longest a caller waits for a free pooled connection. Matches SQLite's
/// default busy timeout so neither wait outlasts the other.
pub const POOL_WAIT: Duration = Duration::from_secs(5);

/// Pooled SQLite store. Clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open(path: &Path, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(POOL_WAIT)
            .build(manager)?;

        {
            let conn = pool.get()?;
            // WAL is persistent, one connection is enough
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            migrations::run(&conn)?;
        }

        info!("Database opened at {} (pool of {})", path.display(), pool_size);
        Ok(Self { pool })
    }

    /// Borrow a connection from the pool. Blocks until one is free.
    pub fn connection(&self) -> Result<PooledConn> {
        Ok(self.pool.get()?)
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection()?;
        f(&*conn)
    }

    /// Run `f` inside one transaction: commit on `Ok`, roll back on `Err`
    /// or panic.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut conn = self.connection()?;
        in_transaction(&mut conn, f)
    }

    /// Async form of [`Database::with_conn`]. Runs on the blocking pool; if the
    /// returned future is dropped, the in-flight statement is interrupted.
    pub async fn run<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        self.spawn(move |conn| f(conn)).await
    }

    /// Async form of [`Database::with_transaction`], with the same
    /// cancellation behavior as [`Database::run`].
    pub async fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        self.spawn(move |conn| in_transaction(conn, f)).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn spawn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let inflight = Arc::new(Mutex::new(Inflight::default()));
        let guard = CancelOnDrop {
            inflight: inflight.clone(),
            armed: true,
        };

        let joined = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(DbError::from)?;
            {
                let mut slot = lock(&inflight);
                if slot.cancelled {
                    return Err(DbError::Cancelled.into());
                }
                slot.handle = Some(conn.get_interrupt_handle());
            }

            let result = f(&mut *conn);

            // Clear before the connection goes back to the pool so a late
            // interrupt can't hit the next borrower.
            lock(&inflight).handle = None;
            result
        })
        .await;

        guard.disarm();
        match joined {
            Ok(result) => result,
            Err(e) => Err(DbError::from(e).into()),
        }
    }
}

fn in_transaction<F, T, E>(conn: &mut Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    // IMMEDIATE takes the write lock up front, so concurrent writers queue on
    // the busy timeout instead of failing on a stale snapshot.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DbError::from)?;
    let out = f(&tx)?;
    tx.commit().map_err(DbError::from)?;
    Ok(out)
}

#[derive(Default)]
struct Inflight {
    handle: Option<InterruptHandle>,
    cancelled: bool,
}

fn lock(inflight: &Mutex<Inflight>) -> MutexGuard<'_, Inflight> {
    inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Interrupts the borrowed connection if the awaiting future is dropped.
struct CancelOnDrop {
    inflight: Arc<Mutex<Inflight>>,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = lock(&self.inflight);
        slot.cancelled = true;
        if let Some(handle) = slot.handle.as_ref() {
            debug!("Caller dropped; interrupting in-flight query");
            handle.interrupt();
        }
    }
}

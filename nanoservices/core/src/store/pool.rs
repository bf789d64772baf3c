use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to open connection to {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("operation on {target} exceeded its deadline of {deadline:?}")]
    Timeout { target: String, deadline: Duration },
    #[error("pool worker failed: {0}")]
    Worker(String),
}

type Opener = Box<dyn Fn() -> rusqlite::Result<Connection> + Send + Sync>;

/// Bounded set of SQLite connections shared by concurrently running assets.
///
/// Connections are opened lazily, so an unreachable database surfaces as an
/// error on first use rather than at construction. Each checkout owns its
/// connection exclusively and runs on the blocking thread pool.
pub struct SqlitePool {
    target: String,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    open: Opener,
}

impl SqlitePool {
    pub fn new(
        target: impl Into<String>,
        size: usize,
        open: impl Fn() -> rusqlite::Result<Connection> + Send + Sync + 'static,
    ) -> Self {
        Self {
            target: target.into(),
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(size.max(1))),
            open: Box::new(open),
        }
    }

    /// Pool over a database file. Read-only pools never create the file.
    pub fn file(path: impl Into<PathBuf>, size: usize, read_only: bool, busy_timeout: Duration) -> Self {
        let path = path.into();
        let target = path.display().to_string();
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI
        };
        Self::new(target, size, move || {
            let conn = Connection::open_with_flags(&path, flags)?;
            conn.busy_timeout(busy_timeout)?;
            Ok(conn)
        })
    }

    /// Single private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(":memory:", 1, Connection::open_in_memory)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Checkouts that could start right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `f` on a pooled connection. A deadline interrupts the statement
    /// in flight and discards that connection. The checkout is held until the
    /// blocking work returns, even after a deadline.
    pub async fn run<T, E, F>(&self, deadline: Option<Duration>, f: F) -> Result<Result<T, E>, PoolError>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PoolError::Worker(e.to_string()))?;

        let conn = match self.checkout() {
            Some(conn) => conn,
            None => (self.open)().map_err(|source| PoolError::Open {
                target: self.target.clone(),
                source,
            })?,
        };
        let interrupt = conn.get_interrupt_handle();

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut conn = conn;
            let result = f(&mut conn);
            (conn, result)
        });

        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    interrupt.interrupt();
                    return Err(PoolError::Timeout {
                        target: self.target.clone(),
                        deadline,
                    });
                }
            },
            None => task.await,
        };

        let (conn, result) = joined.map_err(|e| PoolError::Worker(e.to_string()))?;
        self.checkin(conn);
        Ok(result)
    }

    fn checkout(&self) -> Option<Connection> {
        self.idle.lock().ok()?.pop()
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }
}

//! The engine handle: one SQLite connection, the clock every rule is checked
//! against, and the lending policy. Operations live in `lending`, `catalog`
//! and `membership`; this module owns construction and the transaction
//! boundary they all run inside.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{AppConfig, LendingConfig};
use crate::db;
use crate::error::{LendingError, LendingResult};

pub struct LendingEngine {
    pub(crate) conn: Connection,
    clock: Box<dyn Clock>,
    pub(crate) policy: LendingConfig,
}

impl LendingEngine {
    /// Wrap an already migrated connection.
    pub fn new(conn: Connection, clock: impl Clock + 'static, policy: LendingConfig) -> Self {
        Self {
            conn,
            clock: Box::new(clock),
            policy,
        }
    }

    /// Open the configured database file (or the default one under the home
    /// directory) and build an engine on top of it.
    pub fn open(config: &AppConfig, clock: impl Clock + 'static) -> Result<Self> {
        let path = match &config.database.path {
            Some(path) => path.clone(),
            None => db::default_database_path()?,
        };
        let timeout = Duration::from_millis(config.database.busy_timeout_ms);
        let conn = db::open(&path, timeout)
            .with_context(|| format!("failed to open library at {}", path.display()))?;
        Ok(Self::new(conn, clock, config.lending.clone()))
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// The underlying store connection. Writes made through it bypass the
    /// engine's transaction and retry handling.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `work` inside one `BEGIN IMMEDIATE` transaction. The write lock is
    /// taken before the first read, so a read-modify-write sequence cannot
    /// interleave with another writer. Any error rolls the whole transaction
    /// back; `Conflict` is retried up to `max_conflict_retries` times with a
    /// fresh transaction before it reaches the caller.
    pub(crate) fn transact<T, F>(&mut self, operation: &'static str, mut work: F) -> LendingResult<T>
    where
        F: FnMut(&Transaction<'_>, NaiveDate) -> LendingResult<T>,
    {
        let today = self.clock.today();
        let mut attempt = 0;

        loop {
            match run_once(&mut self.conn, today, &mut work) {
                Err(LendingError::Conflict(reason)) if attempt < self.policy.max_conflict_retries => {
                    attempt += 1;
                    warn!(operation, attempt, %reason, "write conflict, retrying");
                }
                Err(err) => {
                    debug!(operation, error = %err, "transaction rolled back");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

fn run_once<T, F>(conn: &mut Connection, today: NaiveDate, work: &mut F) -> LendingResult<T>
where
    F: FnMut(&Transaction<'_>, NaiveDate) -> LendingResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = work(&tx, today)?;
    tx.commit()?;
    Ok(value)
}

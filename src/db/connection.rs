use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use rusqlite::Connection;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-lending";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "library.sqlite";

/// Open (creating if needed) the database file at `path`, switch it to WAL
/// journaling so readers do not block the single writer, and run the lazy
/// migrations.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("failed to create data directory")?;
        }
    }

    let conn = Connection::open(path).context("failed to open SQLite database")?;
    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .context("failed to enable WAL journaling")?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");

    ensure_schema(&conn)?;
    Ok(conn)
}

/// A private in-memory database with the full schema, used by tests and
/// throwaway sessions.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Run the lazy migrations on an open connection. The function also toggles
/// `PRAGMA foreign_keys = ON` so loans can only point at existing members and
/// books, and the `CHECK` clauses keep `0 <= available_copies <= total_copies`
/// true for every stored row.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign keys")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            isbn TEXT NOT NULL UNIQUE,
            publication_date TEXT NOT NULL,
            description TEXT,
            genre TEXT NOT NULL,
            total_copies INTEGER NOT NULL CHECK (total_copies >= 0),
            available_copies INTEGER NOT NULL
                CHECK (available_copies >= 0 AND available_copies <= total_copies),
            version INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )
    .context("failed to create books table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            membership_type TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )
    .context("failed to create members table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS loans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL,
            book_id INTEGER NOT NULL,
            loan_date TEXT NOT NULL,
            due_date TEXT NOT NULL,
            return_date TEXT,
            status TEXT NOT NULL
                CHECK (status IN ('BORROWED', 'RETURNED', 'OVERDUE', 'LOST')),
            notes TEXT,
            FOREIGN KEY(member_id) REFERENCES members(id) ON DELETE CASCADE,
            FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE
        )",
        [],
    )
    .context("failed to create loans table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_loans_member ON loans(member_id)",
        [],
    )
    .context("failed to create member loan index")?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_loans_book ON loans(book_id)", [])
        .context("failed to create book loan index")?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_loans_due ON loans(due_date)", [])
        .context("failed to create due date index")?;

    Ok(())
}

/// Resolve the absolute path to the SQLite database inside the user's home.
pub fn default_database_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('books', 'members', 'loans')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn store_rejects_more_available_than_owned() {
        let conn = open_in_memory().unwrap();
        let result = conn.execute(
            "INSERT INTO books (title, author, isbn, publication_date, genre, total_copies, available_copies)
             VALUES ('T', 'A', 'isbn', '2000-01-01', 'G', 1, 2)",
            [],
        );
        assert!(result.is_err());
    }
}

//! Persistence module split across logical submodules: one store per entity
//! plus the connection and migration helpers. Every store function takes a
//! plain `&Connection`, so the engine can hand in an open transaction and
//! scope a whole read-modify-write sequence inside it.

mod books;
mod connection;
mod loans;
mod members;

use rusqlite::ffi;

use crate::error::LendingError;

pub use books::{
    delete_book, fetch_available_books, fetch_book, fetch_books, fetch_books_by_author,
    fetch_books_by_genre, find_book_by_isbn, insert_book, search_books, update_book,
};
pub use connection::{default_database_path, ensure_schema, open, open_in_memory};
pub use loans::{
    count_outstanding_loans_for_member, fetch_current_loans_by_member, fetch_loan, fetch_loans,
    fetch_loans_by_book, fetch_loans_by_member, fetch_loans_by_status, fetch_loans_due_between,
    fetch_overdue_loans, insert_loan, set_loan_status, update_loan,
};
pub use members::{
    delete_member, fetch_active_members, fetch_member, fetch_members, find_member_by_email,
    find_member_by_username, insert_member, search_members, update_member,
};

/// Coerce SQLite constraint errors into domain errors. A `UNIQUE` failure
/// becomes `Duplicate` with the caller's message and a `CHECK` failure (the
/// copy-count bounds) becomes `InvariantViolation`; everything else passes
/// through the regular conversion.
fn map_constraint(err: rusqlite::Error, duplicate: impl FnOnce() -> String) -> LendingError {
    let extended = err.sqlite_error().map(|e| e.extended_code);
    match extended {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => LendingError::Duplicate(duplicate()),
        Some(ffi::SQLITE_CONSTRAINT_CHECK) => {
            LendingError::InvariantViolation(format!("store rejected row: {err}"))
        }
        _ => err.into(),
    }
}

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{LendingError, LendingResult};
use crate::models::{Loan, LoanStatus, NewLoan};

const LOAN_COLUMNS: &str =
    "id, member_id, book_id, loan_date, due_date, return_date, status, notes";

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: row.get(0)?,
        member_id: row.get(1)?,
        book_id: row.get(2)?,
        loan_date: row.get(3)?,
        due_date: row.get(4)?,
        return_date: row.get(5)?,
        status: row.get(6)?,
        notes: row.get(7)?,
    })
}

fn query_loans<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> LendingResult<Vec<Loan>> {
    let sql = format!("SELECT {LOAN_COLUMNS} FROM loans {filter} ORDER BY due_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let loans = stmt
        .query_map(params, loan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(loans)
}

pub fn fetch_loan(conn: &Connection, id: i64) -> LendingResult<Loan> {
    conn.query_row(
        &format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = ?1"),
        [id],
        loan_from_row,
    )
    .optional()?
    .ok_or_else(|| LendingError::NotFound(format!("Loan not found with ID: {id}")))
}

pub fn fetch_loans(conn: &Connection) -> LendingResult<Vec<Loan>> {
    query_loans(conn, "", [])
}

/// Full history for one member, returned loans included.
pub fn fetch_loans_by_member(conn: &Connection, member_id: i64) -> LendingResult<Vec<Loan>> {
    query_loans(conn, "WHERE member_id = ?1", [member_id])
}

/// Full history for one book, returned loans included.
pub fn fetch_loans_by_book(conn: &Connection, book_id: i64) -> LendingResult<Vec<Loan>> {
    query_loans(conn, "WHERE book_id = ?1", [book_id])
}

pub fn fetch_loans_by_status(conn: &Connection, status: LoanStatus) -> LendingResult<Vec<Loan>> {
    query_loans(conn, "WHERE status = ?1", [status])
}

/// Loans a member currently holds. A stored `OVERDUE` is a legacy marker for
/// an open loan, so it counts alongside `BORROWED`.
pub fn fetch_current_loans_by_member(conn: &Connection, member_id: i64) -> LendingResult<Vec<Loan>> {
    query_loans(
        conn,
        "WHERE member_id = ?1 AND status IN ('BORROWED', 'OVERDUE')",
        [member_id],
    )
}

/// Overdue is derived from the dates: still out and due before `today`. The
/// stored status plays no part.
pub fn fetch_overdue_loans(conn: &Connection, today: NaiveDate) -> LendingResult<Vec<Loan>> {
    query_loans(conn, "WHERE return_date IS NULL AND due_date < ?1", [today])
}

/// Loans whose due date falls within `[start, end]`, both ends inclusive.
pub fn fetch_loans_due_between(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> LendingResult<Vec<Loan>> {
    query_loans(conn, "WHERE due_date BETWEEN ?1 AND ?2", [start, end])
}

/// Loans the member has not brought back yet, lost ones included.
pub fn count_outstanding_loans_for_member(conn: &Connection, member_id: i64) -> LendingResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM loans WHERE member_id = ?1 AND return_date IS NULL",
        [member_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn insert_loan(conn: &Connection, loan: &NewLoan) -> LendingResult<Loan> {
    conn.execute(
        "INSERT INTO loans (member_id, book_id, loan_date, due_date, return_date, status, notes)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL)",
        params![
            loan.member_id,
            loan.book_id,
            loan.loan_date,
            loan.due_date,
            loan.status,
        ],
    )?;

    Ok(Loan {
        id: conn.last_insert_rowid(),
        member_id: loan.member_id,
        book_id: loan.book_id,
        loan_date: loan.loan_date,
        due_date: loan.due_date,
        return_date: None,
        status: loan.status,
        notes: None,
    })
}

/// Write back the mutable part of a loan. Member and book references are set
/// at creation and never reassigned, so they are not part of the update.
pub fn update_loan(conn: &Connection, loan: &Loan) -> LendingResult<()> {
    let updated = conn.execute(
        "UPDATE loans SET due_date = ?1, return_date = ?2, status = ?3, notes = ?4 WHERE id = ?5",
        params![loan.due_date, loan.return_date, loan.status, loan.notes, loan.id],
    )?;

    if updated == 0 {
        Err(LendingError::NotFound(format!("Loan not found with ID: {}", loan.id)))
    } else {
        Ok(())
    }
}

/// Status-only write, used to re-assert a terminal status after the full row
/// has been saved.
pub fn set_loan_status(conn: &Connection, id: i64, status: LoanStatus) -> LendingResult<()> {
    let updated = conn.execute(
        "UPDATE loans SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;

    if updated == 0 {
        Err(LendingError::NotFound(format!("Loan not found with ID: {id}")))
    } else {
        Ok(())
    }
}

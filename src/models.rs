//! Domain models that mirror the SQLite schema and get passed between the
//! stores and the lending engine. They stay plain data holders; the engine
//! only keeps them for the duration of one transaction and the stores remain
//! the source of truth.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A catalog title together with its copy counts.
pub struct Book {
    /// Primary key assigned by the catalog store.
    pub id: i64,
    pub title: String,
    pub author: String,
    /// Globally unique across the catalog.
    pub isbn: String,
    /// Never later than the day the record was written.
    pub publication_date: NaiveDate,
    pub description: Option<String>,
    pub genre: String,
    /// Copies the library owns.
    pub total_copies: u32,
    /// Copies currently on the shelf. Always `<= total_copies`.
    pub available_copies: u32,
    /// Optimistic concurrency token, bumped by every write to the row.
    pub version: i64,
}

impl Book {
    /// Number of copies currently out on loan.
    pub fn on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} by {} [{}] {}/{} available",
            self.id, self.title, self.author, self.isbn, self.available_copies, self.total_copies
        )
    }
}

/// Fields accepted when adding a title to the catalog.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_date: NaiveDate,
    pub description: Option<String>,
    pub genre: String,
    pub total_copies: u32,
    /// Defaults to `total_copies` when omitted or zero.
    pub available_copies: Option<u32>,
}

/// Full replacement of a book's editable fields. The available count is not
/// part of it: it is recomputed from the new total and the copies on loan.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_date: NaiveDate,
    pub description: Option<String>,
    pub genre: String,
    pub total_copies: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A library member allowed to borrow while `active`.
pub struct Member {
    pub id: i64,
    pub name: String,
    /// Unique across members.
    pub email: String,
    pub phone: Option<String>,
    /// Unique across members.
    pub username: String,
    pub password: String,
    pub membership_type: String,
    /// Inactive members keep their loans but cannot start new ones.
    pub active: bool,
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "inactive" };
        write!(
            f,
            "#{} {} ({}, {}) {} {}",
            self.id, self.name, self.username, self.email, self.membership_type, state
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub username: String,
    pub password: String,
    pub membership_type: String,
    pub active: bool,
}

/// Replacement values for a member. An absent or empty password keeps the
/// stored one.
#[derive(Debug, Clone)]
pub struct MemberUpdate {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub membership_type: String,
    pub active: bool,
}

/// Persisted loan status. `Overdue` is only ever read back from rows written
/// by older tooling: overdue is derived from the dates at query time and the
/// engine never stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoanStatus {
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "BORROWED",
            LoanStatus::Returned => "RETURNED",
            LoanStatus::Overdue => "OVERDUE",
            LoanStatus::Lost => "LOST",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BORROWED" => Ok(LoanStatus::Borrowed),
            "RETURNED" => Ok(LoanStatus::Returned),
            "OVERDUE" => Ok(LoanStatus::Overdue),
            "LOST" => Ok(LoanStatus::Lost),
            other => Err(format!("unknown loan status: {other}")),
        }
    }
}

impl ToSql for LoanStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LoanStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err: String| FromSqlError::Other(err.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One member borrowing one copy of one book. Loans are never deleted by the
/// engine; they stay behind as history once closed.
pub struct Loan {
    pub id: i64,
    pub member_id: i64,
    pub book_id: i64,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Set exactly when the loan is returned.
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    /// Free-text audit trail, one line per event.
    pub notes: Option<String>,
}

impl Loan {
    /// Derived overdue flag: still out and past its due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.return_date.is_none() && today > self.due_date
    }

    /// Append one line to the notes, starting them if empty.
    pub fn append_note(&mut self, line: impl AsRef<str>) {
        match self.notes.as_mut() {
            Some(notes) if !notes.is_empty() => {
                notes.push('\n');
                notes.push_str(line.as_ref());
            }
            _ => self.notes = Some(line.as_ref().to_string()),
        }
    }
}

impl fmt::Display for Loan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loan #{} member #{} book #{} {} due {}",
            self.id, self.member_id, self.book_id, self.status, self.due_date
        )?;
        if let Some(returned) = self.return_date {
            write!(f, " returned {returned}")?;
        }
        Ok(())
    }
}

/// Values for a loan row that has not been inserted yet.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub member_id: i64,
    pub book_id: i64,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_loan(due: NaiveDate) -> Loan {
        Loan {
            id: 1,
            member_id: 1,
            book_id: 1,
            loan_date: date(2024, 1, 1),
            due_date: due,
            return_date: None,
            status: LoanStatus::Borrowed,
            notes: None,
        }
    }

    #[test]
    fn overdue_is_derived_from_dates() {
        let mut loan = open_loan(date(2024, 1, 15));
        assert!(!loan.is_overdue(date(2024, 1, 15)));
        assert!(loan.is_overdue(date(2024, 1, 16)));

        loan.return_date = Some(date(2024, 1, 20));
        assert!(!loan.is_overdue(date(2024, 2, 1)));
    }

    #[test]
    fn notes_accumulate_one_line_per_event() {
        let mut loan = open_loan(date(2024, 1, 15));
        loan.append_note("first");
        loan.append_note("second");
        assert_eq!(loan.notes.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("lost".parse::<LoanStatus>(), Ok(LoanStatus::Lost));
        assert_eq!(" Borrowed ".parse::<LoanStatus>(), Ok(LoanStatus::Borrowed));
        assert!("gone".parse::<LoanStatus>().is_err());
    }
}

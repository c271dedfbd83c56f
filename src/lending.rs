//! Loan lifecycle: borrow, return, renew and lost reports, plus the loan
//! queries. Per loan the only transitions are
//! `BORROWED -> RETURNED`, `BORROWED -> LOST` and the renewal self-transition
//! `BORROWED -> BORROWED`; each one and its copy-count change commit together.

use chrono::{Days, NaiveDate};
use tracing::{error, info, warn};

use crate::db;
use crate::engine::LendingEngine;
use crate::error::{LendingError, LendingResult};
use crate::inventory;
use crate::models::{Loan, LoanStatus, NewLoan};

/// `date` moved `days` forward, or a validation error past the last
/// representable date.
fn days_after(date: NaiveDate, days: u32) -> LendingResult<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| LendingError::Validation(format!("Date out of range: {date} + {days} days")))
}

/// Refuse to touch a loan that is already closed.
fn ensure_open(loan: &Loan, returned: &str, lost: &str) -> LendingResult<()> {
    if let Some(date) = loan.return_date {
        error!(loan_id = loan.id, returned_on = %date, "{returned}");
        return Err(LendingError::InvalidState(format!("{returned} (returned on {date})")));
    }
    if loan.status == LoanStatus::Lost {
        error!(loan_id = loan.id, "{lost}");
        return Err(LendingError::InvalidState(lost.to_string()));
    }
    Ok(())
}

impl LendingEngine {
    /// Lend one copy of `book_id` to `member_id`. The due date defaults to
    /// today plus the configured loan period.
    pub fn borrow(
        &mut self,
        member_id: i64,
        book_id: i64,
        due_date: Option<NaiveDate>,
    ) -> LendingResult<Loan> {
        info!(member_id, book_id, "Processing loan");
        let loan_period = self.policy.loan_period_days;

        let loan = self.transact("borrow", |tx, today| {
            let member = db::fetch_member(tx, member_id)?;
            if !member.active {
                error!(username = %member.username, "User account is inactive");
                return Err(LendingError::InvalidState(
                    "Cannot borrow books with an inactive account".to_string(),
                ));
            }

            let mut book = db::fetch_book(tx, book_id)?;
            if !inventory::is_available(&book) {
                error!(title = %book.title, "Book is not available for borrowing");
                return Err(LendingError::InvalidState(format!(
                    "Book is not available for borrowing: {}",
                    book.title
                )));
            }

            let due_date = match due_date {
                Some(date) => date,
                None => days_after(today, loan_period)?,
            };
            if due_date < today {
                return Err(LendingError::Validation(format!(
                    "Due date {due_date} is before the loan date {today}"
                )));
            }

            book.available_copies -= 1;
            inventory::check_copy_counts(&book)?;
            db::update_book(tx, &book)?;

            db::insert_loan(
                tx,
                &NewLoan {
                    member_id,
                    book_id,
                    loan_date: today,
                    due_date,
                    status: LoanStatus::Borrowed,
                },
            )
        })?;

        info!(loan_id = loan.id, member_id, book_id, due = %loan.due_date, "Book borrowed successfully");
        Ok(loan)
    }

    /// Close a loan and put its copy back on the shelf. Whatever status was
    /// stored before (a legacy `OVERDUE` included) becomes `RETURNED`. The loan
    /// handed back is re-read from the store after the commit.
    pub fn return_loan(&mut self, loan_id: i64) -> LendingResult<Loan> {
        info!(loan_id, "Processing book return");

        self.transact("return", |tx, today| {
            let mut loan = db::fetch_loan(tx, loan_id)?;
            ensure_open(&loan, "Book already returned", "Cannot return a book reported lost")?;

            loan.return_date = Some(today);
            loan.status = LoanStatus::Returned;
            if today > loan.due_date {
                let days_late = (today - loan.due_date).num_days();
                loan.append_note(format!("Returned {days_late} days late"));
            }

            let mut book = db::fetch_book(tx, loan.book_id)?;
            book.available_copies += 1;
            inventory::check_copy_counts(&book)?;
            db::update_book(tx, &book)?;

            db::update_loan(tx, &loan)?;
            db::set_loan_status(tx, loan.id, LoanStatus::Returned)?;
            Ok(())
        })?;

        let loan = db::fetch_loan(&self.conn, loan_id)?;
        if loan.status != LoanStatus::Returned || loan.return_date.is_none() {
            return Err(LendingError::Conflict(format!(
                "Loan {loan_id} reads back as {} after return",
                loan.status
            )));
        }

        info!(loan_id, book_id = loan.book_id, "Book returned, status set to RETURNED");
        Ok(loan)
    }

    /// Push the due date out. Without an explicit date the loan is extended
    /// by the renewal period from its current due date. Overdue loans must be
    /// returned instead.
    pub fn renew(&mut self, loan_id: i64, new_due_date: Option<NaiveDate>) -> LendingResult<Loan> {
        info!(loan_id, "Renewing loan");
        let renewal_period = self.policy.renewal_period_days;

        let loan = self.transact("renew", |tx, today| {
            let mut loan = db::fetch_loan(tx, loan_id)?;
            ensure_open(&loan, "Cannot renew a returned loan", "Cannot renew a lost loan")?;

            if loan.is_overdue(today) {
                error!(loan_id, due = %loan.due_date, "Cannot renew an overdue loan");
                return Err(LendingError::InvalidState(
                    "Cannot renew an overdue loan. Please return the book first".to_string(),
                ));
            }

            let new_due_date = match new_due_date {
                Some(date) => date,
                None => days_after(loan.due_date, renewal_period)?,
            };
            if new_due_date < today {
                return Err(LendingError::Validation(format!(
                    "Renewal date {new_due_date} is in the past"
                )));
            }

            loan.due_date = new_due_date;
            loan.append_note(format!("Loan renewed until: {new_due_date}"));
            db::update_loan(tx, &loan)?;
            db::fetch_loan(tx, loan_id)
        })?;

        info!(loan_id, due = %loan.due_date, "Loan renewed successfully");
        Ok(loan)
    }

    /// Mark the loaned copy as gone for good. The owned count drops by one and
    /// the available count stays where it is: the copy never comes back.
    pub fn report_lost(&mut self, loan_id: i64) -> LendingResult<()> {
        info!(loan_id, "Reporting book as lost");

        let (title, member_id) = self.transact("report_lost", |tx, today| {
            let mut loan = db::fetch_loan(tx, loan_id)?;
            ensure_open(
                &loan,
                "Cannot report a returned book as lost",
                "Book already reported lost",
            )?;

            loan.status = LoanStatus::Lost;
            loan.append_note(format!("Book reported lost on: {today}"));

            let mut book = db::fetch_book(tx, loan.book_id)?;
            book.total_copies = book.total_copies.checked_sub(1).ok_or_else(|| {
                LendingError::InvariantViolation(format!("Book {} has no copies to lose", book.id))
            })?;
            inventory::check_copy_counts(&book)?;
            db::update_book(tx, &book)?;

            db::update_loan(tx, &loan)?;
            db::set_loan_status(tx, loan.id, LoanStatus::Lost)?;
            Ok((book.title, loan.member_id))
        })?;

        warn!(loan_id, member_id, %title, "Book reported lost");
        Ok(())
    }

    pub fn loan(&self, loan_id: i64) -> LendingResult<Loan> {
        db::fetch_loan(&self.conn, loan_id)
    }

    pub fn loans(&self) -> LendingResult<Vec<Loan>> {
        db::fetch_loans(&self.conn)
    }

    /// Every loan a member ever took out.
    pub fn loans_by_member(&self, member_id: i64) -> LendingResult<Vec<Loan>> {
        db::fetch_member(&self.conn, member_id)?;
        db::fetch_loans_by_member(&self.conn, member_id)
    }

    /// Loans the member still holds.
    pub fn current_loans_by_member(&self, member_id: i64) -> LendingResult<Vec<Loan>> {
        db::fetch_member(&self.conn, member_id)?;
        db::fetch_current_loans_by_member(&self.conn, member_id)
    }

    pub fn loans_by_book(&self, book_id: i64) -> LendingResult<Vec<Loan>> {
        db::fetch_loans_by_book(&self.conn, book_id)
    }

    pub fn loans_by_status(&self, status: LoanStatus) -> LendingResult<Vec<Loan>> {
        db::fetch_loans_by_status(&self.conn, status)
    }

    /// Loans still out past their due date, derived from the dates.
    pub fn overdue_loans(&self) -> LendingResult<Vec<Loan>> {
        db::fetch_overdue_loans(&self.conn, self.today())
    }

    /// Loans due between today and `days` from now, inclusive.
    pub fn loans_due_soon(&self, days: u32) -> LendingResult<Vec<Loan>> {
        let today = self.today();
        let until = days_after(today, days)?;
        db::fetch_loans_due_between(&self.conn, today, until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use crate::clock::MockClock;
    use crate::config::LendingConfig;
    use crate::models::{NewBook, NewMember};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Engine pinned to `today` with one member and one book already stored.
    fn engine_on(today: NaiveDate, active: bool, copies: u32) -> (LendingEngine, i64, i64) {
        let mut clock = MockClock::new();
        clock.expect_today().return_const(today);
        let conn = db::open_in_memory().unwrap();

        let member = db::insert_member(
            &conn,
            &NewMember {
                name: "Octavia Butler".to_string(),
                email: "octavia@example.org".to_string(),
                phone: None,
                username: "obutler".to_string(),
                password: "kindred".to_string(),
                membership_type: "PREMIUM".to_string(),
                active,
            },
        )
        .unwrap();
        let book = db::insert_book(
            &conn,
            &NewBook {
                title: "Parable of the Sower".to_string(),
                author: "Octavia E. Butler".to_string(),
                isbn: "978-0446675505".to_string(),
                publication_date: date(1993, 10, 1),
                description: None,
                genre: "Science Fiction".to_string(),
                total_copies: copies,
                available_copies: None,
            },
            copies,
        )
        .unwrap();

        let engine = LendingEngine::new(conn, clock, LendingConfig::default());
        (engine, member.id, book.id)
    }

    fn insert_past_loan(engine: &LendingEngine, member: i64, book: i64, due: NaiveDate) -> Loan {
        let mut shelf = db::fetch_book(engine.connection(), book).unwrap();
        shelf.available_copies -= 1;
        db::update_book(engine.connection(), &shelf).unwrap();
        db::insert_loan(
            engine.connection(),
            &NewLoan {
                member_id: member,
                book_id: book,
                loan_date: due - TimeDelta::days(14),
                due_date: due,
                status: LoanStatus::Borrowed,
            },
        )
        .unwrap()
    }

    #[test]
    fn borrow_defaults_due_date_and_takes_a_copy() {
        let today = date(2024, 6, 1);
        let (mut engine, member, book) = engine_on(today, true, 3);

        let loan = engine.borrow(member, book, None).unwrap();

        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(loan.loan_date, today);
        assert_eq!(loan.due_date, date(2024, 6, 15));
        assert_eq!(db::fetch_book(engine.connection(), book).unwrap().available_copies, 2);
    }

    #[test]
    fn inactive_member_cannot_borrow() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), false, 1);

        assert!(matches!(
            engine.borrow(member, book, None),
            Err(LendingError::InvalidState(_))
        ));
        assert_eq!(db::fetch_book(engine.connection(), book).unwrap().available_copies, 1);
        assert!(engine.loans().unwrap().is_empty());
    }

    #[test]
    fn missing_member_or_book_is_not_found() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 1);

        assert!(matches!(engine.borrow(99, book, None), Err(LendingError::NotFound(_))));
        assert!(matches!(engine.borrow(member, 99, None), Err(LendingError::NotFound(_))));
    }

    #[test]
    fn last_copy_can_only_go_out_once() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 1);

        engine.borrow(member, book, None).unwrap();
        assert!(matches!(
            engine.borrow(member, book, None),
            Err(LendingError::InvalidState(_))
        ));
        assert_eq!(engine.loans().unwrap().len(), 1);
    }

    #[test]
    fn due_date_before_loan_date_is_rejected() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 1);
        assert!(matches!(
            engine.borrow(member, book, Some(date(2024, 5, 31))),
            Err(LendingError::Validation(_))
        ));
    }

    #[test]
    fn late_return_records_days_late_and_overrides_stale_status() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 10), true, 2);
        let loan = insert_past_loan(&engine, member, book, date(2024, 6, 3));
        db::set_loan_status(engine.connection(), loan.id, LoanStatus::Overdue).unwrap();

        let returned = engine.return_loan(loan.id).unwrap();

        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(returned.return_date, Some(date(2024, 6, 10)));
        assert_eq!(returned.notes.as_deref(), Some("Returned 7 days late"));
        assert_eq!(db::fetch_book(engine.connection(), book).unwrap().available_copies, 2);
    }

    #[test]
    fn renewing_an_overdue_loan_is_refused() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 10), true, 1);
        let loan = insert_past_loan(&engine, member, book, date(2024, 6, 9));

        assert!(matches!(engine.renew(loan.id, None), Err(LendingError::InvalidState(_))));
        assert_eq!(engine.loan(loan.id).unwrap().due_date, date(2024, 6, 9));
    }

    #[test]
    fn renewal_on_the_due_date_is_still_allowed() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 10), true, 1);
        let loan = insert_past_loan(&engine, member, book, date(2024, 6, 10));

        let renewed = engine.renew(loan.id, Some(date(2024, 7, 1))).unwrap();
        assert_eq!(renewed.due_date, date(2024, 7, 1));
        assert_eq!(renewed.notes.as_deref(), Some("Loan renewed until: 2024-07-01"));
        assert_eq!(renewed.status, LoanStatus::Borrowed);
    }

    #[test]
    fn lost_copy_leaves_circulation() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 2);
        let loan = engine.borrow(member, book, None).unwrap();

        engine.report_lost(loan.id).unwrap();

        let shelf = db::fetch_book(engine.connection(), book).unwrap();
        assert_eq!((shelf.total_copies, shelf.available_copies), (1, 1));
        let lost = engine.loan(loan.id).unwrap();
        assert_eq!(lost.status, LoanStatus::Lost);
        assert_eq!(lost.return_date, None);
        assert_eq!(lost.notes.as_deref(), Some("Book reported lost on: 2024-06-01"));
    }

    #[test]
    fn lost_loans_are_closed_for_lending() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 1);
        let loan = engine.borrow(member, book, None).unwrap();
        engine.report_lost(loan.id).unwrap();

        assert!(matches!(engine.return_loan(loan.id), Err(LendingError::InvalidState(_))));
        assert!(matches!(engine.renew(loan.id, None), Err(LendingError::InvalidState(_))));
        assert!(matches!(engine.report_lost(loan.id), Err(LendingError::InvalidState(_))));

        let shelf = db::fetch_book(engine.connection(), book).unwrap();
        assert_eq!((shelf.total_copies, shelf.available_copies), (0, 0));
    }

    #[test]
    fn returned_loan_cannot_be_reported_lost() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 1);
        let loan = engine.borrow(member, book, None).unwrap();
        engine.return_loan(loan.id).unwrap();

        assert!(matches!(engine.report_lost(loan.id), Err(LendingError::InvalidState(_))));
        assert_eq!(db::fetch_book(engine.connection(), book).unwrap().total_copies, 1);
    }

    #[test]
    fn date_arithmetic_past_the_calendar_end_is_rejected() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 1), true, 1);

        assert!(matches!(engine.loans_due_soon(u32::MAX), Err(LendingError::Validation(_))));

        let loan = engine.borrow(member, book, Some(NaiveDate::MAX)).unwrap();
        assert!(matches!(engine.renew(loan.id, None), Err(LendingError::Validation(_))));
        assert_eq!(engine.loan(loan.id).unwrap().due_date, NaiveDate::MAX);
        assert_eq!(engine.loan(loan.id).unwrap().notes, None);
    }

    #[test]
    fn default_due_date_past_the_calendar_end_is_rejected() {
        let (mut engine, member, book) = engine_on(NaiveDate::MAX, true, 1);

        assert!(matches!(engine.borrow(member, book, None), Err(LendingError::Validation(_))));
        assert_eq!(db::fetch_book(engine.connection(), book).unwrap().available_copies, 1);
        assert!(engine.loans().unwrap().is_empty());
    }

    #[test]
    fn queries_are_scoped_to_today() {
        let (mut engine, member, book) = engine_on(date(2024, 6, 10), true, 5);
        let overdue = insert_past_loan(&engine, member, book, date(2024, 6, 5));
        let due_today = insert_past_loan(&engine, member, book, date(2024, 6, 10));
        let due_later = engine.borrow(member, book, Some(date(2024, 6, 13))).unwrap();
        engine.borrow(member, book, None).unwrap();

        let ids = |loans: Vec<Loan>| loans.into_iter().map(|loan| loan.id).collect::<Vec<_>>();
        assert_eq!(ids(engine.overdue_loans().unwrap()), vec![overdue.id]);
        assert_eq!(
            ids(engine.loans_due_soon(3).unwrap()),
            vec![due_today.id, due_later.id]
        );
        assert_eq!(engine.current_loans_by_member(member).unwrap().len(), 4);
        assert!(matches!(
            engine.current_loans_by_member(42),
            Err(LendingError::NotFound(_))
        ));
    }
}

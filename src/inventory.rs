//! Copy-count arithmetic checks applied before any book mutation is written.
//! Pure functions: they look at a book and a proposed change, nothing else.

use crate::error::{LendingError, LendingResult};
use crate::models::Book;

/// Shrinking the owned copies below the number currently on loan would leave
/// borrowed copies with nowhere to come back to.
pub fn can_reduce_total_copies(book: &Book, new_total: u32) -> LendingResult<()> {
    let borrowed = book.on_loan();
    if new_total < borrowed {
        return Err(LendingError::InvariantViolation(format!(
            "Cannot reduce total copies below borrowed amount. {borrowed} copies are currently borrowed."
        )));
    }
    Ok(())
}

/// A book can only leave the catalog once every copy is back on the shelf.
pub fn can_delete(book: &Book) -> LendingResult<()> {
    if book.available_copies < book.total_copies {
        return Err(LendingError::InvariantViolation(format!(
            "Cannot delete '{}' with outstanding loans ({} of {} copies out)",
            book.title,
            book.on_loan(),
            book.total_copies
        )));
    }
    Ok(())
}

pub fn is_available(book: &Book) -> bool {
    book.available_copies > 0
}

/// `0 <= available_copies <= total_copies`, checked on the in-memory value
/// right before it is saved.
pub fn check_copy_counts(book: &Book) -> LendingResult<()> {
    if book.available_copies > book.total_copies {
        return Err(LendingError::InvariantViolation(format!(
            "Book {} would have {} available copies but only {} in total",
            book.id, book.available_copies, book.total_copies
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn book(total: u32, available: u32) -> Book {
        Book {
            id: 7,
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: "978-0441013593".to_string(),
            publication_date: NaiveDate::from_ymd_opt(1965, 8, 1).unwrap(),
            description: None,
            genre: "Science Fiction".to_string(),
            total_copies: total,
            available_copies: available,
            version: 0,
        }
    }

    #[test]
    fn total_may_shrink_down_to_the_borrowed_count() {
        let book = book(5, 2);
        assert!(can_reduce_total_copies(&book, 3).is_ok());
        assert!(matches!(
            can_reduce_total_copies(&book, 2),
            Err(LendingError::InvariantViolation(_))
        ));
    }

    #[test]
    fn delete_requires_every_copy_home() {
        assert!(can_delete(&book(3, 3)).is_ok());
        assert!(can_delete(&book(0, 0)).is_ok());
        assert!(matches!(can_delete(&book(3, 2)), Err(LendingError::InvariantViolation(_))));
    }

    #[test]
    fn availability_and_bounds() {
        assert!(is_available(&book(1, 1)));
        assert!(!is_available(&book(1, 0)));
        assert!(check_copy_counts(&book(2, 2)).is_ok());
        assert!(check_copy_counts(&book(1, 2)).is_err());
    }
}

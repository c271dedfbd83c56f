//! Catalog management: validated book writes guarded by the inventory checks.

use chrono::NaiveDate;
use tracing::{error, info};

use crate::db;
use crate::engine::LendingEngine;
use crate::error::{LendingError, LendingResult};
use crate::inventory;
use crate::models::{Book, BookUpdate, NewBook};

fn require(field: &str, value: &str) -> LendingResult<()> {
    if value.trim().is_empty() {
        Err(LendingError::Validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

fn validate_book(
    title: &str,
    author: &str,
    isbn: &str,
    genre: &str,
    publication_date: NaiveDate,
    today: NaiveDate,
) -> LendingResult<()> {
    require("Title", title)?;
    require("Author", author)?;
    require("ISBN", isbn)?;
    require("Genre", genre)?;
    if publication_date > today {
        return Err(LendingError::Validation(
            "Publication date cannot be in the future".to_string(),
        ));
    }
    Ok(())
}

impl LendingEngine {
    pub fn book(&self, id: i64) -> LendingResult<Book> {
        db::fetch_book(&self.conn, id)
    }

    pub fn book_by_isbn(&self, isbn: &str) -> LendingResult<Book> {
        db::find_book_by_isbn(&self.conn, isbn)?
            .ok_or_else(|| LendingError::NotFound(format!("Book not found with ISBN: {isbn}")))
    }

    pub fn books(&self) -> LendingResult<Vec<Book>> {
        db::fetch_books(&self.conn)
    }

    pub fn available_books(&self) -> LendingResult<Vec<Book>> {
        db::fetch_available_books(&self.conn)
    }

    pub fn books_by_author(&self, author: &str) -> LendingResult<Vec<Book>> {
        db::fetch_books_by_author(&self.conn, author)
    }

    pub fn books_by_genre(&self, genre: &str) -> LendingResult<Vec<Book>> {
        db::fetch_books_by_genre(&self.conn, genre)
    }

    pub fn search_books(&self, keyword: &str) -> LendingResult<Vec<Book>> {
        db::search_books(&self.conn, keyword)
    }

    /// Add a title to the catalog. With no (or a zero) available count every
    /// owned copy starts on the shelf.
    pub fn create_book(&mut self, book: NewBook) -> LendingResult<Book> {
        info!(title = %book.title, "Creating new book");
        validate_book(
            &book.title,
            &book.author,
            &book.isbn,
            &book.genre,
            book.publication_date,
            self.today(),
        )?;

        let available = match book.available_copies {
            None | Some(0) => book.total_copies,
            Some(available) => available,
        };
        if available > book.total_copies {
            return Err(LendingError::InvariantViolation(format!(
                "Available copies ({available}) exceed total copies ({})",
                book.total_copies
            )));
        }

        let created = self.transact("create_book", |tx, _| {
            if db::find_book_by_isbn(tx, &book.isbn)?.is_some() {
                error!(isbn = %book.isbn, "ISBN already exists");
                return Err(LendingError::Duplicate(format!("ISBN already exists: {}", book.isbn)));
            }
            db::insert_book(tx, &book, available)
        })?;

        info!(book_id = created.id, "Book created successfully");
        Ok(created)
    }

    /// Replace a book's details. The copies on loan stay on loan: the new
    /// available count is the new total minus what is currently borrowed.
    pub fn update_book(&mut self, id: i64, changes: BookUpdate) -> LendingResult<Book> {
        info!(book_id = id, "Updating book");
        validate_book(
            &changes.title,
            &changes.author,
            &changes.isbn,
            &changes.genre,
            changes.publication_date,
            self.today(),
        )?;

        let updated = self.transact("update_book", |tx, _| {
            let mut book = db::fetch_book(tx, id)?;

            if book.isbn != changes.isbn && db::find_book_by_isbn(tx, &changes.isbn)?.is_some() {
                error!(isbn = %changes.isbn, "ISBN already exists");
                return Err(LendingError::Duplicate(format!(
                    "ISBN already exists: {}",
                    changes.isbn
                )));
            }

            inventory::can_reduce_total_copies(&book, changes.total_copies)?;
            let borrowed = book.on_loan();

            book.title = changes.title.clone();
            book.author = changes.author.clone();
            book.isbn = changes.isbn.clone();
            book.publication_date = changes.publication_date;
            book.description = changes.description.clone();
            book.genre = changes.genre.clone();
            book.total_copies = changes.total_copies;
            book.available_copies = changes.total_copies - borrowed;
            inventory::check_copy_counts(&book)?;

            db::update_book(tx, &book)
        })?;

        info!(book_id = id, title = %updated.title, "Book updated successfully");
        Ok(updated)
    }

    /// Remove a book once every copy is back. Its loan history goes with it.
    pub fn delete_book(&mut self, id: i64) -> LendingResult<()> {
        info!(book_id = id, "Deleting book");

        let title = self.transact("delete_book", |tx, _| {
            let book = db::fetch_book(tx, id)?;
            if let Err(err) = inventory::can_delete(&book) {
                error!(book_id = id, "Cannot delete book with outstanding loans");
                return Err(err);
            }
            db::delete_book(tx, id)?;
            Ok(book.title)
        })?;

        info!(book_id = id, %title, "Book deleted successfully");
        Ok(())
    }
}

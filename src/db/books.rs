use rusqlite::{params, Connection, OptionalExtension, Row};

use super::map_constraint;
use crate::error::{LendingError, LendingResult};
use crate::models::{Book, NewBook};

/// Column list shared by every book query so `book_from_row` can rely on
/// positional indexes.
const BOOK_COLUMNS: &str = "id, title, author, isbn, publication_date, description, genre,
     total_copies, available_copies, version";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        isbn: row.get(3)?,
        publication_date: row.get(4)?,
        description: row.get(5)?,
        genre: row.get(6)?,
        total_copies: row.get(7)?,
        available_copies: row.get(8)?,
        version: row.get(9)?,
    })
}

/// Run a book query with one optional parameter list and collect every row.
fn query_books<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> LendingResult<Vec<Book>> {
    let sql = format!("SELECT {BOOK_COLUMNS} FROM books {filter} ORDER BY title COLLATE NOCASE, id");
    let mut stmt = conn.prepare(&sql)?;
    let books = stmt
        .query_map(params, book_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(books)
}

/// Look a book up by primary key, reporting `NotFound` on a miss.
pub fn fetch_book(conn: &Connection, id: i64) -> LendingResult<Book> {
    conn.query_row(
        &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
        [id],
        book_from_row,
    )
    .optional()?
    .ok_or_else(|| LendingError::NotFound(format!("Book not found with ID: {id}")))
}

/// ISBN lookup used both for reads and for uniqueness checks, hence the
/// `Option` instead of a `NotFound` error.
pub fn find_book_by_isbn(conn: &Connection, isbn: &str) -> LendingResult<Option<Book>> {
    let book = conn
        .query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE isbn = ?1"),
            [isbn],
            book_from_row,
        )
        .optional()?;
    Ok(book)
}

pub fn fetch_books(conn: &Connection) -> LendingResult<Vec<Book>> {
    query_books(conn, "", [])
}

/// Books with at least one copy on the shelf.
pub fn fetch_available_books(conn: &Connection) -> LendingResult<Vec<Book>> {
    query_books(conn, "WHERE available_copies > 0", [])
}

pub fn fetch_books_by_author(conn: &Connection, author: &str) -> LendingResult<Vec<Book>> {
    query_books(conn, "WHERE author = ?1", [author])
}

pub fn fetch_books_by_genre(conn: &Connection, genre: &str) -> LendingResult<Vec<Book>> {
    query_books(conn, "WHERE genre = ?1", [genre])
}

/// Case-insensitive substring match over title, author, ISBN and genre.
pub fn search_books(conn: &Connection, keyword: &str) -> LendingResult<Vec<Book>> {
    query_books(
        conn,
        "WHERE LOWER(title) LIKE '%' || LOWER(?1) || '%'
            OR LOWER(author) LIKE '%' || LOWER(?1) || '%'
            OR LOWER(isbn) LIKE '%' || LOWER(?1) || '%'
            OR LOWER(genre) LIKE '%' || LOWER(?1) || '%'",
        [keyword],
    )
}

/// Insert a new book row, returning the hydrated struct with its assigned id.
/// The caller resolves the available-copies default before calling.
pub fn insert_book(conn: &Connection, book: &NewBook, available_copies: u32) -> LendingResult<Book> {
    conn.execute(
        "INSERT INTO books (title, author, isbn, publication_date, description, genre,
                            total_copies, available_copies, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
        params![
            book.title,
            book.author,
            book.isbn,
            book.publication_date,
            book.description,
            book.genre,
            book.total_copies,
            available_copies,
        ],
    )
    .map_err(|err| map_constraint(err, || format!("ISBN already exists: {}", book.isbn)))?;

    Ok(Book {
        id: conn.last_insert_rowid(),
        title: book.title.clone(),
        author: book.author.clone(),
        isbn: book.isbn.clone(),
        publication_date: book.publication_date,
        description: book.description.clone(),
        genre: book.genre.clone(),
        total_copies: book.total_copies,
        available_copies,
        version: 0,
    })
}

/// Write every field of `book` back, guarded by a compare-and-swap on the
/// version read earlier. A stale version means someone else wrote the row in
/// between, which surfaces as `Conflict`; a vanished row is `NotFound`.
pub fn update_book(conn: &Connection, book: &Book) -> LendingResult<Book> {
    let updated = conn
        .execute(
            "UPDATE books
             SET title = ?1, author = ?2, isbn = ?3, publication_date = ?4,
                 description = ?5, genre = ?6, total_copies = ?7,
                 available_copies = ?8, version = version + 1
             WHERE id = ?9 AND version = ?10",
            params![
                book.title,
                book.author,
                book.isbn,
                book.publication_date,
                book.description,
                book.genre,
                book.total_copies,
                book.available_copies,
                book.id,
                book.version,
            ],
        )
        .map_err(|err| map_constraint(err, || format!("ISBN already exists: {}", book.isbn)))?;

    if updated == 0 {
        let current = fetch_book(conn, book.id)?;
        return Err(LendingError::Conflict(format!(
            "Book {} changed concurrently (expected version {}, found {})",
            book.id, book.version, current.version
        )));
    }

    Ok(Book {
        version: book.version + 1,
        ..book.clone()
    })
}

/// Remove a book row. Its loan history cascades with it.
pub fn delete_book(conn: &Connection, id: i64) -> LendingResult<()> {
    let deleted = conn.execute("DELETE FROM books WHERE id = ?1", [id])?;

    if deleted == 0 {
        Err(LendingError::NotFound(format!("Book not found with ID: {id}")))
    } else {
        Ok(())
    }
}

use chrono::NaiveDate;
use library_lending::{LendingEngine, NewBook, NewMember};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn book(isbn: &str, copies: u32) -> NewBook {
    NewBook {
        title: format!("Book {isbn}"),
        author: "Italo Calvino".to_string(),
        isbn: isbn.to_string(),
        publication_date: date(1979, 1, 1),
        description: None,
        genre: "Fiction".to_string(),
        total_copies: copies,
        available_copies: None,
    }
}

pub fn member(username: &str) -> NewMember {
    NewMember {
        name: format!("Reader {username}"),
        email: format!("{username}@example.org"),
        phone: None,
        username: username.to_string(),
        password: "password".to_string(),
        membership_type: "STANDARD".to_string(),
        active: true,
    }
}

/// Assert `0 <= available <= total` for every book in the catalog.
pub fn assert_copy_bounds(engine: &LendingEngine) {
    for book in engine.books().unwrap() {
        assert!(
            book.available_copies <= book.total_copies,
            "{book} has more copies available than owned"
        );
    }
}

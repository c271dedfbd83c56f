//! Core library surface for the library lending record keeper.
//!
//! The lending engine tracks books, members and loans on top of an embedded
//! SQLite store. It keeps copies borrowed from ever exceeding copies owned and
//! moves each loan through its lifecycle (borrow, then return, renew or lost)
//! with the matching copy-count change committed in the same transaction.
pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod lending;
pub mod membership;
pub mod models;

/// Entry points most callers need: build an engine from configuration and a
/// clock, then call its operations.
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use engine::LendingEngine;
pub use error::{LendingError, LendingResult};

/// The domain types the engine hands out and accepts.
pub use models::{Book, BookUpdate, Loan, LoanStatus, Member, MemberUpdate, NewBook, NewMember};

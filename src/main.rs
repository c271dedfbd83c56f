//! Binary entry point that puts the lending engine behind a small command
//! line: load configuration, install logging, open the database and run one
//! operation per invocation.
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use library_lending::{
    AppConfig, Book, FixedClock, LendingEngine, Loan, Member, NewBook, NewMember, SystemClock,
};

/// Record keeper for library books, members and loans.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file (overrides the configured path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Evaluate lending rules as of this date (YYYY-MM-DD) instead of today
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lend a copy of a book to a member
    Borrow {
        member: i64,
        book: i64,
        /// Due date (defaults to the configured loan period)
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Bring a borrowed copy back
    Return { loan: i64 },
    /// Extend a loan that is not yet overdue
    Renew {
        loan: i64,
        /// New due date (defaults to the old one plus the renewal period)
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Report the copy on a loan as lost
    Lost { loan: i64 },
    /// List loans past their due date
    Overdue,
    /// List loans due within the next few days
    DueSoon {
        #[arg(default_value_t = 3)]
        days: u32,
    },
    /// List a member's loans
    Loans {
        member: i64,
        /// Include returned and lost loans
        #[arg(long)]
        all: bool,
    },
    /// Add a book to the catalog
    AddBook {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        isbn: String,
        #[arg(long)]
        published: NaiveDate,
        #[arg(long)]
        genre: String,
        #[arg(long, default_value_t = 1)]
        copies: u32,
        #[arg(long)]
        description: Option<String>,
    },
    /// List books, optionally filtered by a keyword
    Books {
        search: Option<String>,
        /// Only books with a copy on the shelf
        #[arg(long)]
        available: bool,
    },
    /// Remove a book that has every copy back
    DeleteBook { book: i64 },
    /// Register a member
    AddMember {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "STANDARD")]
        membership: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List members, optionally filtered by a keyword
    Members { search: Option<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("failed to load configuration")?;
    if let Some(path) = cli.database.clone() {
        config.database.path = Some(path);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("library_lending={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut engine = match cli.today {
        Some(date) => LendingEngine::open(&config, FixedClock::new(date))?,
        None => LendingEngine::open(&config, SystemClock)?,
    };

    run(&mut engine, cli.command)
}

fn run(engine: &mut LendingEngine, command: Command) -> Result<()> {
    match command {
        Command::Borrow { member, book, due } => {
            let loan = engine.borrow(member, book, due).context("borrow failed")?;
            println!("{loan}");
        }
        Command::Return { loan } => {
            let loan = engine.return_loan(loan).context("return failed")?;
            print_loan(&loan);
        }
        Command::Renew { loan, until } => {
            let loan = engine.renew(loan, until).context("renewal failed")?;
            println!("{loan}");
        }
        Command::Lost { loan } => {
            engine.report_lost(loan).context("lost report failed")?;
            println!("loan #{loan} reported lost");
        }
        Command::Overdue => {
            let today = engine.today();
            for loan in engine.overdue_loans()? {
                let days = (today - loan.due_date).num_days();
                println!("{loan} ({days} days overdue)");
            }
        }
        Command::DueSoon { days } => print_loans(&engine.loans_due_soon(days)?),
        Command::Loans { member, all } => {
            let loans = if all {
                engine.loans_by_member(member)?
            } else {
                engine.current_loans_by_member(member)?
            };
            print_loans(&loans);
        }
        Command::AddBook {
            title,
            author,
            isbn,
            published,
            genre,
            copies,
            description,
        } => {
            let book = engine.create_book(NewBook {
                title,
                author,
                isbn,
                publication_date: published,
                description,
                genre,
                total_copies: copies,
                available_copies: None,
            })?;
            println!("{book}");
        }
        Command::Books { search, available } => {
            let books = match (search, available) {
                (Some(keyword), _) => engine.search_books(&keyword)?,
                (None, true) => engine.available_books()?,
                (None, false) => engine.books()?,
            };
            print_books(&books);
        }
        Command::DeleteBook { book } => {
            engine.delete_book(book).context("delete failed")?;
            println!("book #{book} deleted");
        }
        Command::AddMember {
            name,
            email,
            username,
            password,
            membership,
            phone,
        } => {
            let member = engine.create_member(NewMember {
                name,
                email,
                phone,
                username,
                password,
                membership_type: membership,
                active: true,
            })?;
            println!("{member}");
        }
        Command::Members { search } => {
            let members = match search {
                Some(keyword) => engine.search_members(&keyword)?,
                None => engine.members()?,
            };
            print_members(&members);
        }
    }
    Ok(())
}

fn print_loan(loan: &Loan) {
    println!("{loan}");
    if let Some(notes) = &loan.notes {
        for line in notes.lines() {
            println!("  {line}");
        }
    }
}

fn print_loans(loans: &[Loan]) {
    if loans.is_empty() {
        println!("no loans");
    }
    loans.iter().for_each(print_loan);
}

fn print_books(books: &[Book]) {
    for book in books {
        println!("{book}");
    }
}

fn print_members(members: &[Member]) {
    for member in members {
        println!("{member}");
    }
}

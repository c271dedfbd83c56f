//! Source of "today" for the lending engine.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDate, TimeDelta};

/// Supplies the calendar date every lending rule is evaluated against.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send {
    fn today(&self) -> NaiveDate;
}

/// The local calendar date of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to a chosen date. Clones share the same date, so a test can
/// keep a handle and move time forward while the engine owns another.
#[derive(Debug, Clone)]
pub struct FixedClock {
    date: Arc<Mutex<NaiveDate>>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Arc::new(Mutex::new(date)),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    pub fn advance_days(&self, days: i64) {
        let mut date = self.date.lock().unwrap_or_else(PoisonError::into_inner);
        *date += TimeDelta::days(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

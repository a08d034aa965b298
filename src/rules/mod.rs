pub mod eligibility;
pub mod search;

use chrono::{Local, NaiveDate};

/// Calendar date that splits past from upcoming trips, on the server's local clock.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

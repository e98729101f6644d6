//! Excel 1900 date-system serials.

use chrono::{Datelike, NaiveDate};

/// `num_days_from_ce` of 1899-12-30, the day before serial 1 in the
/// (leap-bug compatible) 1900 date system.
const EXCEL_EPOCH_DAYS_FROM_CE: i32 = 693_594;

/// Serial number Excel stores for `date`.
pub fn excel_serial(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - EXCEL_EPOCH_DAYS_FROM_CE)
}

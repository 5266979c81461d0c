use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, TimeDelta, Weekday};

use crate::scan_types::*;

/// Days per "month" of look-ahead.
pub const DAYS_PER_MONTH: i64 = 30;

/// Upper bound on the look-ahead so absurd configs cannot overflow the calendar.
const MAX_MONTHS_AHEAD: i64 = 1200;

/// Friday, Saturday or Sunday
pub fn is_weekend_day(date: &NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat | Weekday::Sun)
}

/// Every Friday, Saturday and Sunday from `today` through
/// `today + 30 * months_ahead` days, both ends inclusive, ascending.
pub fn weekend_dates(today: NaiveDate, months_ahead: i64) -> Vec<NaiveDate> {
    if months_ahead < 0 {
        return Vec::new();
    }

    let horizon = TimeDelta::days(months_ahead.min(MAX_MONTHS_AHEAD) * DAYS_PER_MONTH);
    let end = today.checked_add_signed(horizon).unwrap_or(NaiveDate::MAX);

    today
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(is_weekend_day)
        .collect()
}

/// One-night stays worth probing: Friday nights and/or Saturday nights.
pub fn candidate_pairs(
    dates: &[NaiveDate],
    friday_saturday: bool,
    saturday_sunday: bool,
) -> Vec<DatePair> {
    dates
        .iter()
        .map(|date| DatePair::new(*date))
        .filter(|pair| {
            (friday_saturday && pair.is_friday_night())
                || (saturday_sunday && pair.is_saturday_night())
        })
        .collect()
}

/// Adjacent weekend nights within an availability set: Friday followed by
/// Saturday, or Saturday followed by Sunday. Ascending order.
pub fn find_consecutive_pairs(dates: &BTreeSet<NaiveDate>) -> Vec<ConsecutivePair> {
    let sorted: Vec<NaiveDate> = dates.iter().copied().collect();
    sorted
        .windows(2)
        .filter(|window| window[0].succ_opt() == Some(window[1]))
        .filter(|window| matches!(window[0].weekday(), Weekday::Fri | Weekday::Sat))
        .map(|window| (window[0], window[1]))
        .collect()
}

/// Parses a `MM-DD-YYYY` command line date.
pub fn parse_cli_date(input: &str) -> Result<NaiveDate, ScanError> {
    NaiveDate::parse_from_str(input.trim(), "%m-%d-%Y")
        .map_err(|_| ScanError::InvalidDate(input.to_string()))
}

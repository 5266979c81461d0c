use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::dates::find_consecutive_pairs;
use crate::scan_types::ConsecutivePair;

/// Dates available now that were not available in the previous result.
pub fn new_availability(
    current: &BTreeSet<NaiveDate>,
    previous: &BTreeSet<NaiveDate>,
) -> BTreeSet<NaiveDate> {
    current.difference(previous).copied().collect()
}

/// Consecutive pairs made only of newly available dates.
///
/// A pair where one night was already open last time is not reported again.
pub fn new_consecutive_pairs(new_dates: &BTreeSet<NaiveDate>) -> Vec<ConsecutivePair> {
    find_consecutive_pairs(new_dates)
}

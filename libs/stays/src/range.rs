//! Half-open date ranges.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RentalError;

/// A stay or block expressed as `[start, end)`.
///
/// The end date is excluded, so a check-out day may be the next guest's
/// check-in day without the two ranges overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl StayRange {
    /// Builds a range, rejecting empty and inverted ones.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RentalError> {
        if start >= end {
            return Err(RentalError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of nights covered; always at least one.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Half-open overlap test: `self.start < other.end && self.end > other.start`.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }
}

/// Overlap predicate on raw bounds, shared with storage queries so that
/// in-memory and SQL filters agree.
pub(crate) fn overlaps(a_start: NaiveDate, a_end: NaiveDate, b_start: NaiveDate, b_end: NaiveDate) -> bool {
    a_start < b_end && a_end > b_start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert!(matches!(
            StayRange::new(day(4), day(4)),
            Err(RentalError::InvalidRange)
        ));
        assert!(matches!(
            StayRange::new(day(5), day(1)),
            Err(RentalError::InvalidRange)
        ));
    }

    #[test]
    fn counts_nights() {
        assert_eq!(StayRange::new(day(1), day(2)).unwrap().nights(), 1);
        assert_eq!(StayRange::new(day(1), day(4)).unwrap().nights(), 3);
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let first = StayRange::new(day(1), day(4)).unwrap();
        let second = StayRange::new(day(4), day(6)).unwrap();
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
    }

    #[test]
    fn shared_night_overlaps() {
        let first = StayRange::new(day(1), day(4)).unwrap();
        let second = StayRange::new(day(3), day(5)).unwrap();
        assert!(first.overlaps(&second));
        assert!(second.overlaps(&first));
    }

    #[test]
    fn enclosing_range_overlaps() {
        let outer = StayRange::new(day(1), day(10)).unwrap();
        let inner = StayRange::new(day(3), day(5)).unwrap();
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn contains_excludes_end() {
        let range = StayRange::new(day(1), day(4)).unwrap();
        assert!(range.contains(day(1)));
        assert!(range.contains(day(3)));
        assert!(!range.contains(day(4)));
    }
}

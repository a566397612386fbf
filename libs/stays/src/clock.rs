//! Source of "today" for date-based rules.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use parking_lot::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock, in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to midnight UTC of a settable date.
#[derive(Debug)]
pub struct FixedClock {
    today: RwLock<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: RwLock::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.write() = today;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.today.read().and_time(NaiveTime::MIN).and_utc()
    }

    fn today(&self) -> NaiveDate {
        *self.today.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_can_be_moved() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.today(), start);

        let later = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        clock.set(later);
        assert_eq!(clock.today(), later);
        assert_eq!(clock.now().date_naive(), later);
    }
}

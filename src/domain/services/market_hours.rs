//! Trading calendar checks.
//!
//! The US session runs Monday through Friday, 9:30 AM to 4:00 PM Eastern,
//! closed on fixed-date market holidays. All checks are pure functions of a
//! supplied instant so tests can pin the clock.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::US::Eastern;

use crate::domain::errors::EngineError;

/// Fixed-date market holidays (month, day).
const MARKET_HOLIDAYS: [(u32, u32); 3] = [
    (1, 1),   // New Year's Day
    (7, 4),   // Independence Day
    (12, 25), // Christmas
];

/// Market open/closed state with the user-facing reason when closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketStatus {
    Open,
    Closed(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCalendar;

impl MarketCalendar {
    /// Determine the market status at a given instant.
    pub fn status_at(now: DateTime<Utc>) -> MarketStatus {
        let eastern = now.with_timezone(&Eastern);

        if matches!(eastern.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketStatus::Closed("Market is closed on weekends".to_string());
        }

        if MARKET_HOLIDAYS.contains(&(eastern.month(), eastern.day())) {
            return MarketStatus::Closed("Market is closed for holiday".to_string());
        }

        let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let current = eastern.time();

        if current >= open && current <= close {
            MarketStatus::Open
        } else {
            MarketStatus::Closed(
                "Market is closed. Trading hours: 9:30 AM - 4:00 PM EST".to_string(),
            )
        }
    }

    /// Reject with `MarketClosed` when the market is not open at `now`.
    pub fn ensure_open(now: DateTime<Utc>) -> Result<(), EngineError> {
        match Self::status_at(now) {
            MarketStatus::Open => Ok(()),
            MarketStatus::Closed(reason) => Err(EngineError::MarketClosed(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Build a UTC instant from an Eastern wall-clock time.
    fn eastern(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Eastern
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_open_midweek_midday() {
        // Wednesday 2024-03-13, 12:00 Eastern
        assert_eq!(MarketStatus::Open, MarketCalendar::status_at(eastern(2024, 3, 13, 12, 0)));
    }

    #[test]
    fn test_session_boundaries_are_inclusive() {
        assert_eq!(MarketStatus::Open, MarketCalendar::status_at(eastern(2024, 3, 13, 9, 30)));
        assert_eq!(MarketStatus::Open, MarketCalendar::status_at(eastern(2024, 3, 13, 16, 0)));
    }

    #[test]
    fn test_closed_before_open_and_after_close() {
        assert!(matches!(
            MarketCalendar::status_at(eastern(2024, 3, 13, 9, 29)),
            MarketStatus::Closed(_)
        ));
        assert!(matches!(
            MarketCalendar::status_at(eastern(2024, 3, 13, 16, 1)),
            MarketStatus::Closed(_)
        ));
    }

    #[test]
    fn test_closed_on_weekend() {
        // Saturday 2024-03-16
        let status = MarketCalendar::status_at(eastern(2024, 3, 16, 12, 0));
        assert_eq!(
            status,
            MarketStatus::Closed("Market is closed on weekends".to_string())
        );
    }

    #[test]
    fn test_closed_on_holiday() {
        // Independence Day 2024 falls on a Thursday
        let status = MarketCalendar::status_at(eastern(2024, 7, 4, 12, 0));
        assert_eq!(
            status,
            MarketStatus::Closed("Market is closed for holiday".to_string())
        );
    }

    #[test]
    fn test_ensure_open_maps_to_market_closed_error() {
        let result = MarketCalendar::ensure_open(eastern(2024, 3, 16, 12, 0));
        assert!(matches!(result, Err(EngineError::MarketClosed(_))));
        assert!(MarketCalendar::ensure_open(eastern(2024, 3, 13, 12, 0)).is_ok());
    }
}

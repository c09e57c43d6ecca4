//! Calendar-month reset policy
//!
//! Quota periods are one calendar month long, not fixed 30-day windows. A
//! period that starts on day `d` ends on day `d` of the following month at
//! the same time of day. When the following month has no day `d`, the
//! boundary is clamped to the last day of that month:
//!
//! | last reset         | next reset         |
//! |--------------------|--------------------|
//! | 2024-01-15 09:00   | 2024-02-15 09:00   |
//! | 2024-01-31 09:00   | 2024-02-29 09:00   |
//! | 2025-01-31 09:00   | 2025-02-28 09:00   |
//! | 2024-03-31 09:00   | 2024-04-30 09:00   |
//!
//! Clamping never rolls over into the month after, so a period is between
//! 28 and 31 days long. [`compute_next_reset`] is the only place period
//! boundaries are derived.

use chrono::{DateTime, Months, Utc};

/// Returns the boundary at which a period starting at `last_reset` ends
///
/// # Examples
///
/// ```
/// use chatquota::quota::reset::compute_next_reset;
/// use chrono::{TimeZone, Utc};
///
/// let last = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
/// let next = compute_next_reset(last);
/// assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
/// ```
pub fn compute_next_reset(last_reset: DateTime<Utc>) -> DateTime<Utc> {
    // chrono clamps the day-of-month to the last valid day of the target month
    last_reset
        .checked_add_months(Months::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Returns true once the period that started at `last_reset` has elapsed
///
/// # Examples
///
/// ```
/// use chatquota::quota::reset::should_reset;
/// use chrono::{TimeZone, Utc};
///
/// let last = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
/// assert!(!should_reset(Utc.with_ymd_and_hms(2024, 2, 28, 23, 59, 59).unwrap(), last));
/// assert!(should_reset(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap(), last));
/// ```
pub fn should_reset(now: DateTime<Utc>, last_reset: DateTime<Utc>) -> bool {
    now >= compute_next_reset(last_reset)
}

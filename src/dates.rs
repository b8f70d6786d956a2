//! Epoch arithmetic for the two date encodings the format uses: a Julian-day
//! patient birthdate and a 100ns-tick acquisition timestamp.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Acquisition timestamps are ticks of 100ns since this instant.
fn acquisition_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1600, 12, 31)
        .expect("static calendar date")
        .and_hms_opt(23, 59, 0)
        .expect("static time")
}

/// Converts a raw 100ns-tick acquisition timestamp into a calendar
/// datetime. Splits the tick count into whole seconds and a nanosecond
/// remainder before building the `Duration`, so a near-`u64::MAX` tick count
/// can't overflow the multiplication the naive `ticks * 100` would need.
pub fn acquisition_datetime(ticks_100ns: u64) -> NaiveDateTime {
    let seconds = (ticks_100ns / 10_000_000) as i64;
    let sub_ns = ((ticks_100ns % 10_000_000) * 100) as i64;
    acquisition_epoch() + Duration::seconds(seconds) + Duration::nanoseconds(sub_ns)
}

/// Converts the raw patient birthdate field into days since `1970-01-01`.
pub fn julian_to_calendar_days(birthdate_raw: u32) -> i64 {
    (birthdate_raw as i64) / 64 - 14_558_805
}

/// Inverse of [`julian_to_calendar_days`], used only to pin the round trip
/// in tests.
#[cfg(test)]
fn calendar_days_to_julian_raw(calendar_days: i64) -> u32 {
    (64 * (calendar_days + 14_558_805)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_epoch_is_exact() {
        assert_eq!(acquisition_datetime(0), acquisition_epoch());
    }

    #[test]
    fn acquisition_one_second_later() {
        let dt = acquisition_datetime(10_000_000);
        assert_eq!(dt, acquisition_epoch() + Duration::seconds(1));
    }

    #[test]
    fn acquisition_handles_large_tick_counts_without_overflow() {
        let dt = acquisition_datetime(u64::MAX);
        assert!(dt > acquisition_epoch());
    }

    #[test]
    fn julian_round_trip() {
        for calendar_days in [-10_000i64, 0, 12_345, 400_000] {
            let raw = calendar_days_to_julian_raw(calendar_days);
            assert_eq!(julian_to_calendar_days(raw), calendar_days);
        }
    }
}

use once_cell::sync::Lazy;
use time::format_description::{self, FormatItem};
use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

static DAY_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[year]-[month]-[day]").expect("valid date format description")
});

/// Calendar day of `date` as seen from `offset`.
pub fn day_of(date: OffsetDateTime, offset: UtcOffset) -> Date {
    date.to_offset(offset).date()
}

pub fn are_same_day(left: OffsetDateTime, right: OffsetDateTime, offset: UtcOffset) -> bool {
    day_of(left, offset) == day_of(right, offset)
}

/// True when the two instants are strictly less than `window` apart, in
/// either direction.
pub fn is_within(left: OffsetDateTime, right: OffsetDateTime, window: Duration) -> bool {
    (left - right).abs() < window
}

pub fn beginning_of_day(date: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    day_of(date, offset)
        .with_time(Time::MIDNIGHT)
        .assume_offset(offset)
}

/// Stable `YYYY-MM-DD` key for a calendar day.
pub fn format_day(day: Date) -> String {
    day.format(&*DAY_FORMAT)
        .unwrap_or_else(|_| format!("{}-{:02}-{:02}", day.year(), day.month() as u8, day.day()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, offset};

    #[test]
    fn same_day_respects_offset() {
        let late = datetime!(2024-01-01 23:30 UTC);
        let early = datetime!(2024-01-02 00:30 UTC);
        assert!(!are_same_day(late, early, UtcOffset::UTC));
        assert!(are_same_day(late, early, offset!(-2)));
    }

    #[test]
    fn window_is_strict_and_symmetric() {
        let base = datetime!(2024-01-01 10:00 UTC);
        let window = Duration::minutes(10);
        assert!(is_within(base, base + Duration::minutes(9), window));
        assert!(is_within(base + Duration::minutes(9), base, window));
        assert!(!is_within(base, base + Duration::minutes(10), window));
        assert!(!is_within(base + Duration::minutes(11), base, window));
    }

    #[test]
    fn beginning_of_day_lands_on_local_midnight() {
        let start = beginning_of_day(datetime!(2024-03-05 01:15 UTC), offset!(+3));
        assert_eq!(start, datetime!(2024-03-05 00:00 +3));
        assert_eq!(format_day(day_of(start, offset!(+3))), "2024-03-05");
        assert_eq!(format_day(date!(2024 - 12 - 31)), "2024-12-31");
    }
}

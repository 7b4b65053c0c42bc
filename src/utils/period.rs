use time::util::days_in_year_month;
use time::{Date, Month, OffsetDateTime};

/// Calendar-month addition with end-of-month clamping: Jan 31 + 1 month is
/// Feb 28 (or 29), never an invalid date or a fixed 30-day hop. Billing
/// periods stitch on calendar boundaries so renewals never lose days.
pub fn add_months(dt: OffsetDateTime, months: u32) -> OffsetDateTime {
    let date = dt.date();
    let zero_based = date.year() as i64 * 12 + (date.month() as u8 as i64 - 1) + months as i64;
    let year = zero_based.div_euclid(12) as i32;
    let month =
        Month::try_from((zero_based.rem_euclid(12) + 1) as u8).unwrap_or_else(|_| date.month());
    let day = date.day().min(days_in_year_month(year, month));
    match Date::from_calendar_date(year, month, day) {
        Ok(new_date) => dt.replace_date(new_date),
        Err(_) => dt,
    }
}

pub fn add_years(dt: OffsetDateTime, years: u32) -> OffsetDateTime {
    add_months(dt, years * 12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn adds_within_a_year() {
        assert_eq!(
            add_months(datetime!(2025-03-15 10:30 UTC), 1),
            datetime!(2025-04-15 10:30 UTC)
        );
    }

    #[test]
    fn rolls_over_year_boundary() {
        assert_eq!(
            add_months(datetime!(2025-11-20 00:00 UTC), 3),
            datetime!(2026-02-20 00:00 UTC)
        );
    }

    #[test]
    fn clamps_to_end_of_shorter_month() {
        assert_eq!(
            add_months(datetime!(2025-01-31 12:00 UTC), 1),
            datetime!(2025-02-28 12:00 UTC)
        );
        // Leap year keeps the 29th.
        assert_eq!(
            add_months(datetime!(2024-01-31 12:00 UTC), 1),
            datetime!(2024-02-29 12:00 UTC)
        );
    }

    #[test]
    fn add_years_handles_leap_day() {
        assert_eq!(
            add_years(datetime!(2024-02-29 09:00 UTC), 1),
            datetime!(2025-02-28 09:00 UTC)
        );
    }

    #[test]
    fn preserves_time_of_day() {
        let dt = datetime!(2025-06-30 23:59:59 UTC);
        assert_eq!(add_months(dt, 12).time(), dt.time());
    }
}

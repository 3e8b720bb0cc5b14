use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::models::{ForbiddenPeriod, CLOSING_MINUTE, OPENING_MINUTE, SLOT_MINUTES};

/// Every date in `[start, end]` that falls on an active weekday and outside all
/// forbidden periods.
pub fn schedulable_days(
    start: NaiveDate,
    end: NaiveDate,
    weekdays: &[Weekday],
    forbidden: &[ForbiddenPeriod],
) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }

    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(|date| weekdays.contains(&date.weekday()))
        .filter(|date| !forbidden.iter().any(|period| period.contains(*date)))
        .collect()
}

/// Last day of a session starting on `start` and lasting `months` calendar months.
pub fn end_of_long_session(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    start
        .checked_add_months(Months::new(months))?
        .checked_sub_days(Days::new(1))
}

/// Monday-first, de-duplicated copy of `weekdays`.
pub fn normalize_weekdays(weekdays: &[Weekday]) -> Vec<Weekday> {
    let mut days = weekdays.to_vec();
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    days
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

pub fn slot_aligned(time: NaiveTime) -> bool {
    time.second() == 0 && minute_of_day(time) % SLOT_MINUTES == 0
}

pub fn within_operating_hours(start: NaiveTime, end: NaiveTime) -> bool {
    minute_of_day(start) >= OPENING_MINUTE && minute_of_day(end) <= CLOSING_MINUTE
}

/// Length of a slot in hours, zero when `end` is not after `start`.
pub fn duration_hours(start: NaiveTime, end: NaiveTime) -> f64 {
    let minutes = (end - start).num_minutes();
    if minutes <= 0 {
        0.0
    } else {
        minutes as f64 / 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: [Weekday; 5] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn counts_working_week() {
        let days = schedulable_days(date(2026, 3, 9), date(2026, 3, 13), &WEEK, &[]);
        assert_eq!(days.len(), 5);
    }

    #[test]
    fn skips_weekends_and_forbidden_periods() {
        let forbidden = vec![ForbiddenPeriod {
            start: date(2026, 3, 17),
            end: date(2026, 3, 18),
            reason: "Examens".to_string(),
        }];
        let days = schedulable_days(date(2026, 3, 9), date(2026, 3, 20), &WEEK, &forbidden);
        assert_eq!(days.len(), 8);
        assert!(!days.contains(&date(2026, 3, 14)));
        assert!(!days.contains(&date(2026, 3, 17)));
    }

    #[test]
    fn inverted_range_has_no_days() {
        assert!(schedulable_days(date(2026, 3, 13), date(2026, 3, 9), &WEEK, &[]).is_empty());
    }

    #[test]
    fn long_session_end_is_day_before_anniversary() {
        assert_eq!(end_of_long_session(date(2026, 9, 1), 10), Some(date(2027, 6, 30)));
        assert_eq!(end_of_long_session(date(2026, 1, 31), 1), Some(date(2026, 2, 27)));
    }

    #[test]
    fn weekdays_are_sorted_monday_first() {
        let days = normalize_weekdays(&[Weekday::Fri, Weekday::Mon, Weekday::Fri, Weekday::Sun]);
        assert_eq!(days, vec![Weekday::Mon, Weekday::Fri, Weekday::Sun]);
    }

    #[test]
    fn operating_hours_and_grid() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(slot_aligned(t(8, 30)));
        assert!(!slot_aligned(t(8, 15)));
        assert!(within_operating_hours(t(8, 0), t(21, 0)));
        assert!(!within_operating_hours(t(7, 30), t(12, 0)));
        assert!(!within_operating_hours(t(18, 0), t(21, 30)));
        assert_eq!(duration_hours(t(9, 0), t(12, 30)), 3.5);
        assert_eq!(duration_hours(t(12, 0), t(9, 0)), 0.0);
    }
}

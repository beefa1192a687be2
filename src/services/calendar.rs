//! Clinic-local day and week boundaries.
//!
//! Timestamps are stored in UTC; the dashboard thinks in the clinic's wall
//! clock. Windows are half-open `[start, end)` in UTC. Dates too close to
//! the ends of the representable range yield `None`.

use chrono::{DateTime, Datelike, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;

pub const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// UTC instant of local midnight at the start of `date`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let local = date.and_time(NaiveTime::MIN);
    local
        .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
        .map(|utc| utc.and_utc())
}

/// `[00:00, next 00:00)` of a local calendar day.
pub fn day_window(date: NaiveDate, offset: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let next = date.checked_add_days(Days::new(1))?;
    Some((local_midnight(date, offset)?, local_midnight(next, offset)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekWindow {
    /// Monday of the ISO week.
    pub monday: NaiveDate,
    /// Sunday of the ISO week.
    pub sunday: NaiveDate,
    #[serde(skip)]
    pub start: DateTime<Utc>,
    #[serde(skip)]
    pub end: DateTime<Utc>,
}

/// The Monday-to-Sunday week containing `date`.
pub fn week_window(date: NaiveDate, offset: FixedOffset) -> Option<WeekWindow> {
    let monday = date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))?;
    let sunday = monday.checked_add_days(Days::new(6))?;
    let next_monday = monday.checked_add_days(Days::new(7))?;
    Some(WeekWindow {
        monday,
        sunday,
        start: local_midnight(monday, offset)?,
        end: local_midnight(next_monday, offset)?,
    })
}

/// Monday-first bucket: Sunday (0 when counted from Sunday) lands last.
pub fn day_bucket(weekday: Weekday) -> usize {
    (weekday.num_days_from_sunday() as usize + 6) % 7
}

/// Counts `instants` per local weekday. Instants outside `window` are ignored.
pub fn bucket_by_weekday<I>(instants: I, window: &WeekWindow, offset: FixedOffset) -> [u32; 7]
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut counts = [0u32; 7];
    for at in instants {
        if at < window.start || at >= window.end {
            continue;
        }
        counts[day_bucket(at.with_timezone(&offset).weekday())] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_bucket_is_monday_first() {
        assert_eq!(day_bucket(Weekday::Mon), 0);
        assert_eq!(day_bucket(Weekday::Wed), 2);
        assert_eq!(day_bucket(Weekday::Sat), 5);
        assert_eq!(day_bucket(Weekday::Sun), 6);
    }

    #[test]
    fn week_window_spans_monday_to_sunday() {
        // 2026-03-04 is a Wednesday.
        let w = week_window(date(2026, 3, 4), utc()).unwrap();
        assert_eq!(w.monday, date(2026, 3, 2));
        assert_eq!(w.sunday, date(2026, 3, 8));
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap());

        // A Sunday belongs to the week that started six days earlier.
        assert_eq!(week_window(date(2026, 3, 8), utc()).unwrap().monday, date(2026, 3, 2));
    }

    #[test]
    fn local_midnight_honours_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            local_midnight(date(2026, 3, 2), plus_two),
            Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).single()
        );
    }

    #[test]
    fn completions_on_mon_wed_wed() {
        let w = week_window(date(2026, 3, 2), utc()).unwrap();
        let instants = [
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 16, 45, 0).unwrap(),
        ];
        assert_eq!(bucket_by_weekday(instants, &w, utc()), [1, 0, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn bucketing_uses_clinic_wall_clock() {
        // 23:30 UTC Sunday is already Monday 01:30 at +02:00, so it falls
        // into the following week.
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let w = week_window(date(2026, 3, 9), plus_two).unwrap();
        let late_sunday_utc = Utc.with_ymd_and_hms(2026, 3, 8, 23, 30, 0).unwrap();
        let sunday_evening = Utc.with_ymd_and_hms(2026, 3, 15, 20, 0, 0).unwrap();

        assert_eq!(
            bucket_by_weekday([late_sunday_utc, sunday_evening], &w, plus_two),
            [1, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn instants_outside_window_are_ignored() {
        let w = week_window(date(2026, 3, 2), utc()).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(bucket_by_weekday([before, after], &w, utc()), [0; 7]);
    }

    #[test]
    fn edges_of_the_calendar_are_out_of_range() {
        assert_eq!(day_window(NaiveDate::MAX, utc()), None);
        assert_eq!(week_window(NaiveDate::MAX, utc()), None);

        // Local midnight of the first day lies before it in UTC at +02:00.
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(local_midnight(NaiveDate::MIN, plus_two), None);
    }
}

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Lectures run Tuesday through Friday. Saturday, Sunday and Monday never
/// carry a lecture, so the advancer skips them.
pub fn is_lecture_day(date: NaiveDate) -> bool {
    matches!(
        date.weekday(),
        Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri
    )
}

/// First lecture day strictly after `date`. Terminates within 6 steps since
/// every 7-day window contains a Tuesday.
pub fn next_lecture_day_after(date: NaiveDate) -> NaiveDate {
    let mut current = date + Duration::days(1);
    while !is_lecture_day(current) {
        current += Duration::days(1);
    }
    current
}

/// The date the admin may submit attendance for.
///
/// With an empty ledger: today if today is a lecture day, otherwise the next
/// lecture day. With a last recorded date: today only when today is a lecture
/// day strictly after it; otherwise the next lecture day after the last
/// record. The today-vs-last comparison lets the admin catch up after
/// skipping a day; the result is never <= the last recorded date.
pub fn active_date(last_recorded: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    match last_recorded {
        None => {
            if is_lecture_day(today) {
                today
            } else {
                next_lecture_day_after(today)
            }
        }
        Some(last) => {
            if is_lecture_day(today) && today > last {
                today
            } else {
                next_lecture_day_after(last)
            }
        }
    }
}

/// Full English weekday name, stored alongside the date for display.
pub fn day_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

pub fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Strict YYYY-MM-DD parse; anything else is a caller error.
pub fn parse_iso(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

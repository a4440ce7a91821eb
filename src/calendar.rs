use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Most recent Wednesday strictly before `today`.
///
/// When `today` is itself a Wednesday this returns `today - 7`, never today:
/// the weekly report always compares against the *prior* meeting.
pub fn previous_wednesday(today: NaiveDate) -> NaiveDate {
    let from_monday = today.weekday().num_days_from_monday() as i64;
    let mut back = (from_monday + 7 - 2) % 7; // Wednesday is 2 days from Monday
    if back == 0 {
        back = 7;
    }
    today - Duration::days(back)
}

/// Next Wednesday strictly after `today`; a Wednesday input maps to `today + 7`.
pub fn next_wednesday(today: NaiveDate) -> NaiveDate {
    let from_monday = today.weekday().num_days_from_monday() as i64;
    let mut ahead = (2 + 7 - from_monday) % 7;
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// First Friday of the given month, or `None` for an invalid year/month pair.
pub fn first_friday_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let mut date = NaiveDate::from_ymd_opt(year, month, 1)?;
    while date.weekday() != Weekday::Fri {
        date = date.succ_opt()?;
    }
    Some(date)
}

/// First Friday of the month containing `date`.
pub fn first_friday_for(date: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month, so this cannot fail for a valid date.
    first_friday_of_month(date.year(), date.month()).unwrap_or(date)
}

/// Second Friday of the month containing `date`.
pub fn second_friday_for(date: NaiveDate) -> NaiveDate {
    first_friday_for(date) + Duration::days(7)
}

pub fn is_first_friday(date: NaiveDate) -> bool {
    date == first_friday_for(date)
}

pub fn is_second_friday(date: NaiveDate) -> bool {
    date == second_friday_for(date)
}

/// First calendar day of the month before the one containing `today`.
pub fn first_day_of_previous_month(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    // Day 1 is valid in every month of every year.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
}

/// First Friday of the month after the one containing `today`, i.e. the next
/// townhall candidate once the current month's meeting has passed.
pub fn next_townhall_friday(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    first_friday_of_month(year, month).unwrap_or(today)
}

/// Long human-readable date used in snapshot descriptions,
/// e.g. "Wednesday, June 11, 2025".
pub fn format_long(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

//! Effective-entry-date arithmetic around the daily cutoff windows.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;

/// A calendar day on which the ACH operator settles: not a weekend and not
/// a configured holiday.
pub fn is_banking_day(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

/// Advances `date` by `days` banking days, skipping weekends and holidays.
pub fn add_banking_days(date: NaiveDate, days: u32, holidays: &[NaiveDate]) -> NaiveDate {
    let mut current = date;
    for _ in 0..days {
        loop {
            current = current.succ_opt().unwrap_or(current);
            if is_banking_day(current, holidays) {
                break;
            }
        }
    }
    current
}

/// Whether the local time has passed the latest cutoff window of the day.
pub fn after_cutoff_windows(windows: &[NaiveTime], now: DateTime<Tz>) -> bool {
    match windows.iter().max() {
        Some(last) => now.time() >= *last,
        None => false,
    }
}

/// Computes the effective entry date for a transfer accepted at `now`
/// (already localized to the cutoff timezone).
///
/// Before the last window the file still goes out today: same-day transfers
/// settle today, standard ones the next banking day. After the last window
/// the file ships with the next cutoff, pushing each case out one banking
/// day further.
pub fn calculate_effective_entry_date(
    windows: &[NaiveTime],
    holidays: &[NaiveDate],
    now: DateTime<Tz>,
    same_day: bool,
) -> NaiveDate {
    let today = now.date_naive();
    if after_cutoff_windows(windows, now) {
        if same_day {
            return add_banking_days(today, 1, holidays);
        }
        return add_banking_days(today, 2, holidays);
    }
    if same_day {
        return today;
    }
    add_banking_days(today, 1, holidays)
}

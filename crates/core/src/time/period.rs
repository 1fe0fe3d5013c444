use anyhow::Context;
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};

/// Calendar month containing `date`, as a half-open UTC range [start, end).
pub fn month_bounds(date: NaiveDate) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .with_context(|| format!("invalid month for {date}"))?;
    let next = first
        .checked_add_months(Months::new(1))
        .with_context(|| format!("month after {first} out of range"))?;
    Ok((start_of_day(first), start_of_day(next)))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(date);
    (start, start + chrono::Duration::days(1))
}

pub fn sub_months(now: DateTime<Utc>, months: u32) -> anyhow::Result<DateTime<Utc>> {
    now.checked_sub_months(Months::new(months))
        .with_context(|| format!("{now} minus {months} months out of range"))
}

/// Short English month name, e.g. "Jan".
pub fn month_label(date: NaiveDate) -> String {
    date.format("%b").to_string()
}

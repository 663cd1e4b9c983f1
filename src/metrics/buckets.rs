use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::models::WeeklyCount;

/// First day of the calendar week containing `timestamp`. Weeks start on
/// Sunday and are evaluated in UTC.
pub fn week_start(timestamp: DateTime<Utc>) -> NaiveDate {
    let date = timestamp.date_naive();
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

pub fn week_key(timestamp: DateTime<Utc>) -> String {
    week_start(timestamp).format("%Y-%m-%d").to_string()
}

/// Counts timestamps per week key. Keys are zero-padded ISO dates, so the
/// map's lexicographic order is chronological.
pub fn bucket_by_week<I>(timestamps: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    timestamps
        .into_iter()
        .fold(BTreeMap::new(), |mut weeks, timestamp| {
            *weeks.entry(week_key(timestamp)).or_insert(0) += 1;
            weeks
        })
}

pub fn into_series(buckets: BTreeMap<String, usize>) -> Vec<WeeklyCount> {
    buckets
        .into_iter()
        .map(|(date, count)| WeeklyCount { date, count })
        .collect()
}

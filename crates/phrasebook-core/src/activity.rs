//! Day-bucketed activity views for the dashboard charts.
//!
//! Both views are pure functions of per-day creation counts and a reference
//! date, so they are computed the same way regardless of which repository
//! supplied the counts. Days are UTC calendar days; weeks start on Sunday.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::defaults;

/// One cell of the contribution heatmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityDay {
    /// Calendar day, serialized as `yyyy-MM-dd`.
    pub date: NaiveDate,
    pub count: i64,
    /// Intensity bucket 0..=4.
    pub level: u8,
}

/// Month marker above the heatmap columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthLabel {
    /// Short month name, e.g. `"Jan"`.
    pub label: String,
    /// Index of the first week (column) in that month.
    pub week_index: usize,
}

/// A year of activity grouped into Sunday-first weeks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityHeatmap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub weeks: Vec<Vec<ActivityDay>>,
    pub month_labels: Vec<MonthLabel>,
    /// Phrases created inside the window.
    pub total: i64,
}

/// One bar of the weekly chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyDay {
    pub date: NaiveDate,
    /// Weekday abbreviation, e.g. `"Mon"`.
    pub day: String,
    /// Short date, e.g. `"Jan 5"`.
    pub label: String,
    pub count: i64,
}

/// Heatmap colour bucket for a day's count.
pub fn intensity_level(count: i64) -> u8 {
    match count {
        i64::MIN..=0 => 0,
        1 => 1,
        2..=3 => 2,
        4..=5 => 3,
        _ => 4,
    }
}

/// Sunday on or before `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// Saturday on or after `date`.
pub fn end_of_week(date: NaiveDate) -> NaiveDate {
    start_of_week(date) + Duration::days(6)
}

/// Midnight UTC at the start of `date`.
pub fn day_start_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// First and last day shown by the heatmap for `today`.
pub fn heatmap_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = end_of_week(today);
    let start = start_of_week(end - Duration::days(defaults::HEATMAP_LOOKBACK_DAYS));
    (start, end)
}

/// First day shown by the weekly series for `today`.
pub fn weekly_series_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(defaults::WEEKLY_SERIES_DAYS - 1)
}

/// Build the heatmap from per-day counts. Counts outside the window are ignored.
pub fn activity_heatmap(counts: &BTreeMap<NaiveDate, i64>, today: NaiveDate) -> ActivityHeatmap {
    let (start, end) = heatmap_window(today);

    let mut weeks: Vec<Vec<ActivityDay>> = Vec::new();
    let mut current: Vec<ActivityDay> = Vec::with_capacity(7);
    let mut total = 0;

    for date in start.iter_days().take_while(|d| *d <= end) {
        let count = counts.get(&date).copied().unwrap_or(0);
        total += count;
        current.push(ActivityDay {
            date,
            count,
            level: intensity_level(count),
        });
        if current.len() == 7 {
            weeks.push(std::mem::replace(&mut current, Vec::with_capacity(7)));
        }
    }
    if !current.is_empty() {
        weeks.push(current);
    }

    let mut month_labels = Vec::new();
    let mut last_month = None;
    for (week_index, week) in weeks.iter().enumerate() {
        let Some(first) = week.first() else { continue };
        let month = first.date.month();
        if last_month != Some(month) {
            month_labels.push(MonthLabel {
                label: first.date.format("%b").to_string(),
                week_index,
            });
            last_month = Some(month);
        }
    }

    ActivityHeatmap {
        start,
        end,
        weeks,
        month_labels,
        total,
    }
}

/// Build the seven-day series ending on `today`.
pub fn weekly_series(counts: &BTreeMap<NaiveDate, i64>, today: NaiveDate) -> Vec<WeeklyDay> {
    weekly_series_start(today)
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|date| WeeklyDay {
            date,
            day: date.format("%a").to_string(),
            label: date.format("%b %-d").to_string(),
            count: counts.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

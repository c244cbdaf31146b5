//! Per-day aggregation of entries.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::models::{DailyTotals, DayGroup, DaySummary, Entry, GoalProgress, Goals};

fn round_dp(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Protein is shown to 0.1 g.
#[must_use]
pub fn round_protein(g: f64) -> f64 {
    round_dp(g, 1)
}

/// Water is shown to 0.01 L.
#[must_use]
pub fn round_water(l: f64) -> f64 {
    round_dp(l, 2)
}

fn by_date(entries: &[Entry]) -> BTreeMap<&str, Vec<&Entry>> {
    let mut map: BTreeMap<&str, Vec<&Entry>> = BTreeMap::new();
    for e in entries {
        map.entry(e.date.as_str()).or_default().push(e);
    }
    map
}

fn sums<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> (f64, f64) {
    entries
        .into_iter()
        .fold((0.0, 0.0), |(p, w), e| (p + e.protein_g, w + e.water_l))
}

/// Entries grouped per date, newest date first, earliest time first within a day.
#[must_use]
pub fn group_by_date(entries: &[Entry]) -> Vec<DayGroup> {
    by_date(entries)
        .into_iter()
        .rev()
        .map(|(date, mut day)| {
            day.sort_by(|a, b| a.time.cmp(&b.time));
            let (protein, water) = sums(day.iter().copied());
            DayGroup {
                date: date.to_string(),
                entries: day.into_iter().cloned().collect(),
                protein_g: round_protein(protein),
                water_l: round_water(water),
            }
        })
        .collect()
}

/// Per-date totals, oldest date first.
#[must_use]
pub fn daily_totals(entries: &[Entry]) -> Vec<DailyTotals> {
    by_date(entries)
        .into_iter()
        .map(|(date, day)| {
            let (protein, water) = sums(day.iter().copied());
            DailyTotals {
                date: date.to_string(),
                protein_g: round_protein(protein),
                water_l: round_water(water),
                entry_count: day.len(),
            }
        })
        .collect()
}

/// Totals for the `n` days ending on `today` (inclusive). Days without entries are absent.
#[must_use]
pub fn last_n_days(totals: &[DailyTotals], today: NaiveDate, n: u32) -> Vec<DailyTotals> {
    let start = today - Duration::days(i64::from(n) - 1);
    let start = start.format("%Y-%m-%d").to_string();
    totals
        .iter()
        .filter(|t| t.date >= start)
        .cloned()
        .collect()
}

/// One day's log measured against the goals.
#[must_use]
pub fn day_summary(entries: &[Entry], date: NaiveDate, goals: Goals) -> DaySummary {
    let date = date.format("%Y-%m-%d").to_string();
    let mut day: Vec<Entry> = entries.iter().filter(|e| e.date == date).cloned().collect();
    day.sort_by(|a, b| a.time.cmp(&b.time));

    let (protein, water) = sums(&day);
    let protein_g = round_protein(protein);
    let water_l = round_water(water);

    DaySummary {
        protein: GoalProgress::new(protein_g, goals.daily_protein_g),
        water: GoalProgress::new(water_l, goals.daily_water_l),
        date,
        entries: day,
        protein_g,
        water_l,
        goals,
    }
}

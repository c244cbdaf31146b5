use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DAILY_PROTEIN_G: f64 = 160.0;
pub const DEFAULT_DAILY_WATER_L: f64 = 2.0;

/// One logged intake event.
///
/// Serialized with the column names of the remote `entries` table, so the same
/// type is used for the local store, the REST API and the backend payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub date: String,
    pub time: String,
    #[serde(rename = "protein", default)]
    pub protein_g: f64,
    #[serde(rename = "water", default)]
    pub water_l: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Entry {
    /// Composite key used to detect exact-duplicate rows on import.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        dedup_key(
            &self.date,
            &self.time,
            self.protein_g,
            self.water_l,
            self.note.as_deref(),
        )
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &UpdateEntry) {
        if let Some(date) = update.date {
            self.date = date.format("%Y-%m-%d").to_string();
        }
        if let Some(ref time) = update.time {
            self.time.clone_from(time);
        }
        if let Some(p) = update.protein_g {
            self.protein_g = p;
        }
        if let Some(w) = update.water_l {
            self.water_l = w;
        }
        if let Some(ref note) = update.note {
            self.note = clean_note(note.as_deref());
        }
    }
}

/// Store notes the way a CSV import reads them back: trimmed, on one line.
/// Blank notes become `None`.
#[must_use]
pub fn clean_note(note: Option<&str>) -> Option<String> {
    let joined = note?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

#[must_use]
pub fn dedup_key(date: &str, time: &str, protein_g: f64, water_l: f64, note: Option<&str>) -> String {
    format!("{date}|{time}|{protein_g}|{water_l}|{}", note.unwrap_or(""))
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub time: String,
    pub protein_g: f64,
    pub water_l: f64,
    pub note: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateEntry {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub protein_g: Option<f64>,
    pub water_l: Option<f64>,
    pub note: Option<Option<String>>,
}

impl UpdateEntry {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.time.is_none()
            && self.protein_g.is_none()
            && self.water_l.is_none()
            && self.note.is_none()
    }
}

/// Daily targets. One row per owner; the local owner is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goals {
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(rename = "daily_protein")]
    pub daily_protein_g: f64,
    #[serde(rename = "daily_water")]
    pub daily_water_l: f64,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            owner: None,
            daily_protein_g: DEFAULT_DAILY_PROTEIN_G,
            daily_water_l: DEFAULT_DAILY_WATER_L,
        }
    }
}

// --- Aggregates ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotals {
    pub date: String,
    pub protein_g: f64,
    pub water_l: f64,
    pub entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: String,
    pub entries: Vec<Entry>,
    pub protein_g: f64,
    pub water_l: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProgress {
    pub total: f64,
    pub goal: f64,
    pub percent: f64,
}

impl GoalProgress {
    /// Goals below 1 count as 1 so an unset or zero goal never divides by zero.
    #[must_use]
    pub fn new(total: f64, goal: f64) -> Self {
        Self {
            total,
            goal,
            percent: 100.0 * total / goal.max(1.0),
        }
    }

    /// Percentage clamped for progress bars.
    #[must_use]
    pub fn bar_percent(&self) -> f64 {
        self.percent.clamp(0.0, 100.0)
    }

    #[must_use]
    pub fn remaining(&self) -> f64 {
        self.goal - self.total
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub entries: Vec<Entry>,
    pub protein_g: f64,
    pub water_l: f64,
    pub goals: Goals,
    pub protein: GoalProgress,
    pub water: GoalProgress,
}

// --- Validation ---

pub fn validate_amount(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        bail!("{label} must be a number");
    }
    if value < 0.0 {
        bail!("{label} must not be negative");
    }
    Ok(())
}

/// Validate the numeric part of an entry. Something has to be logged.
pub fn validate_entry_amounts(protein_g: f64, water_l: f64) -> Result<()> {
    validate_amount("Protein", protein_g)?;
    validate_amount("Water", water_l)?;
    if protein_g == 0.0 && water_l == 0.0 {
        bail!("Nothing to log: protein and water are both zero");
    }
    Ok(())
}

pub fn validate_goals(goals: &Goals) -> Result<()> {
    validate_amount("Daily protein goal", goals.daily_protein_g)?;
    validate_amount("Daily water goal", goals.daily_water_l)?;
    Ok(())
}

/// Validate an entry coming from outside (REST body, remote pull).
pub fn validate_entry(entry: &Entry) -> Result<()> {
    if entry.id.trim().is_empty() {
        bail!("Entry id must not be empty");
    }
    validate_amount("protein", entry.protein_g)?;
    validate_amount("water", entry.water_l)?;
    NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid entry date '{}'. Must be YYYY-MM-DD", entry.date))?;
    if !is_hh_mm(&entry.time) {
        bail!("Invalid entry time '{}'. Must be HH:MM", entry.time);
    }
    Ok(())
}

fn is_hh_mm(s: &str) -> bool {
    chrono::NaiveTime::parse_from_str(s, "%H:%M").is_ok() && s.len() == 5
}

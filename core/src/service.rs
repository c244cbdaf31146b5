use anyhow::{Result, bail};
use chrono::NaiveDate;
use tracing::info;

use crate::clock::{self, ParsedTime};
use crate::csv_export;
use crate::csv_import::{self, CsvImport};
use crate::models::{
    DailyTotals, DayGroup, DaySummary, Entry, Goals, NewEntry, UpdateEntry, clean_note,
    validate_entry, validate_entry_amounts, validate_goals,
};
use crate::summary;

/// Persistent collection of entries.
///
/// The local SQLite database implements this directly; tests use an
/// in-memory vector. The hosted backend mirrors the same operations
/// asynchronously from the CLI.
pub trait EntryStore {
    fn load_all(&self) -> Result<Vec<Entry>>;
    /// Insert new entries, or overwrite existing ones with the same id.
    fn append_or_update(&self, entries: &[Entry]) -> Result<()>;
    fn remove(&self, id: &str) -> Result<bool>;

    fn find(&self, id: &str) -> Result<Option<Entry>> {
        Ok(self.load_all()?.into_iter().find(|e| e.id == id))
    }

    fn replace_all(&self, entries: &[Entry]) -> Result<()> {
        self.clear()?;
        self.append_or_update(entries)
    }

    fn clear(&self) -> Result<usize> {
        let all = self.load_all()?;
        for e in &all {
            self.remove(&e.id)?;
        }
        Ok(all.len())
    }
}

/// Per-owner daily goals. Last write wins.
pub trait GoalsStore {
    fn load_goals(&self, owner: Option<&str>) -> Result<Option<Goals>>;
    fn save_goals(&self, goals: &Goals) -> Result<()>;
}

pub struct IntakeService<S> {
    store: S,
    owner: Option<String>,
}

impl<S: EntryStore + GoalsStore> IntakeService<S> {
    pub fn new(store: S) -> Self {
        Self { store, owner: None }
    }

    /// Scope goals and new entries to a backend user id.
    #[must_use]
    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    // --- Entries ---

    pub fn entries(&self) -> Result<Vec<Entry>> {
        self.store.load_all()
    }

    pub fn get_entry(&self, id: &str) -> Result<Entry> {
        match self.store.find(id)? {
            Some(e) => Ok(e),
            None => bail!("Entry {id} not found"),
        }
    }

    pub fn log_entry(&self, new: &NewEntry) -> Result<Entry> {
        validate_entry_amounts(new.protein_g, new.water_l)?;
        let entry = Entry {
            id: uuid::Uuid::new_v4().to_string(),
            owner: new.owner.clone().or_else(|| self.owner.clone()),
            date: new.date.format("%Y-%m-%d").to_string(),
            time: normalize_time(&new.time)?,
            protein_g: new.protein_g,
            water_l: new.water_l,
            note: clean_note(new.note.as_deref()),
            created_at: None,
        };
        self.store.append_or_update(std::slice::from_ref(&entry))?;
        Ok(self.store.find(&entry.id)?.unwrap_or(entry))
    }

    pub fn update_entry(&self, id: &str, update: &UpdateEntry) -> Result<Entry> {
        if update.is_empty() {
            bail!("Nothing to update");
        }
        let mut entry = self.get_entry(id)?;

        let mut update = update.clone();
        if let Some(ref time) = update.time {
            update.time = Some(normalize_time(time)?);
        }
        entry.apply(&update);

        validate_entry_amounts(entry.protein_g, entry.water_l)?;
        validate_entry(&entry)?;
        self.store.append_or_update(std::slice::from_ref(&entry))?;
        Ok(entry)
    }

    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        self.store.remove(id)
    }

    /// Delete every entry. Goals are kept.
    pub fn reset(&self) -> Result<usize> {
        let n = self.store.clear()?;
        info!(deleted = n, "reset entries");
        Ok(n)
    }

    // --- Goals ---

    pub fn goals(&self) -> Result<Goals> {
        Ok(self
            .store
            .load_goals(self.owner())?
            .unwrap_or_else(|| Goals {
                owner: self.owner.clone(),
                ..Goals::default()
            }))
    }

    pub fn set_goals(&self, protein_g: Option<f64>, water_l: Option<f64>) -> Result<Goals> {
        if protein_g.is_none() && water_l.is_none() {
            bail!("Specify at least one of protein or water");
        }
        let mut goals = self.goals()?;
        if let Some(p) = protein_g {
            goals.daily_protein_g = p;
        }
        if let Some(w) = water_l {
            goals.daily_water_l = w;
        }
        validate_goals(&goals)?;
        self.store.save_goals(&goals)?;
        Ok(goals)
    }

    // --- Summaries ---

    pub fn day_summary(&self, date: NaiveDate) -> Result<DaySummary> {
        let entries = self.store.load_all()?;
        Ok(summary::day_summary(&entries, date, self.goals()?))
    }

    pub fn day_groups(&self) -> Result<Vec<DayGroup>> {
        Ok(summary::group_by_date(&self.store.load_all()?))
    }

    /// Totals for the last `days` days ending on `today`, oldest first.
    pub fn history(&self, days: u32, today: NaiveDate) -> Result<Vec<DailyTotals>> {
        let totals = summary::daily_totals(&self.store.load_all()?);
        Ok(summary::last_n_days(&totals, today, days))
    }

    // --- CSV ---

    /// Normalize `text` against the current log and append the accepted rows.
    ///
    /// With `dry_run` nothing is written; the returned report is identical.
    pub fn import_csv(&self, text: &str, dry_run: bool) -> Result<CsvImport> {
        let existing = self.store.load_all()?;
        let import = csv_import::normalize_csv(text, &existing, self.owner());

        if !dry_run && !import.entries.is_empty() {
            self.store.append_or_update(&import.entries)?;
        }
        info!(
            rows = import.rows_read,
            imported = import.entries.len(),
            skipped = import.skipped.skipped(),
            dry_run,
            "csv import"
        );
        Ok(import)
    }

    pub fn export_csv(&self) -> Result<String> {
        csv_export::export_csv(&self.store.load_all()?)
    }

    // --- Sync ---

    /// Overwrite the local log with a snapshot pulled from the backend.
    pub fn replace_from_remote(&self, entries: &[Entry], goals: Option<&Goals>) -> Result<()> {
        self.store.replace_all(entries)?;
        if let Some(goals) = goals {
            validate_goals(goals)?;
            self.store.save_goals(goals)?;
        }
        info!(entries = entries.len(), goals = goals.is_some(), "replaced local log from remote");
        Ok(())
    }
}

/// Normalize a user-typed time to `HH:MM`. Blank means now.
pub fn normalize_time(input: &str) -> Result<String> {
    if input.trim().is_empty() {
        return Ok(clock::now_hh_mm());
    }
    match clock::parse_clock_time(input) {
        ParsedTime::Clock(t) => Ok(clock::format_hh_mm(t)),
        ParsedTime::Unparseable => bail!("Invalid time '{input}'. Use HH:MM or H:MM am/pm"),
    }
}

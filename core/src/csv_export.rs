use anyhow::{Context, Result, anyhow};

use crate::models::Entry;

pub const EXPORT_HEADER: [&str; 5] = [
    "date",
    "time",
    "grams_of_protein",
    "liters_of_water",
    "note",
];

/// Serialize entries as CSV, oldest first.
///
/// The output reads back through [`crate::csv_import::normalize_csv`]: notes
/// containing commas or quotes are quoted.
pub fn export_csv(entries: &[Entry]) -> Result<String> {
    let mut sorted: Vec<&Entry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.time.cmp(&b.time)));

    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.write_record(EXPORT_HEADER)
        .context("Failed to write CSV header")?;
    for e in sorted {
        let protein = e.protein_g.to_string();
        let water = e.water_l.to_string();
        wtr.write_record([
            e.date.as_str(),
            e.time.as_str(),
            protein.as_str(),
            water.as_str(),
            e.note.as_deref().unwrap_or(""),
        ])
        .with_context(|| format!("Failed to write CSV row for entry {}", e.id))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV output: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Default file name for an export made on `date`.
#[must_use]
pub fn export_file_name(date: chrono::NaiveDate) -> String {
    format!("protein_water_{}.csv", date.format("%Y-%m-%d"))
}

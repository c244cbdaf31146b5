use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::clock::{self, ParsedTime};
use crate::models::Entry;

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)date\s*,\s*time").expect("header pattern is valid"));

/// Why a row did not make it into the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Summary,
    Undated,
    Blank,
    Duplicate,
}

/// Per-reason counts of rows left out of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipReport {
    pub header_skipped: bool,
    pub summary_rows: usize,
    pub undated_rows: usize,
    pub blank_rows: usize,
    pub duplicates: usize,
}

impl SkipReport {
    /// Data rows skipped. The header line is not counted.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.summary_rows + self.undated_rows + self.blank_rows + self.duplicates
    }

    fn record(&mut self, skip: Skip) {
        match skip {
            Skip::Summary => self.summary_rows += 1,
            Skip::Undated => self.undated_rows += 1,
            Skip::Blank => self.blank_rows += 1,
            Skip::Duplicate => self.duplicates += 1,
        }
    }
}

/// Result of normalizing a CSV file: accepted entries in file order.
#[derive(Debug, Clone, Serialize)]
pub struct CsvImport {
    pub rows_read: usize,
    pub entries: Vec<Entry>,
    pub skipped: SkipReport,
}

/// The five positional columns of an intake CSV row.
#[derive(Debug, Clone, Copy, Default)]
struct RawRow<'a> {
    date: &'a str,
    time: &'a str,
    protein: &'a str,
    water: &'a str,
    note: &'a str,
}

impl<'a> RawRow<'a> {
    fn from_record(record: &'a csv::StringRecord) -> Self {
        let field = |i: usize| record.get(i).unwrap_or("");
        Self {
            date: field(0),
            time: field(1),
            protein: field(2),
            water: field(3),
            note: field(4),
        }
    }

    fn fields(&self) -> [&'a str; 5] {
        [self.date, self.time, self.protein, self.water, self.note]
    }
}

/// Running state for one import batch.
struct Normalizer<'o> {
    owner: Option<&'o str>,
    current_date: Option<String>,
    last_time: Option<NaiveTime>,
    synthetic_minutes: u32,
    seen: HashSet<String>,
}

impl<'o> Normalizer<'o> {
    fn new(existing: &[Entry], owner: Option<&'o str>) -> Self {
        Self {
            owner,
            current_date: None,
            last_time: None,
            synthetic_minutes: 0,
            seen: existing.iter().map(Entry::dedup_key).collect(),
        }
    }

    fn row(&mut self, row: &RawRow<'_>) -> Result<Entry, Skip> {
        if row.fields().iter().any(|f| is_summary_word(f)) {
            return Err(Skip::Summary);
        }

        if !row.date.is_empty() {
            self.current_date =
                Some(normalize_date(row.date).unwrap_or_else(|| row.date.to_string()));
        }
        let date = self.current_date.clone().ok_or(Skip::Undated)?;

        let time = match clock::parse_clock_time(row.time) {
            ParsedTime::Clock(t) => t,
            ParsedTime::Unparseable => self.fabricate_time(),
        };
        self.last_time = Some(time);

        let protein_g = parse_amount(row.protein);
        let water_l = parse_amount(row.water);
        if protein_g == 0.0 && water_l == 0.0 && row.note.is_empty() {
            return Err(Skip::Blank);
        }

        let entry = Entry {
            id: Uuid::new_v4().to_string(),
            owner: self.owner.map(str::to_string),
            date,
            time: clock::format_hh_mm(time),
            protein_g,
            water_l,
            note: (!row.note.is_empty()).then(|| row.note.to_string()),
            created_at: None,
        };

        if self.seen.insert(entry.dedup_key()) {
            Ok(entry)
        } else {
            Err(Skip::Duplicate)
        }
    }

    /// A minute after the previous row, or `00:00`, `00:01`, ... before any time is known.
    fn fabricate_time(&mut self) -> NaiveTime {
        if let Some(last) = self.last_time {
            return clock::next_minute(last);
        }
        let t = clock::minutes_after_midnight(self.synthetic_minutes);
        self.synthetic_minutes += 1;
        t
    }
}

/// Normalize raw intake CSV text into new entries.
///
/// Columns are positional: `date,time,protein,water,note`. A first line that
/// looks like `date,time,...` is treated as a header. Malformed values never
/// fail the import; they fall back to defaults and rows that cannot be used
/// are counted in [`SkipReport`]. Rows identical to an entry in `existing`,
/// or to an earlier row of the same file, are dropped as duplicates.
#[must_use]
pub fn normalize_csv(text: &str, existing: &[Entry], owner: Option<&str>) -> CsvImport {
    let mut lines = text.lines().filter(|l| !l.is_empty()).peekable();
    let has_header = lines.peek().is_some_and(|l| HEADER.is_match(l));
    if has_header {
        lines.next();
    }

    let mut normalizer = Normalizer::new(existing, owner);
    let mut skipped = SkipReport {
        header_skipped: has_header,
        ..SkipReport::default()
    };
    let mut entries = Vec::new();
    let mut rows_read = 0;

    for line in lines {
        rows_read += 1;
        let record = split_line(line);

        match normalizer.row(&RawRow::from_record(&record)) {
            Ok(entry) => entries.push(entry),
            Err(skip) => {
                debug!(row = rows_read, reason = ?skip, "skipping CSV row");
                skipped.record(skip);
            }
        }
    }

    CsvImport {
        rows_read,
        entries,
        skipped,
    }
}

/// Split one line into trimmed fields. Quotes are honoured within the line;
/// an unclosed quote runs to the end of the line, never into the next one.
fn split_line(line: &str) -> csv::StringRecord {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match rdr.read_record(&mut record) {
        Ok(true) => record,
        _ => line.split(',').map(str::trim).collect(),
    }
}

fn is_summary_word(field: &str) -> bool {
    field.eq_ignore_ascii_case("total") || field.eq_ignore_ascii_case("subtotal")
}

/// Keep digits and dots, then parse. Anything unusable is zero.
fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Normalize a spreadsheet date to `YYYY-MM-DD` when the format is recognised.
fn normalize_date(raw: &str) -> Option<String> {
    if chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() {
        return Some(raw.to_string());
    }
    ["%m/%d/%Y", "%d/%m/%Y"].iter().find_map(|fmt| {
        chrono::NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
date,time,grams_of_protein,liters_of_water,note
2024-01-15,08:00,30,0.5,breakfast shake
2024-01-15,12:30 pm,45,,chicken
,7:45 PM,,1,
2024-01-16,09:00,20,0.25,
";

    fn times(import: &CsvImport) -> Vec<&str> {
        import.entries.iter().map(|e| e.time.as_str()).collect()
    }

    #[test]
    fn test_normalize_sample() {
        let import = normalize_csv(SAMPLE_CSV, &[], None);
        assert!(import.skipped.header_skipped);
        assert_eq!(import.rows_read, 4);
        assert_eq!(import.entries.len(), 4);
        assert_eq!(import.skipped.skipped(), 0);

        let first = &import.entries[0];
        assert_eq!(first.date, "2024-01-15");
        assert_eq!(first.time, "08:00");
        assert!((first.protein_g - 30.0).abs() < f64::EPSILON);
        assert!((first.water_l - 0.5).abs() < f64::EPSILON);
        assert_eq!(first.note.as_deref(), Some("breakfast shake"));

        let third = &import.entries[2];
        assert_eq!(third.date, "2024-01-15");
        assert_eq!(third.time, "19:45");
        assert!((third.protein_g - 0.0).abs() < f64::EPSILON);
        assert!((third.water_l - 1.0).abs() < f64::EPSILON);
        assert!(third.note.is_none());
    }

    #[test]
    fn test_header_detection() {
        let with_header = normalize_csv("Date,Time,Protein,Water,Note\n2024-01-01,08:00,30,0.5,\n", &[], None);
        assert!(with_header.skipped.header_skipped);
        assert_eq!(with_header.entries.len(), 1);

        let without_header = normalize_csv("2024-01-01,08:00,30,0.5,\n", &[], None);
        assert!(!without_header.skipped.header_skipped);
        assert_eq!(without_header.entries.len(), 1);
        assert_eq!(without_header.entries[0].date, "2024-01-01");
    }

    #[test]
    fn test_header_with_spaces_and_leading_blank_lines() {
        let csv = "\n\nDATE , TIME, protein\n2024-01-01,08:00,30,,\n";
        let import = normalize_csv(csv, &[], None);
        assert!(import.skipped.header_skipped);
        assert_eq!(import.entries.len(), 1);
    }

    #[test]
    fn test_time_normalization() {
        let csv = "\
2024-01-01,8:05 PM,1,,
2024-01-01,12:00 AM,2,,
2024-01-01,12:30 pm,3,,
2024-01-01,9:00,4,,
";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(times(&import), vec!["20:05", "00:00", "12:30", "09:00"]);
    }

    #[test]
    fn test_date_carry_forward() {
        let csv = "2024-01-01,08:00,30,0,\n,09:00,20,0,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 2);
        assert!(import.entries.iter().all(|e| e.date == "2024-01-01"));
    }

    #[test]
    fn test_undated_rows_before_first_date_are_skipped() {
        let csv = ",08:00,30,0,\n2024-01-01,09:00,20,0,\n,10:00,10,0,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 2);
        assert_eq!(import.skipped.undated_rows, 1);
        assert_eq!(times(&import), vec!["09:00", "10:00"]);
    }

    #[test]
    fn test_summary_rows_are_skipped() {
        let csv = "\
2024-01-01,08:00,30,0.5,
Total,,30,0.5,
2024-01-01,09:00,10,0,
,,40,0.5,subtotal
";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 2);
        assert_eq!(import.skipped.summary_rows, 2);
    }

    #[test]
    fn test_summary_word_must_be_whole_field() {
        let csv = "2024-01-01,08:00,30,0,total recall\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 1);
        assert_eq!(import.entries[0].note.as_deref(), Some("total recall"));
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let csv = "2024-01-01,08:00,30,0,\n2024-01-01,09:00,,,\n2024-01-01,10:00,0,0.0,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 1);
        assert_eq!(import.skipped.blank_rows, 2);
    }

    #[test]
    fn test_fabricated_times_without_prior_time() {
        let csv = "2024-01-01,,30,,\n2024-01-01,soon,20,,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(times(&import), vec!["00:00", "00:01"]);
    }

    #[test]
    fn test_fabricated_time_follows_previous_row() {
        let csv = "2024-01-01,23:59,30,,\n,,20,,\n,??,10,,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(times(&import), vec!["23:59", "00:00", "00:01"]);
    }

    #[test]
    fn test_blank_row_still_advances_the_clock() {
        let csv = "2024-01-01,08:00,30,,\n,,,,\n,,20,,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(times(&import), vec!["08:00", "08:02"]);
        assert_eq!(import.skipped.blank_rows, 1);
    }

    #[test]
    fn test_amounts_strip_junk() {
        let csv = "2024-01-01,08:00,30g,0.5 L,\n2024-01-01,09:00,1.2.3,abc,note\n2024-01-01,10:00,-20,,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 3);
        assert!((import.entries[0].protein_g - 30.0).abs() < f64::EPSILON);
        assert!((import.entries[0].water_l - 0.5).abs() < f64::EPSILON);
        assert!((import.entries[1].protein_g - 0.0).abs() < f64::EPSILON);
        assert!((import.entries[1].water_l - 0.0).abs() < f64::EPSILON);
        assert!((import.entries[2].protein_g - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let first = normalize_csv(SAMPLE_CSV, &[], None);
        assert_eq!(first.entries.len(), 4);

        let second = normalize_csv(SAMPLE_CSV, &first.entries, None);
        assert!(second.entries.is_empty());
        assert_eq!(second.skipped.duplicates, 4);
    }

    #[test]
    fn test_duplicates_within_one_file() {
        let csv = "2024-01-01,08:00,30,0,\n2024-01-01,08:00,30,0,\n2024-01-01,08:00,30,0,x\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 2);
        assert_eq!(import.skipped.duplicates, 1);
    }

    #[test]
    fn test_ids_are_unique_and_owner_is_set() {
        let import = normalize_csv(SAMPLE_CSV, &[], Some("user-1"));
        let ids: HashSet<&str> = import.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), import.entries.len());
        assert!(
            import
                .entries
                .iter()
                .all(|e| e.owner.as_deref() == Some("user-1"))
        );
    }

    #[test]
    fn test_quoted_note_with_comma() {
        let csv = "2024-01-01,08:00,30,0,\"eggs, toast\"\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 1);
        assert_eq!(import.entries[0].note.as_deref(), Some("eggs, toast"));
    }

    #[test]
    fn test_unclosed_quote_stays_on_its_line() {
        let csv = "2024-01-01,08:00,30,0,\"big shake\n2024-01-02,09:00,20,0,\n2024-01-03,10:00,10,0,\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.rows_read, 3);
        assert_eq!(import.entries.len(), 3);
        let note = import.entries[0].note.as_deref().unwrap();
        assert!(note.starts_with("big shake"));
        assert!(!note.contains('\n'));
        let dates: Vec<&str> = import.entries.iter().map(|e| e.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let csv = "2024-01-01,08:00,30,0,eggs,toast,jam\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries[0].note.as_deref(), Some("eggs"));
    }

    #[test]
    fn test_short_rows_default_missing_fields() {
        let csv = "2024-01-01,08:00,30\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 1);
        assert!((import.entries[0].water_l - 0.0).abs() < f64::EPSILON);
        assert!(import.entries[0].note.is_none());
    }

    #[test]
    fn test_crlf_line_endings() {
        let csv = "date,time,p,w,n\r\n2024-01-01,08:00,30,0,\r\n,09:00,20,0,\r\n";
        let import = normalize_csv(csv, &[], None);
        assert_eq!(import.entries.len(), 2);
        assert_eq!(import.entries[1].date, "2024-01-01");
    }

    #[test]
    fn test_dates_are_normalized() {
        let csv = "1/15/2024,08:00,30,,\n2024-01-16,08:00,30,,\nyesterday,08:00,30,,\n";
        let import = normalize_csv(csv, &[], None);
        let dates: Vec<&str> = import.entries.iter().map(|e| e.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-15", "2024-01-16", "yesterday"]);
    }

    #[test]
    fn test_empty_input() {
        let import = normalize_csv("", &[], None);
        assert!(import.entries.is_empty());
        assert_eq!(import.rows_read, 0);
        assert!(!import.skipped.header_skipped);
    }

    #[test]
    fn test_parse_amount() {
        assert!((parse_amount("35") - 35.0).abs() < f64::EPSILON);
        assert!((parse_amount(" 0.5L") - 0.5).abs() < f64::EPSILON);
        assert!((parse_amount(".") - 0.0).abs() < f64::EPSILON);
        assert!((parse_amount("") - 0.0).abs() < f64::EPSILON);
    }
}

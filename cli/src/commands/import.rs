use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use intake_core::csv_export::export_file_name;
use intake_core::csv_import::CsvImport;

use super::Service;
use crate::remote::{RemoteClient, mirror};

fn report_json(import: &CsvImport, dry_run: bool, synced: Option<bool>) -> serde_json::Value {
    serde_json::json!({
        "dry_run": dry_run,
        "rows_read": import.rows_read,
        "imported": import.entries.len(),
        "skipped": import.skipped,
        "synced": synced,
    })
}

pub(crate) async fn cmd_import(
    svc: &Service,
    remote: Option<&RemoteClient>,
    path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let import = svc.import_csv(&text, dry_run)?;

    let synced = match remote {
        Some(remote) if !dry_run && !import.entries.is_empty() => {
            Some(mirror("import", remote.append(&import.entries)).await.is_some())
        }
        _ => None,
    };

    if json {
        println!("{}", report_json(&import, dry_run, synced));
        return Ok(());
    }

    let s = &import.skipped;
    if dry_run {
        println!("Dry run — no changes made.\n");
        println!("  Rows read:       {}", import.rows_read);
        println!("  Entries to add:  {}", import.entries.len());
    } else {
        println!("Import complete.\n");
        println!("  Rows read:       {}", import.rows_read);
        println!("  Entries added:   {}", import.entries.len());
    }
    println!("  Duplicates:      {}", s.duplicates);
    println!("  Blank rows:      {}", s.blank_rows);
    println!("  Summary rows:    {}", s.summary_rows);
    println!("  Undated rows:    {}", s.undated_rows);
    if synced == Some(false) {
        eprintln!("\nWarning: entries were saved locally but not synced to the backend.");
    }

    Ok(())
}

pub(crate) fn cmd_export(
    svc: &Service,
    output: Option<PathBuf>,
    stdout: bool,
    json: bool,
) -> Result<()> {
    let csv = svc.export_csv()?;

    if stdout {
        print!("{csv}");
        return Ok(());
    }

    let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(Local::now().date_naive())));
    std::fs::write(&path, &csv)
        .with_context(|| format!("Failed to write file: {}", path.display()))?;

    // Header line excluded.
    let rows = csv.lines().count().saturating_sub(1);
    if json {
        println!(
            "{}",
            serde_json::json!({ "path": path.display().to_string(), "entries": rows })
        );
    } else {
        println!("Exported {rows} entries to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::db::Database;
    use intake_core::service::IntakeService;

    const SAMPLE: &str = "Date,Time,Protein,Water,Note\n\
        2024-01-01,8:00 AM,30,0.5,\n\
        ,12:30 pm,45,,lunch\n\
        Total,,75,0.5,\n";

    fn svc() -> Service {
        IntakeService::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let svc = svc();
        cmd_import(&svc, None, &path, false, true).await.unwrap();
        assert_eq!(svc.entries().unwrap().len(), 2);

        // Second run adds nothing.
        cmd_import(&svc, None, &path, false, true).await.unwrap();
        assert_eq!(svc.entries().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let svc = svc();
        cmd_import(&svc, None, &path, true, false).await.unwrap();
        assert!(svc.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let svc = svc();
        let err = cmd_import(&svc, None, Path::new("/nonexistent/log.csv"), false, false)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read file"));
    }

    #[test]
    fn test_report_json() {
        let svc = svc();
        let import = svc.import_csv(SAMPLE, true).unwrap();
        let v = report_json(&import, true, None);
        assert_eq!(v["imported"], 2);
        assert_eq!(v["skipped"]["summary_rows"], 1);
        assert_eq!(v["skipped"]["header_skipped"], true);
        assert!(v["synced"].is_null());
    }

    #[tokio::test]
    async fn test_export_to_file_then_reimport() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.csv");
        let out = dir.path().join("out.csv");
        std::fs::write(&src, SAMPLE).unwrap();

        let svc = svc();
        cmd_import(&svc, None, &src, false, true).await.unwrap();
        cmd_export(&svc, Some(out.clone()), false, true).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.starts_with("date,time,grams_of_protein,liters_of_water,note\n"));
        assert!(written.contains("2024-01-01,12:30,45,0,lunch"));

        cmd_import(&svc, None, &out, false, true).await.unwrap();
        assert_eq!(svc.entries().unwrap().len(), 2);
    }
}

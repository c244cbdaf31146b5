use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use super::Service;
use super::helpers::{no_neg_zero, parse_date, progress_bar, truncate};

const BAR_WIDTH: usize = 20;

pub(crate) fn cmd_summary(svc: &Service, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let summary = svc.day_summary(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.entries.is_empty() {
        let date = &summary.date;
        eprintln!("No entries for {date}");
        process::exit(2);
    }

    let date = &summary.date;
    println!("=== {date} ===\n");

    for e in &summary.entries {
        let time = &e.time;
        let protein = e.protein_g;
        let water = e.water_l;
        let note = e
            .note
            .as_deref()
            .map(|n| format!(" — {}", truncate(n, 40)))
            .unwrap_or_default();
        println!("  {time}  P:{protein:>5.1}g  W:{water:>5.2}L{note}  [{}]", e.id);
    }
    println!();

    let p = &summary.protein;
    let w = &summary.water;
    println!(
        "  PROTEIN {} {:.1} / {:.0} g",
        progress_bar(p, BAR_WIDTH),
        p.total,
        p.goal
    );
    println!(
        "  WATER   {} {:.2} / {:.2} L",
        progress_bar(w, BAR_WIDTH),
        w.total,
        w.goal
    );

    let rp = no_neg_zero(p.remaining().max(0.0));
    let rw = no_neg_zero(w.remaining().max(0.0));
    println!("  REMAINING: P:{rp:.1}g W:{rw:.2}L");

    Ok(())
}

pub(crate) fn cmd_history(svc: &Service, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Entries")]
        entries: usize,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Water")]
        water: String,
        #[tabled(rename = "Protein %")]
        protein_pct: String,
        #[tabled(rename = "Water %")]
        water_pct: String,
    }

    let today = Local::now().date_naive();
    let totals = svc.history(days, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
        return Ok(());
    }

    if totals.is_empty() {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let goals = svc.goals()?;
    let rows: Vec<HistoryRow> = totals
        .iter()
        .rev()
        .map(|t| {
            let p = no_neg_zero(t.protein_g);
            let w = no_neg_zero(t.water_l);
            let ppct = 100.0 * p / goals.daily_protein_g.max(1.0);
            let wpct = 100.0 * w / goals.daily_water_l.max(1.0);
            HistoryRow {
                date: t.date.clone(),
                entries: t.entry_count,
                protein: format!("{p:.1}g"),
                water: format!("{w:.2}L"),
                protein_pct: format!("{ppct:.0}%"),
                water_pct: format!("{wpct:.0}%"),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

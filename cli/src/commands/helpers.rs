use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use intake_core::models::GoalProgress;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse an amount like "30", "30g", "0.5", "0.5l" or "500ml" (water only).
pub(crate) fn parse_amount(label: &str, s: &str, unit: &str) -> Result<f64> {
    let s = s.trim().to_lowercase();
    let (number, divisor) = if unit == "l" && s.ends_with("ml") {
        (s.trim_end_matches("ml"), 1000.0)
    } else {
        (s.trim_end_matches(unit), 1.0)
    };
    let value: f64 = number
        .trim()
        .parse()
        .with_context(|| format!("Invalid {label} amount: '{s}'"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("{label} must be a non-negative number");
    }
    Ok(value / divisor)
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Text progress bar, e.g. `[#####---------------]  25%`. Overshoot fills the bar.
pub(crate) fn progress_bar(progress: &GoalProgress, width: usize) -> String {
    #[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((progress.bar_percent() / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    let pct = no_neg_zero(progress.percent.round());
    format!(
        "[{}{}] {pct:>3.0}%",
        "#".repeat(filled),
        "-".repeat(width - filled)
    )
}

//! Clock-time recognition for hand-typed and spreadsheet-exported times.
//!
//! Accepts `H:MM` or `HH:MM`, an optional `:SS`, and an optional `am`/`pm`
//! suffix (any case, optional whitespace before it). The first clock found in
//! the text wins, with 12-hour matches preferred over bare 24-hour ones, so
//! `"at 8:05 PM"` and `"2024-01-01 20:05"` both resolve.

use chrono::{Duration, NaiveTime, Timelike};

/// Result of parsing a clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    Clock(NaiveTime),
    Unparseable,
}

impl ParsedTime {
    #[must_use]
    pub fn time(self) -> Option<NaiveTime> {
        match self {
            Self::Clock(t) => Some(t),
            Self::Unparseable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

struct ClockMatch {
    hour: u32,
    minute: u32,
    end: usize,
}

/// Parse a clock time from free text.
#[must_use]
pub fn parse_clock_time(input: &str) -> ParsedTime {
    let s = input.trim().as_bytes();

    if let Some(t) = find_clock(s, twelve_hour_at) {
        return ParsedTime::Clock(t);
    }
    if let Some(t) = find_clock(s, twenty_four_hour_at) {
        return ParsedTime::Clock(t);
    }
    ParsedTime::Unparseable
}

/// Format as 24-hour `HH:MM`.
#[must_use]
pub fn format_hh_mm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// One minute later, wrapping past midnight.
#[must_use]
pub fn next_minute(t: NaiveTime) -> NaiveTime {
    t.overflowing_add_signed(Duration::minutes(1)).0
}

/// `00:00` plus `n` minutes, wrapping every 24 hours.
#[must_use]
pub fn minutes_after_midnight(n: u32) -> NaiveTime {
    let n = n % (24 * 60);
    NaiveTime::from_hms_opt(n / 60, n % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Current local wall-clock time truncated to the minute.
#[must_use]
pub fn now_hh_mm() -> String {
    let now = chrono::Local::now().time();
    format!("{:02}:{:02}", now.hour(), now.minute())
}

// A clock may not start inside a run of digits: "123:45" is not 23:45.
fn find_clock(s: &[u8], matcher: fn(&[u8], usize) -> Option<NaiveTime>) -> Option<NaiveTime> {
    (0..s.len())
        .filter(|&i| i == 0 || !s[i - 1].is_ascii_digit())
        .find_map(|i| matcher(s, i))
}

fn twelve_hour_at(s: &[u8], start: usize) -> Option<NaiveTime> {
    let m = clock_at(s, start)?;
    let meridiem = meridiem_at(s, m.end)?;
    if !(1..=12).contains(&m.hour) {
        return None;
    }
    let hour = match (meridiem, m.hour) {
        (Meridiem::Am, 12) => 0,
        (Meridiem::Pm, h) if h < 12 => h + 12,
        (_, h) => h,
    };
    NaiveTime::from_hms_opt(hour, m.minute, 0)
}

fn twenty_four_hour_at(s: &[u8], start: usize) -> Option<NaiveTime> {
    let m = clock_at(s, start)?;
    NaiveTime::from_hms_opt(m.hour, m.minute, 0)
}

fn clock_at(s: &[u8], start: usize) -> Option<ClockMatch> {
    let hour_len = s[start..].iter().take_while(|b| b.is_ascii_digit()).count();
    if !(1..=2).contains(&hour_len) {
        return None;
    }
    let colon = start + hour_len;
    if s.get(colon) != Some(&b':') {
        return None;
    }
    let minute = two_digits_at(s, colon + 1)?;
    let hour = s[start..colon]
        .iter()
        .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'));

    let mut end = colon + 3;
    if s.get(end) == Some(&b':') && two_digits_at(s, end + 1).is_some() {
        end += 3;
    }
    Some(ClockMatch { hour, minute, end })
}

fn two_digits_at(s: &[u8], at: usize) -> Option<u32> {
    let d = s.get(at..at + 2)?;
    if !d.iter().all(u8::is_ascii_digit) || s.get(at + 2).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    Some(u32::from(d[0] - b'0') * 10 + u32::from(d[1] - b'0'))
}

fn meridiem_at(s: &[u8], at: usize) -> Option<Meridiem> {
    let mut i = at;
    while s.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    let word = s.get(i..i + 2)?;
    if s.get(i + 2).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    if word.eq_ignore_ascii_case(b"am") {
        Some(Meridiem::Am)
    } else if word.eq_ignore_ascii_case(b"pm") {
        Some(Meridiem::Pm)
    } else {
        None
    }
}

//! Date cell parsing for the `date` column.

use chrono::NaiveDate;
use influencer_core::config::DateFormat;

/// Parse a date cell under the configured format.
///
/// `Auto` tries `YYYY-MM-DD` first. Slash dates are read as `MM/DD/YYYY`
/// and only fall back to `DD/MM/YYYY` when the first field cannot be a
/// month, so `03/04/2024` is 4 March and `25/12/2024` is 25 December.
pub fn parse_date(cell: &str, format: DateFormat) -> Result<NaiveDate, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Err("empty date".to_string());
    }

    let parsed = match format {
        DateFormat::Iso => parse_iso(cell),
        DateFormat::DayFirst => parse_slash(cell, SlashOrder::DayFirst),
        DateFormat::MonthFirst => parse_slash(cell, SlashOrder::MonthFirst),
        DateFormat::Auto => parse_iso(cell)
            .or_else(|| parse_slash(cell, SlashOrder::MonthFirst))
            .or_else(|| parse_slash(cell, SlashOrder::DayFirst)),
    };

    parsed.ok_or_else(|| match format {
        DateFormat::Iso => "expected YYYY-MM-DD".to_string(),
        DateFormat::DayFirst => "expected DD/MM/YYYY".to_string(),
        DateFormat::MonthFirst => "expected MM/DD/YYYY".to_string(),
        DateFormat::Auto => "expected YYYY-MM-DD or MM/DD/YYYY".to_string(),
    })
}

#[derive(Clone, Copy)]
enum SlashOrder {
    DayFirst,
    MonthFirst,
}

fn parse_iso(cell: &str) -> Option<NaiveDate> {
    // Spreadsheet exports often carry a midnight time part.
    let date_part = cell
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(cell);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn parse_slash(cell: &str, order: SlashOrder) -> Option<NaiveDate> {
    let mut parts = cell.split('/');
    let first: u32 = parts.next()?.trim().parse().ok()?;
    let second: u32 = parts.next()?.trim().parse().ok()?;
    let year_part = parts.next()?.trim();
    if parts.next().is_some() || year_part.len() != 4 {
        return None;
    }
    let year: i32 = year_part.parse().ok()?;

    let (day, month) = match order {
        SlashOrder::DayFirst => (first, second),
        SlashOrder::MonthFirst => (second, first),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{DATE_FORMAT, ItemRecord};
use larder_core::stats::{ExpiryStatus, days_left};

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    match s {
        "today" => Ok(Local::now().date_naive()),
        "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
        "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
        _ => NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// An item annotated with where it stands relative to `now`.
#[derive(Serialize)]
pub(crate) struct ItemView<'a> {
    #[serde(flatten)]
    pub item: &'a ItemRecord,
    pub days_left: i64,
    pub status: &'static str,
}

impl<'a> ItemView<'a> {
    pub fn new(item: &'a ItemRecord, now: DateTime<Utc>) -> Self {
        let days = days_left(item.expiry_date, now);
        Self {
            item,
            days_left: days,
            status: ExpiryStatus::from_days_left(days).label(),
        }
    }
}

pub(crate) fn print_item_table(items: &[&ItemRecord], now: DateTime<Utc>) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Expires")]
        expires: String,
        #[tabled(rename = "Days left")]
        days_left: i64,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Remind")]
        reminder: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .map(|item| {
            let view = ItemView::new(item, now);
            ItemRow {
                id: item.id,
                name: truncate(&item.name, 35),
                category: item.category.to_string(),
                expires: item.expiry_date.format(DATE_FORMAT).to_string(),
                days_left: view.days_left,
                status: view.status.to_string(),
                reminder: if item.notified {
                    "sent".to_string()
                } else {
                    format!("{}d", item.reminder_days)
                },
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::models::Category;

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date("today").unwrap(), today);
        assert_eq!(
            parse_date("yesterday").unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date("tomorrow").unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date("2024-01-15").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("nope").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_json_error_escapes() {
        let out = json_error("Item \"7\" not found");
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["error"], "Item \"7\" not found");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Milk", 10), "Milk");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("日清カップヌードル", 8), "日清カップ...");
    }

    #[test]
    fn test_item_view_serializes_status() {
        let item = ItemRecord {
            id: 1,
            name: "Milk".to_string(),
            category: Category::Food,
            expiry_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            reminder_days: 3,
            notified: false,
        };
        let now = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(ItemView::new(&item, now)).unwrap();
        assert_eq!(json["name"], "Milk");
        assert_eq!(json["days_left"], 2);
        assert_eq!(json["status"], "expiring soon");
    }
}

use anyhow::{Result, bail};
use chrono::Utc;

use larder_core::db::Database;
use larder_core::models::{Category, DATE_FORMAT, NewItem};
use larder_core::stats::{ExpiryStatus, days_left, upcoming_alerts};

use super::helpers::{ItemView, exit_not_found, parse_date, print_item_table};

pub(crate) fn cmd_add(
    db: &Database,
    name: &str,
    expiry: &str,
    category: &str,
    reminder_days: i64,
    json: bool,
) -> Result<()> {
    let item = db.insert_item(&NewItem {
        name: name.to_string(),
        category: category.parse::<Category>()?,
        expiry_date: parse_date(expiry)?,
        reminder_days,
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ItemView::new(&item, Utc::now()))?
        );
    } else {
        println!(
            "Added #{} {} ({}) expiring {}",
            item.id,
            item.name,
            item.category,
            item.expiry_date.format(DATE_FORMAT)
        );
    }
    Ok(())
}

pub(crate) fn cmd_list(db: &Database, json: bool) -> Result<()> {
    let items = db.list_items()?;
    let now = Utc::now();

    if json {
        let views: Vec<ItemView> = items.iter().map(|i| ItemView::new(i, now)).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if items.is_empty() {
        eprintln!("No items yet. Use `larder add <name> <expiry>` to track one.");
    } else {
        let refs: Vec<&_> = items.iter().collect();
        print_item_table(&refs, now);
    }
    Ok(())
}

pub(crate) fn cmd_alerts(db: &Database, within_days: i64, json: bool) -> Result<()> {
    let items = db.list_items()?;
    let now = Utc::now();
    let alerts = upcoming_alerts(&items, now, within_days);

    if json {
        let views: Vec<ItemView> = alerts.iter().map(|i| ItemView::new(i, now)).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    if alerts.is_empty() {
        eprintln!("Nothing expires within {within_days} days.");
        return Ok(());
    }

    let statuses: Vec<ExpiryStatus> = alerts
        .iter()
        .map(|i| ExpiryStatus::from_days_left(days_left(i.expiry_date, now)))
        .collect();
    let expired = statuses.iter().filter(|s| **s == ExpiryStatus::Expired).count();
    let urgent = statuses.iter().filter(|s| **s == ExpiryStatus::ExpiringSoon).count();
    print_item_table(&alerts, now);
    println!("{} alert(s): {expired} expired, {urgent} urgent", alerts.len());
    Ok(())
}

pub(crate) fn cmd_edit(
    db: &Database,
    id: i64,
    name: Option<String>,
    expiry: Option<&str>,
    category: Option<&str>,
    reminder_days: Option<i64>,
    json: bool,
) -> Result<()> {
    if name.is_none() && expiry.is_none() && category.is_none() && reminder_days.is_none() {
        bail!("Nothing to change. Pass at least one of --name, --expiry, --category, --reminder");
    }

    let Some(current) = db.get_item(id)? else {
        exit_not_found(&format!("Item {id} not found"), json);
    };

    let edited = NewItem {
        name: name.unwrap_or(current.name),
        category: category.map_or(Ok(current.category), str::parse)?,
        expiry_date: expiry.map_or(Ok(current.expiry_date), parse_date)?,
        reminder_days: reminder_days.unwrap_or(current.reminder_days),
    };

    let Some(item) = db.update_item(id, &edited)? else {
        exit_not_found(&format!("Item {id} not found"), json);
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ItemView::new(&item, Utc::now()))?
        );
    } else {
        println!(
            "Updated #{} {} ({}) expiring {}",
            item.id,
            item.name,
            item.category,
            item.expiry_date.format(DATE_FORMAT)
        );
    }
    Ok(())
}

pub(crate) fn cmd_notified(db: &Database, id: i64, clear: bool, json: bool) -> Result<()> {
    if !db.set_notified(id, !clear)? {
        exit_not_found(&format!("Item {id} not found"), json);
    }
    if json {
        println!(
            "{}",
            serde_json::json!({ "id": id, "notified": !clear })
        );
    } else if clear {
        println!("Cleared reminder flag on item {id}");
    } else {
        println!("Marked item {id} as notified");
    }
    Ok(())
}

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reminder lead time used when an item is added without one.
pub const DEFAULT_REMINDER_DAYS: i64 = 3;

pub const MAX_NAME_LEN: usize = 200;

/// Calendar dates are stored and transmitted as `YYYY-MM-DD`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Medicine,
    Document,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Food,
        Category::Medicine,
        Category::Document,
        Category::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Food => "Food",
            Self::Medicine => "Medicine",
            Self::Document => "Document",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().to_lowercase() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
                anyhow::anyhow!(
                    "Invalid category '{s}'. Must be one of: {}",
                    names.join(", ")
                )
            })
    }
}

/// A row in the device-local item store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRecord {
    pub id: i64,
    pub name: String,
    pub category: Category,
    pub expiry_date: NaiveDate,
    pub reminder_days: i64,
    pub notified: bool,
}

impl ItemRecord {
    #[must_use]
    pub fn to_push_item(&self) -> PushItem {
        PushItem {
            id: self.id,
            name: self.name.clone(),
            category: self.category,
            expiry_date: self.expiry_date,
            reminder_days: self.reminder_days,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub category: Category,
    pub expiry_date: NaiveDate,
    pub reminder_days: i64,
}

// --- Wire types ---

/// A record as sent by a device in `POST /sync/{ns}`. `id` is the device-local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushItem {
    pub id: i64,
    pub name: String,
    pub category: Category,
    pub expiry_date: NaiveDate,
    #[serde(default = "default_reminder_days")]
    pub reminder_days: i64,
}

/// A record as returned by `GET /sync/{ns}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub local_id: i64,
    pub name: String,
    pub category: Category,
    pub expiry_date: NaiveDate,
    pub reminder_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPushRequest {
    #[serde(default)]
    pub items: Vec<PushItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPushResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: bool,
}

fn default_reminder_days() -> i64 {
    DEFAULT_REMINDER_DAYS
}

// --- Validation ---

pub fn validate_item_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Item name must not be empty");
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        bail!("Item name must be at most {MAX_NAME_LEN} characters");
    }
    Ok(trimmed.to_string())
}

pub fn validate_reminder_days(days: i64) -> Result<()> {
    if days < 0 {
        bail!("reminderDays must not be negative (got {days})");
    }
    Ok(())
}

/// Validate a new or edited local item, normalizing its name.
pub fn validate_new_item(item: &mut NewItem) -> Result<()> {
    item.name = validate_item_name(&item.name)?;
    validate_reminder_days(item.reminder_days)?;
    Ok(())
}

/// Validate a pushed record: positive id, non-empty name, non-negative reminder.
pub fn validate_push_item(item: &PushItem) -> Result<()> {
    if item.id < 1 {
        bail!("Item id must be a positive integer (got {})", item.id);
    }
    validate_item_name(&item.name)
        .map_err(|e| anyhow::anyhow!("Item {}: {e}", item.id))?;
    validate_reminder_days(item.reminder_days)
        .map_err(|e| anyhow::anyhow!("Item {}: {e}", item.id))?;
    Ok(())
}

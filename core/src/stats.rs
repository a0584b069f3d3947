//! Expiry statistics shared by the server aggregation and the local fallback.
//!
//! Both paths call [`compute_stats`] so the numbers a device shows never depend
//! on whether the server was reachable.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ItemRecord;

/// Items with `0 <= days_left <= EXPIRING_SOON_DAYS` count as expiring soon.
pub const EXPIRING_SOON_DAYS: i64 = 3;

/// Default look-ahead for [`upcoming_alerts`].
pub const ALERT_WINDOW_DAYS: i64 = 14;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryStats {
    pub total: u64,
    pub expiring_soon: u64,
    pub expired: u64,
    /// Records not (yet) expired. A proxy, not a measure of waste averted.
    pub saved: u64,
}

impl ExpiryStats {
    /// `saved / total` as a whole percentage, rounded half up. An empty set
    /// reports 0.
    #[must_use]
    pub fn saved_percent(&self) -> u64 {
        let total = self.total.max(1);
        (self.saved * 100 + total / 2) / total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Expired,
    ExpiringSoon,
    Fresh,
}

impl ExpiryStatus {
    #[must_use]
    pub fn from_days_left(days_left: i64) -> Self {
        if days_left < 0 {
            Self::Expired
        } else if days_left <= EXPIRING_SOON_DAYS {
            Self::ExpiringSoon
        } else {
            Self::Fresh
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::ExpiringSoon => "expiring soon",
            Self::Fresh => "fresh",
        }
    }
}

/// `ceil((expiry_date at 00:00 UTC - now) / 1 day)`.
///
/// An item expiring today reports 0 for the whole day, and -1 from the
/// following midnight on.
#[must_use]
pub fn days_left(expiry_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let expiry = expiry_date.and_time(chrono::NaiveTime::MIN).and_utc();
    let millis = (expiry - now).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        days
    } else {
        days + 1
    }
}

#[must_use]
pub fn expiry_status(expiry_date: NaiveDate, now: DateTime<Utc>) -> ExpiryStatus {
    ExpiryStatus::from_days_left(days_left(expiry_date, now))
}

pub fn compute_stats<I>(expiry_dates: I, now: DateTime<Utc>) -> ExpiryStats
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut stats = ExpiryStats::default();
    for date in expiry_dates {
        stats.total += 1;
        match expiry_status(date, now) {
            ExpiryStatus::Expired => stats.expired += 1,
            ExpiryStatus::ExpiringSoon => stats.expiring_soon += 1,
            ExpiryStatus::Fresh => {}
        }
    }
    stats.saved = stats.total - stats.expired;
    stats
}

/// Items already expired or expiring within `within_days`, soonest first.
pub fn upcoming_alerts(
    items: &[ItemRecord],
    now: DateTime<Utc>,
    within_days: i64,
) -> Vec<&ItemRecord> {
    let mut alerts: Vec<&ItemRecord> = items
        .iter()
        .filter(|item| days_left(item.expiry_date, now) <= within_days)
        .collect();
    alerts.sort_by_key(|item| (item.expiry_date, item.id));
    alerts
}

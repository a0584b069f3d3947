use anyhow::{Context, Result};
use tracing::info;

use crate::db::Database;
use crate::namespace::Namespace;

/// `user_settings` key holding the joined household id, if any.
pub const HOUSEHOLD_SETTING_KEY: &str = "household_id";

/// Maps this device to the namespace its sync passes target.
pub struct HouseholdResolver<'a> {
    db: &'a Database,
}

impl<'a> HouseholdResolver<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// The household id if one is joined, otherwise this installation's device id.
    /// The device id is generated and stored on the first call, so that one call
    /// writes; every later call only reads.
    pub fn resolve(&self) -> Result<Namespace> {
        if let Some(household) = self.current()? {
            return Namespace::parse(&household)
                .with_context(|| format!("Stored household id '{household}' is invalid"));
        }
        let device_id = self.db.get_or_create_device_id()?;
        Namespace::parse(&device_id).context("Stored device id is not a valid namespace")
    }

    pub fn current(&self) -> Result<Option<String>> {
        self.db.get_setting(HOUSEHOLD_SETTING_KEY)
    }

    /// Persist a household id, normalized to uppercase. Server rows already
    /// pushed under the previous namespace stay where they are.
    pub fn join(&self, raw: &str) -> Result<Namespace> {
        let namespace = Namespace::household(raw)?;
        self.db
            .set_setting(HOUSEHOLD_SETTING_KEY, namespace.as_str())?;
        info!(household = %namespace, "joined household");
        Ok(namespace)
    }

    /// Clear the household setting. Returns whether one was set.
    pub fn leave(&self) -> Result<bool> {
        let left = self.db.delete_setting(HOUSEHOLD_SETTING_KEY)?;
        if left {
            info!("left household, reverting to device namespace");
        }
        Ok(left)
    }
}
